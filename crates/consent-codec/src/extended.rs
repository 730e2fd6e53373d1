//! `gcd=` decoding.
//!
//! Layout (offsets into the raw string):
//!
//! ```text
//! 0..2   implicit-consent prefix, ignored
//! 2      ad_storage          (followed by one separator character)
//! 4      analytics_storage   (followed by one separator character)
//! 6      ad_user_data        (followed by one separator character)
//! 8      ad_personalization  (followed by one separator character)
//! ```
//!
//! Each category character is a base64url sextet `v`; `default = (v >> 2) & 3` and
//! `update = v & 3`. Field values: `3` granted, `2` denied, `1` and `0` unspecified.

use tracing::debug;

use crate::model::{ConsentCategory, ConsentEntry, ConsentFormat, ConsentRecord, ConsentState};

pub const GCD_PREFIX_LEN: usize = 2;

pub const GCD_CATEGORY_OFFSETS: [(ConsentCategory, usize); 4] = [
    (ConsentCategory::AdStorage, 2),
    (ConsentCategory::AnalyticsStorage, 4),
    (ConsentCategory::AdUserData, 6),
    (ConsentCategory::AdPersonalization, 8),
];

/// Prefix plus four category/separator pairs.
pub const GCD_MIN_LEN: usize = GCD_PREFIX_LEN + 2 * GCD_CATEGORY_OFFSETS.len();

pub(crate) fn sextet(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'-' => Some(62),
        b'_' => Some(63),
        _ => None,
    }
}

fn field_state(bits: u8) -> ConsentState {
    match bits & 3 {
        3 => ConsentState::Granted,
        2 => ConsentState::Denied,
        _ => ConsentState::Unspecified,
    }
}

/// Splits one sextet into its `{default, update}` pair.
pub fn decode_sextet(value: u8) -> ConsentEntry {
    ConsentEntry {
        default: field_state(value >> 2),
        update: field_state(value),
    }
}

pub fn decode_gcd(raw: &str) -> ConsentRecord {
    let raw = raw.trim();
    match try_decode(raw.as_bytes()) {
        Some(record) => record,
        None => {
            debug!(target: "gtm_lens::consent", raw, "gcd value not decodable");
            ConsentRecord::unspecified(ConsentFormat::Gcd, &ConsentCategory::ALL)
        }
    }
}

fn try_decode(bytes: &[u8]) -> Option<ConsentRecord> {
    if bytes.len() < GCD_MIN_LEN {
        return None;
    }
    // A stray character anywhere means the capture is garbled; none of it is trusted.
    if bytes.iter().any(|c| sextet(*c).is_none()) {
        return None;
    }
    let mut entries = Vec::with_capacity(GCD_CATEGORY_OFFSETS.len());
    for (category, offset) in GCD_CATEGORY_OFFSETS {
        let value = sextet(bytes[offset])?;
        entries.push((category, decode_sextet(value)));
    }
    Some(ConsentRecord::from_entries(ConsentFormat::Gcd, entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_covers_base64url() {
        assert_eq!(sextet(b'A'), Some(0));
        assert_eq!(sextet(b'z'), Some(51));
        assert_eq!(sextet(b'9'), Some(61));
        assert_eq!(sextet(b'-'), Some(62));
        assert_eq!(sextet(b'_'), Some(63));
        assert_eq!(sextet(b'+'), None);
        assert_eq!(sextet(b'='), None);
    }

    #[test]
    fn sextet_fields_split_high_and_low_pairs() {
        // 0b101110: default bits 11, update bits 10
        let entry = decode_sextet(0b10_11_10);
        assert_eq!(entry.default, ConsentState::Granted);
        assert_eq!(entry.update, ConsentState::Denied);

        let entry = decode_sextet(0);
        assert!(entry.is_unspecified());
    }

    #[test]
    fn min_len_matches_offsets() {
        let last = GCD_CATEGORY_OFFSETS[GCD_CATEGORY_OFFSETS.len() - 1].1;
        assert_eq!(GCD_MIN_LEN, last + 2);
    }
}
