//! `gcs=` decoding.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{ConsentCategory, ConsentEntry, ConsentFormat, ConsentRecord, ConsentState};

const PREFIX: &[u8; 2] = b"G1";

/// The two observed `gcs=` key layouts. Neither is inferred from the input; callers pick one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyLayout {
    /// `G1` + one character each for `[ad_storage, analytics_storage]`.
    TwoCategory,
    /// Whole-value lookup covering all four categories, as observed on server-side previews.
    FourCategoryTable,
}

impl LegacyLayout {
    pub fn categories(&self) -> &'static [ConsentCategory] {
        match self {
            LegacyLayout::TwoCategory => &TWO_CATEGORY_ORDER,
            LegacyLayout::FourCategoryTable => &ConsentCategory::ALL,
        }
    }
}

const TWO_CATEGORY_ORDER: [ConsentCategory; 2] =
    [ConsentCategory::AdStorage, ConsentCategory::AnalyticsStorage];

use ConsentState::{Denied as D, Granted as G};

/// Order: `[ad_storage, analytics_storage, ad_user_data, ad_personalization]`.
const FOUR_CATEGORY_TABLE: [(&str, [ConsentState; 4]); 8] = [
    ("g100", [G, G, G, G]),
    ("g111", [G, G, D, D]),
    ("g110", [G, G, G, D]),
    ("g101", [G, G, D, G]),
    ("g011", [D, D, D, D]),
    ("g010", [D, D, G, D]),
    ("g001", [D, D, D, G]),
    ("g000", [D, D, D, D]),
];

/// `'1'` granted, `'0'` denied, anything else unspecified.
pub fn status_char(c: u8) -> ConsentState {
    match c {
        b'1' => ConsentState::Granted,
        b'0' => ConsentState::Denied,
        _ => ConsentState::Unspecified,
    }
}

pub fn decode_gcs(raw: &str, layout: LegacyLayout) -> ConsentRecord {
    let raw = raw.trim();
    let format = ConsentFormat::Gcs(layout);
    let decoded = match layout {
        LegacyLayout::TwoCategory => decode_two_category(raw),
        LegacyLayout::FourCategoryTable => decode_table(raw),
    };
    decoded.unwrap_or_else(|| {
        debug!(target: "gtm_lens::consent", raw, ?layout, "gcs value not decodable");
        ConsentRecord::unspecified(format, layout.categories())
    })
}

fn decode_two_category(raw: &str) -> Option<ConsentRecord> {
    let bytes = raw.as_bytes();
    if bytes.len() < PREFIX.len() + TWO_CATEGORY_ORDER.len() {
        return None;
    }
    if !bytes[0].eq_ignore_ascii_case(&PREFIX[0]) || bytes[1] != PREFIX[1] {
        return None;
    }
    let entries = TWO_CATEGORY_ORDER
        .iter()
        .enumerate()
        .map(|(idx, category)| {
            let state = status_char(bytes[PREFIX.len() + idx]);
            (*category, ConsentEntry::uniform(state))
        });
    Some(ConsentRecord::from_entries(
        ConsentFormat::Gcs(LegacyLayout::TwoCategory),
        entries,
    ))
}

fn decode_table(raw: &str) -> Option<ConsentRecord> {
    let key = raw.to_ascii_lowercase();
    let (_, states) = FOUR_CATEGORY_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == key)?;
    let entries = ConsentCategory::ALL
        .iter()
        .zip(states.iter())
        .map(|(category, state)| (*category, ConsentEntry::uniform(*state)));
    Some(ConsentRecord::from_entries(
        ConsentFormat::Gcs(LegacyLayout::FourCategoryTable),
        entries,
    ))
}
