//! Pulls `gcs`/`gcd` out of request text (a URL, a bare query string, or a UI title).

use serde::Serialize;

use crate::extended::decode_gcd;
use crate::legacy::{decode_gcs, LegacyLayout};
use crate::model::{ConsentCategory, ConsentFormat, ConsentRecord};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ConsentParams {
    pub gcs: Option<String>,
    pub gcd: Option<String>,
    /// `v=` protocol version when present.
    pub version: Option<String>,
}

impl ConsentParams {
    pub fn is_empty(&self) -> bool {
        self.gcs.is_none() && self.gcd.is_none()
    }
}

/// Reads the query portion of `text`. Keys compare case-insensitively and the first occurrence
/// wins; empty values are treated as absent.
pub fn extract_params(text: &str) -> ConsentParams {
    let text = text.trim();
    let query = match text.find('?') {
        Some(idx) => &text[idx + 1..],
        None => text,
    };
    let query = query.split('#').next().unwrap_or_default();

    let mut params = ConsentParams::default();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = if key.eq_ignore_ascii_case("gcs") {
            &mut params.gcs
        } else if key.eq_ignore_ascii_case("gcd") {
            &mut params.gcd
        } else if key.eq_ignore_ascii_case("v") {
            &mut params.version
        } else {
            continue;
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
    params
}

/// Decoded view of one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsentReport {
    pub params: ConsentParams,
    pub legacy: Option<ConsentRecord>,
    pub extended: Option<ConsentRecord>,
}

impl ConsentReport {
    pub fn from_text(text: &str, layout: LegacyLayout) -> Self {
        Self::from_params(extract_params(text), layout)
    }

    pub fn from_params(params: ConsentParams, layout: LegacyLayout) -> Self {
        let legacy = params.gcs.as_deref().map(|raw| decode_gcs(raw, layout));
        let extended = params.gcd.as_deref().map(decode_gcd);
        Self {
            params,
            legacy,
            extended,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.legacy.is_none() && self.extended.is_none()
    }

    /// One record over all four categories. Per category the extended value is used when it
    /// says anything, else the legacy value.
    pub fn merged(&self) -> ConsentRecord {
        let entries = ConsentCategory::ALL.iter().map(|category| {
            let extended = self
                .extended
                .as_ref()
                .map(|record| record.entry(*category))
                .filter(|entry| !entry.is_unspecified());
            let entry = extended
                .or_else(|| self.legacy.as_ref().map(|record| record.entry(*category)))
                .unwrap_or_default();
            (*category, entry)
        });
        ConsentRecord::from_entries(ConsentFormat::Merged, entries)
    }
}
