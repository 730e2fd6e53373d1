use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::legacy::LegacyLayout;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentCategory {
    AdStorage,
    AnalyticsStorage,
    AdUserData,
    AdPersonalization,
}

impl ConsentCategory {
    pub const ALL: [ConsentCategory; 4] = [
        ConsentCategory::AdStorage,
        ConsentCategory::AnalyticsStorage,
        ConsentCategory::AdUserData,
        ConsentCategory::AdPersonalization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentCategory::AdStorage => "ad_storage",
            ConsentCategory::AnalyticsStorage => "analytics_storage",
            ConsentCategory::AdUserData => "ad_user_data",
            ConsentCategory::AdPersonalization => "ad_personalization",
        }
    }
}

impl fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    Granted,
    Denied,
    #[default]
    Unspecified,
}

impl ConsentState {
    /// Label used in the rendered consent table.
    pub fn label(&self) -> &'static str {
        match self {
            ConsentState::Granted => "Granted",
            ConsentState::Denied => "Denied",
            ConsentState::Unspecified => "-",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            ConsentState::Granted => "granted",
            ConsentState::Denied => "denied",
            ConsentState::Unspecified => "undefined",
        }
    }
}

/// Per-category value. Legacy input carries a single value and fills both fields with it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConsentEntry {
    pub default: ConsentState,
    pub update: ConsentState,
}

impl ConsentEntry {
    pub const UNSPECIFIED: ConsentEntry = ConsentEntry {
        default: ConsentState::Unspecified,
        update: ConsentState::Unspecified,
    };

    pub fn uniform(state: ConsentState) -> Self {
        Self {
            default: state,
            update: state,
        }
    }

    /// The value in force: the update when one was made, otherwise the default.
    pub fn effective(&self) -> ConsentState {
        match self.update {
            ConsentState::Unspecified => self.default,
            other => other,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "layout")]
pub enum ConsentFormat {
    Gcs(LegacyLayout),
    Gcd,
    Merged,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub format: ConsentFormat,
    entries: BTreeMap<ConsentCategory, ConsentEntry>,
}

impl ConsentRecord {
    pub fn unspecified(format: ConsentFormat, categories: &[ConsentCategory]) -> Self {
        let entries = categories
            .iter()
            .map(|category| (*category, ConsentEntry::UNSPECIFIED))
            .collect();
        Self { format, entries }
    }

    pub(crate) fn from_entries(
        format: ConsentFormat,
        entries: impl IntoIterator<Item = (ConsentCategory, ConsentEntry)>,
    ) -> Self {
        Self {
            format,
            entries: entries.into_iter().collect(),
        }
    }

    /// Entry for `category`; categories outside this record's encoding read as unspecified.
    pub fn entry(&self, category: ConsentCategory) -> ConsentEntry {
        self.entries
            .get(&category)
            .copied()
            .unwrap_or(ConsentEntry::UNSPECIFIED)
    }

    pub fn covers(&self, category: ConsentCategory) -> bool {
        self.entries.contains_key(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConsentCategory, ConsentEntry)> + '_ {
        self.entries.iter().map(|(category, entry)| (*category, *entry))
    }

    pub fn is_all_unspecified(&self) -> bool {
        self.entries.values().all(ConsentEntry::is_unspecified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_prefers_update() {
        let entry = ConsentEntry {
            default: ConsentState::Denied,
            update: ConsentState::Granted,
        };
        assert_eq!(entry.effective(), ConsentState::Granted);

        let entry = ConsentEntry {
            default: ConsentState::Denied,
            update: ConsentState::Unspecified,
        };
        assert_eq!(entry.effective(), ConsentState::Denied);
    }

    #[test]
    fn missing_category_reads_unspecified() {
        let record = ConsentRecord::unspecified(
            ConsentFormat::Gcs(LegacyLayout::TwoCategory),
            &[ConsentCategory::AdStorage],
        );
        assert!(!record.covers(ConsentCategory::AdUserData));
        assert!(record.entry(ConsentCategory::AdUserData).is_unspecified());
    }
}
