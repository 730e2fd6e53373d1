use gtm_lens_core_types::{Environment, FeatureId};

use crate::model::{FeatureDescriptor, PolicySource};

pub const INLINE_JSON_FORMATTING: &str = "inline-json-formatting";
pub const URLS_FORMATTER: &str = "urls-formatter";
pub const TAGS_TYPE_COLORING: &str = "tags-type-coloring";
pub const TAGS_STATUS_COLORING: &str = "tags-status-coloring";
pub const CONSENT_STATUS_MONITOR: &str = "consent-status-monitor";
pub const PREVIEW_UI_FILTERING: &str = "preview-ui-filtering";

use Environment::{ClientUi, ServerSidePreview, TagAssistant};

/// `(id, api key, order, environments)` in declared priority order.
const CATALOG: [(&str, &str, i32, &[Environment]); 6] = [
    (INLINE_JSON_FORMATTING, "jsonFormatterInline", 10, &[ServerSidePreview]),
    (URLS_FORMATTER, "urlBlocksParser", 20, &[ServerSidePreview]),
    (
        TAGS_TYPE_COLORING,
        "tagTypeColoring",
        30,
        &[ClientUi, TagAssistant, ServerSidePreview],
    ),
    (
        TAGS_STATUS_COLORING,
        "tagStatusColoring",
        40,
        &[ClientUi, TagAssistant, ServerSidePreview],
    ),
    (CONSENT_STATUS_MONITOR, "consentStatusMonitor", 50, &[ServerSidePreview]),
    (
        PREVIEW_UI_FILTERING,
        "previewUIFilters",
        60,
        &[TagAssistant, ServerSidePreview],
    ),
];

pub fn default_catalog() -> Vec<FeatureDescriptor> {
    CATALOG
        .iter()
        .enumerate()
        .map(|(idx, (id, api_key, order, envs))| FeatureDescriptor {
            id: FeatureId::new(*id),
            api_key: (*api_key).to_string(),
            applicable_environments: envs.to_vec(),
            enabled: true,
            order: *order,
            catalog_index: idx,
            source: PolicySource::Builtin,
        })
        .collect()
}

pub fn feature_ids() -> Vec<&'static str> {
    CATALOG.iter().map(|(id, ..)| *id).collect()
}
