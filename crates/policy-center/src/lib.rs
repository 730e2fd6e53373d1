pub mod api;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod select;
pub mod store;

pub use api::{PolicyCenter, StorePolicyCenter};
pub use defaults::{default_catalog, feature_ids};
pub use errors::PolicyError;
pub use loader::{load_settings, LoadOptions};
pub use model::{
    FeatureDescriptor, FeatureSetting, FeatureSettings, PolicySource, Selection, SettingsSource,
};
pub use select::{select_features, select_with_overlays, SettingsOverlay};
pub use store::{FileSettingsStore, InMemorySettingsStore, SettingsStore, SETTINGS_KEY};

#[cfg(test)]
mod tests;
