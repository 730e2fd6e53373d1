//! Runtime configuration.
//!
//! A single YAML document; every section is optional and falls back to defaults.

use std::path::PathBuf;
use std::time::Duration;

use gtm_lens_dom_reconciler::DEFAULT_DEBOUNCE;
use gtm_lens_env_classifier::ClassifierConfig;
use gtm_lens_extensions_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub bridge: BridgeConfig,
    pub reconciler: ReconcilerConfig,
    pub settings: SettingsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub debounce_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl ReconcilerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SettingsConfig {
    /// JSON document backing the settings store; in-memory when unset.
    pub store_path: Option<PathBuf>,
    /// YAML/JSON settings layers applied over the stored blob, in order.
    pub overlay_paths: Vec<PathBuf>,
    /// Apply `GTM_LENS_FEATURE__*` variables after the file layers.
    pub env_overrides: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            overlay_paths: Vec::new(),
            env_overrides: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "reconciler:\n  debounce_ms: 250\nclassifier:\n  probe_enabled: false\n",
        )
        .unwrap();
        assert_eq!(config.reconciler.debounce(), Duration::from_millis(250));
        assert!(!config.classifier.probe_enabled);
        assert_eq!(config.classifier.global_marker, "_gtmDebugBootstrap");
        assert!(config.bridge.fallback_enabled);
        assert!(config.settings.env_overrides);
    }

    #[test]
    fn empty_document_is_default() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.reconciler, ReconcilerConfig::default());
        assert_eq!(config.settings.store_path, None);
    }
}
