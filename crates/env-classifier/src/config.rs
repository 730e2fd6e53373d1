//! Configuration types for the environment classifier.

use gtm_lens_core_types::Environment;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OriginRule {
    /// `scheme://host[:port]`; path and query are ignored.
    pub origin: String,
    pub environment: Environment,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub origins: Vec<OriginRule>,
    /// `Set-Cookie` name prefixes set by a server-side preview session.
    pub cookie_prefixes: Vec<String>,
    /// Global exposed by the server-side preview bootstrap script.
    pub global_marker: String,
    pub probe_enabled: bool,
    pub probe_timeout_ms: u64,
    pub bus_capacity: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            origins: vec![
                OriginRule {
                    origin: "https://tagmanager.google.com".into(),
                    environment: Environment::ClientUi,
                },
                OriginRule {
                    origin: "https://tagassistant.google.com".into(),
                    environment: Environment::TagAssistant,
                },
            ],
            cookie_prefixes: vec!["gtm_debug".into(), "gtm_preview".into(), "gtm_auth".into()],
            global_marker: "_gtmDebugBootstrap".into(),
            probe_enabled: true,
            probe_timeout_ms: 1_500,
            bus_capacity: 64,
        }
    }
}
