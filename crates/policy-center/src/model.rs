use gtm_lens_core_types::{Environment, FeatureId};
use serde::{Deserialize, Serialize};

/// Where a descriptor's effective `enabled`/`order` came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Store,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureDescriptor {
    pub id: FeatureId,
    /// Key of the feature inside the page-injected namespace.
    pub api_key: String,
    pub applicable_environments: Vec<Environment>,
    pub enabled: bool,
    pub order: i32,
    /// Position in the declared catalog; breaks `order` ties.
    pub catalog_index: usize,
    pub source: PolicySource,
}

impl FeatureDescriptor {
    pub fn applies_to(&self, environment: Environment) -> bool {
        self.applicable_environments.contains(&environment)
    }
}

/// One entry of the persisted settings blob. Absent fields keep catalog values.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureSetting {
    pub id: FeatureId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<Environment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

/// `{features: [{id, environments, enabled, order}]}`
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureSettings {
    #[serde(default)]
    pub features: Vec<FeatureSetting>,
}

impl FeatureSettings {
    pub fn get(&self, id: &FeatureId) -> Option<&FeatureSetting> {
        self.features.iter().find(|setting| &setting.id == id)
    }

    pub fn entry(&mut self, id: &FeatureId) -> &mut FeatureSetting {
        let idx = match self.features.iter().position(|setting| &setting.id == id) {
            Some(idx) => idx,
            None => {
                self.features.push(FeatureSetting {
                    id: id.clone(),
                    ..Default::default()
                });
                self.features.len() - 1
            }
        };
        &mut self.features[idx]
    }

    /// Later values win field by field.
    pub fn merge(&mut self, other: FeatureSettings) {
        for incoming in other.features {
            let target = self.entry(&incoming.id);
            if incoming.environments.is_some() {
                target.environments = incoming.environments;
            }
            if incoming.enabled.is_some() {
                target.enabled = incoming.enabled;
            }
            if incoming.order.is_some() {
                target.order = incoming.order;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    /// Read from the settings store.
    Store,
    /// Store empty or unreachable; every catalog feature treated as enabled.
    Fallback,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub environment: Environment,
    pub features: Vec<FeatureDescriptor>,
    pub source: SettingsSource,
}

impl Selection {
    pub fn ids(&self) -> Vec<&str> {
        self.features.iter().map(|desc| desc.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.features.iter().any(|desc| desc.id.as_str() == id)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == SettingsSource::Fallback
    }
}
