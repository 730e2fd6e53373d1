use gtm_lens_core_types::Environment;
use tracing::debug;

use crate::defaults::default_catalog;
use crate::model::{
    FeatureDescriptor, FeatureSetting, FeatureSettings, PolicySource, Selection, SettingsSource,
};

/// Settings applied on top of the stored blob, e.g. from a config file or the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsOverlay {
    pub source: PolicySource,
    pub settings: FeatureSettings,
}

/// Selects from the built-in catalog. `None` means the store had nothing usable.
pub fn select_features(environment: Environment, settings: Option<&FeatureSettings>) -> Selection {
    select_with_overlays(environment, &default_catalog(), settings, &[])
}

/// A feature is selected iff it is enabled and `environment` is both in its catalog environments
/// and, when the settings carry one, in its stored whitelist. Sort key is
/// `(order, catalog_index)`.
pub fn select_with_overlays(
    environment: Environment,
    catalog: &[FeatureDescriptor],
    stored: Option<&FeatureSettings>,
    overlays: &[SettingsOverlay],
) -> Selection {
    let source = match stored {
        Some(_) => SettingsSource::Store,
        None => SettingsSource::Fallback,
    };

    let layers = stored
        .map(|settings| (PolicySource::Store, settings))
        .into_iter()
        .chain(overlays.iter().map(|overlay| (overlay.source, &overlay.settings)));

    let mut effective: Vec<FeatureDescriptor> = catalog.to_vec();
    for (layer_source, settings) in layers {
        for setting in &settings.features {
            match effective.iter_mut().find(|desc| desc.id == setting.id) {
                Some(desc) => apply_setting(desc, setting, layer_source),
                None => debug!(
                    target: "gtm_lens::policy",
                    feature = %setting.id,
                    "ignoring settings entry for unknown feature"
                ),
            }
        }
    }

    let mut features: Vec<FeatureDescriptor> = effective
        .into_iter()
        .filter(|desc| desc.enabled && desc.applies_to(environment))
        .collect();
    features.sort_by_key(|desc| (desc.order, desc.catalog_index));

    Selection {
        environment,
        features,
        source,
    }
}

fn apply_setting(desc: &mut FeatureDescriptor, setting: &FeatureSetting, source: PolicySource) {
    let mut touched = false;
    if let Some(enabled) = setting.enabled {
        desc.enabled = enabled;
        touched = true;
    }
    if let Some(whitelist) = &setting.environments {
        desc.applicable_environments
            .retain(|environment| whitelist.contains(environment));
        touched = true;
    }
    if let Some(order) = setting.order {
        desc.order = order;
        touched = true;
    }
    if touched {
        desc.source = source;
    }
}
