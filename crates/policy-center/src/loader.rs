use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use gtm_lens_core_types::{Environment, FeatureId};
use serde_json::Value;
use tracing::debug;

use crate::errors::PolicyError;
use crate::model::{FeatureSettings, PolicySource};
use crate::select::SettingsOverlay;

const ENV_PREFIX: &str = "GTM_LENS_FEATURE__";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

/// File layers (missing files are skipped) followed by the environment layer.
pub fn load_settings(options: &LoadOptions) -> Result<Vec<SettingsOverlay>, PolicyError> {
    let mut overlays = Vec::new();
    for path in &options.paths {
        if path.exists() {
            overlays.push(SettingsOverlay {
                source: PolicySource::File,
                settings: settings_from_file(path)?,
            });
        }
    }
    if options.include_env {
        let settings = settings_from_vars(env::vars())?;
        if !settings.features.is_empty() {
            overlays.push(SettingsOverlay {
                source: PolicySource::Env,
                settings,
            });
        }
    }
    Ok(overlays)
}

/// YAML or JSON document shaped like the stored settings blob.
pub fn settings_from_file(path: &Path) -> Result<FeatureSettings, PolicyError> {
    let content = fs::read_to_string(path).map_err(|err| PolicyError::Io(format!("{}", err)))?;
    if content.trim().is_empty() {
        return Ok(FeatureSettings::default());
    }
    serde_yaml::from_str(&content).map_err(|err| PolicyError::Invalid(format!("{}", err)))
}

/// `GTM_LENS_FEATURE__<ID>__ENABLED|ORDER|ENVIRONMENTS`, where `<ID>` is the feature id
/// upper-cased with `-` written as `_`.
pub fn settings_from_vars(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<FeatureSettings, PolicyError> {
    let mut settings = FeatureSettings::default();
    let mut keyed: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect();
    keyed.sort();

    for (key, raw) in keyed {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let Some((raw_id, field)) = stripped.rsplit_once("__") else {
            debug!(target: "gtm_lens::policy", key = %key, "ignoring malformed settings variable");
            continue;
        };
        if raw_id.is_empty() {
            continue;
        }
        let id = FeatureId::new(raw_id.to_ascii_lowercase().replace('_', "-"));
        let value = parse_env_value(raw.trim());
        let entry = settings.entry(&id);
        match field.to_ascii_uppercase().as_str() {
            "ENABLED" => entry.enabled = Some(to_bool(&key, &value)?),
            "ORDER" => entry.order = Some(to_i32(&key, &value)?),
            "ENVIRONMENTS" => entry.environments = Some(to_environments(&key, &value)?),
            _ => {
                debug!(target: "gtm_lens::policy", key = %key, "ignoring unknown settings field");
            }
        }
    }
    settings.features.retain(|setting| {
        setting.enabled.is_some() || setting.order.is_some() || setting.environments.is_some()
    });
    Ok(settings)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn to_bool(key: &str, value: &Value) -> Result<bool, PolicyError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        other => Err(PolicyError::InvalidValue(format!(
            "{key}: expected bool, got {other}"
        ))),
    }
}

fn to_i32(key: &str, value: &Value) -> Result<i32, PolicyError> {
    value
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| PolicyError::InvalidValue(format!("{key}: expected integer, got {value}")))
}

fn to_environments(key: &str, value: &Value) -> Result<Vec<Environment>, PolicyError> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                PolicyError::InvalidValue(format!("{key}: expected a list of environments"))
            })?,
        Value::String(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        Value::Null => Vec::new(),
        other => {
            return Err(PolicyError::InvalidValue(format!(
                "{key}: expected a list of environments, got {other}"
            )))
        }
    };
    items
        .iter()
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<Environment>()
                .map_err(|err| PolicyError::InvalidValue(format!("{key}: {err}")))
        })
        .collect()
}
