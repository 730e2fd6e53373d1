use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use gtm_lens_cli::Config;
use tokio::fs;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOCAL_CONFIG: &str = "config/gtm-lens.yaml";

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    /// `None` when no file was found and defaults are in use.
    pub path: Option<PathBuf>,
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(mut path) = dirs::config_dir() {
        path.push("gtm-lens");
        path.push("config.yaml");
        locations.push(path);
    }
    locations
}

/// `--config` when given, else `./config/gtm-lens.yaml`, else the user config directory, else
/// defaults. An explicit path that does not exist is an error.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        }
        None => default_locations().into_iter().find(|path| path.exists()),
    };

    let Some(path) = path else {
        debug!("No config file found, using defaults");
        return Ok(LoadedConfig {
            config: Config::default(),
            path: None,
        });
    };

    let content = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(LoadedConfig {
        config,
        path: Some(path),
    })
}
