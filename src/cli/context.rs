use std::path::{Path, PathBuf};
use std::sync::Arc;

use gtm_lens_cli::Config;

use super::output::OutputFormat;

pub struct CliContext {
    config: Arc<Config>,
    config_path: Option<PathBuf>,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: Config, config_path: Option<PathBuf>, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    /// File the configuration was read from; `None` when running on defaults.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }
}
