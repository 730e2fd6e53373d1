//! gtm-lens background coordinator.
//!
//! Wires the environment classifier, the feature policy and the page augmentations together and
//! exposes the pieces the `gtm-lens` binary drives.

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod replay;

pub use config::{Config, ReconcilerConfig, SettingsConfig};
pub use coordinator::{Coordinator, TabNamespace};
pub use errors::CoordinatorError;
pub use replay::{load_script, parse_script, replay, ReplayEvent, ReplayOptions, ReplayReport};
