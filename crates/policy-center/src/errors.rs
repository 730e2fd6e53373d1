use gtm_lens_core_types::LensError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid settings: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unknown feature: {0}")]
    UnknownFeature(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("settings store unavailable: {0}")]
    Store(String),
}

impl From<PolicyError> for LensError {
    fn from(value: PolicyError) -> Self {
        LensError::new(value.to_string())
    }
}
