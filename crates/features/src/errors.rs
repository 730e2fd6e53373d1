use gtm_lens_core_types::LensError;
use gtm_lens_dom_reconciler::{DomError, ReconcilerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    /// The page cannot host this feature for the current navigation.
    #[error("feature {feature} unavailable: {reason}")]
    Unavailable { feature: String, reason: String },
    #[error("unknown feature: {0}")]
    UnknownFeature(String),
    #[error("feature {feature} does not support command {command}")]
    UnsupportedCommand { feature: String, command: String },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Reconciler(#[from] ReconcilerError),
    #[error(transparent)]
    Dom(#[from] DomError),
}

impl FeatureError {
    pub fn unavailable(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            feature: feature.into(),
            reason: reason.into(),
        }
    }
}

impl From<FeatureError> for LensError {
    fn from(value: FeatureError) -> Self {
        LensError::new(value.to_string())
    }
}
