use gtm_lens_core_types::LensError;
use gtm_lens_dom_reconciler::DomError;
use gtm_lens_extensions_bridge::BridgeError;
use gtm_lens_features::FeatureError;
use gtm_lens_policy_center::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("invalid replay script: {0}")]
    Replay(String),
}

impl From<CoordinatorError> for LensError {
    fn from(value: CoordinatorError) -> Self {
        LensError::new(value.to_string())
    }
}
