//! Page-context probing for the server-side preview bootstrap marker.

use async_trait::async_trait;
use gtm_lens_core_types::{InjectionMode, TabId};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// Typically a CSP refusal. Eligible for the fallback injection mode.
    #[error("injection rejected: {0}")]
    InjectionRejected(String),
    #[error("tab {0} is gone")]
    TabGone(TabId),
    #[error("probe failed: {0}")]
    Internal(String),
}

/// Checks whether a global variable exists in the page's main world.
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn probe_global(
        &self,
        tab: TabId,
        marker: &str,
        mode: InjectionMode,
    ) -> Result<bool, ProbeError>;
}

/// Probe for hosts that cannot inject script; never reports evidence.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProbe;

#[async_trait]
impl PageProbe for NoopProbe {
    async fn probe_global(
        &self,
        _tab: TabId,
        _marker: &str,
        _mode: InjectionMode,
    ) -> Result<bool, ProbeError> {
        Ok(false)
    }
}
