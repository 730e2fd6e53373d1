//! Page injection seam.
//!
//! Injecting the augmentation API into a tab yields the tab's [`Dom`]. Injection can be rejected
//! by the page (CSP); the caller retries exactly once with [`InjectionMode::fallback`] and then
//! gives up for this navigation.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use gtm_lens_core_types::{InjectionMode, TabId};
use gtm_lens_dom_reconciler::{Dom, DomError, MemoryDom};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::BridgeError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InjectError {
    #[error("injection rejected: {0}")]
    Rejected(String),
    #[error("{0} is gone")]
    TabGone(TabId),
    #[error("injection failed: {0}")]
    Internal(String),
}

#[async_trait]
pub trait PageInjector: Send + Sync {
    async fn inject(&self, tab: TabId, mode: InjectionMode) -> Result<Arc<dyn Dom>, InjectError>;
}

/// A successful injection.
#[derive(Clone)]
pub struct Injection {
    pub dom: Arc<dyn Dom>,
    pub mode: InjectionMode,
    pub attempts: u8,
}

/// Injects with [`InjectionMode::MainWorld`], falling back once when the first attempt is rejected.
pub async fn inject_with_fallback(
    injector: &dyn PageInjector,
    tab: TabId,
    config: &BridgeConfig,
) -> Result<Injection, BridgeError> {
    let mut mode = InjectionMode::MainWorld;
    let mut attempts = 0u8;
    loop {
        attempts += 1;
        let attempt = tokio::time::timeout(config.inject_timeout(), injector.inject(tab, mode));
        let result = match attempt.await {
            Ok(result) => result,
            Err(_) => Err(InjectError::Internal("injection timed out".into())),
        };
        match result {
            Ok(dom) => {
                return Ok(Injection {
                    dom,
                    mode,
                    attempts,
                })
            }
            Err(InjectError::Rejected(reason)) => {
                match mode.fallback().filter(|_| config.fallback_enabled) {
                    Some(next) => {
                        debug!(
                            target: "gtm_lens::bridge",
                            %tab,
                            %reason,
                            ?next,
                            "injection rejected, retrying"
                        );
                        mode = next;
                    }
                    None => {
                        warn!(target: "gtm_lens::bridge", %tab, %reason, "injection rejected");
                        return Err(BridgeError::InjectionFailed { tab, reason });
                    }
                }
            }
            Err(InjectError::TabGone(tab)) => return Err(BridgeError::TabGone(tab)),
            Err(err) => {
                warn!(target: "gtm_lens::bridge", %tab, error = %err, "injection failed");
                return Err(BridgeError::InjectionFailed {
                    tab,
                    reason: err.to_string(),
                });
            }
        }
    }
}

/// Injector over in-memory pages, used by tests and the replay harness.
#[derive(Default)]
pub struct MemoryPageInjector {
    pages: DashMap<TabId, Arc<MemoryDom>>,
    rejected: DashMap<TabId, Vec<InjectionMode>>,
    attempts: DashMap<TabId, Vec<InjectionMode>>,
}

impl MemoryPageInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `html` and installs it as the tab's current page.
    pub fn load(&self, tab: TabId, html: &str) -> Result<Arc<MemoryDom>, DomError> {
        let dom = Arc::new(MemoryDom::parse(html)?);
        self.pages.insert(tab, Arc::clone(&dom));
        Ok(dom)
    }

    pub fn page(&self, tab: TabId) -> Option<Arc<MemoryDom>> {
        self.pages.get(&tab).map(|page| Arc::clone(page.value()))
    }

    pub fn close(&self, tab: TabId) {
        self.pages.remove(&tab);
        self.rejected.remove(&tab);
    }

    /// Makes every injection into `tab` with `mode` fail as a CSP refusal would.
    pub fn reject(&self, tab: TabId, mode: InjectionMode) {
        self.rejected.entry(tab).or_default().push(mode);
    }

    pub fn attempts(&self, tab: TabId) -> Vec<InjectionMode> {
        self.attempts
            .get(&tab)
            .map(|modes| modes.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageInjector for MemoryPageInjector {
    async fn inject(&self, tab: TabId, mode: InjectionMode) -> Result<Arc<dyn Dom>, InjectError> {
        self.attempts.entry(tab).or_default().push(mode);
        let rejected = self
            .rejected
            .get(&tab)
            .map(|modes| modes.contains(&mode))
            .unwrap_or(false);
        if rejected {
            return Err(InjectError::Rejected(format!("{mode:?} refused by page policy")));
        }
        let page = self.page(tab).ok_or(InjectError::TabGone(tab))?;
        Ok(page as Arc<dyn Dom>)
    }
}
