//! Cross-context plumbing for gtm-lens.
//!
//! The popup and the page talk to the background coordinator through [`BridgeRequest`] /
//! [`BridgeResponse`] envelopes. The coordinator reaches into pages through a [`PageInjector`],
//! which places the augmentation API into a tab and hands back that tab's DOM.

pub mod config;
pub mod injector;
pub mod messages;

use async_trait::async_trait;
use gtm_lens_core_types::{InjectionMode, LensError, TabId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub use crate::config::BridgeConfig;
pub use crate::injector::{
    inject_with_fallback, InjectError, Injection, MemoryPageInjector, PageInjector,
};
pub use crate::messages::{BridgeCommand, BridgeRequest, BridgeResponse};

/// Errors surfaced by the bridge.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid payload for {command}: {reason}")]
    InvalidPayload { command: String, reason: String },
    #[error("injection into {tab} failed: {reason}")]
    InjectionFailed { tab: TabId, reason: String },
    #[error("{0} is gone")]
    TabGone(TabId),
    #[error("feature {feature} is not active on {tab}")]
    FeatureNotActive { tab: TabId, feature: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BridgeError> for LensError {
    fn from(value: BridgeError) -> Self {
        LensError::new(value.to_string())
    }
}

pub type BridgeEventBus = broadcast::Sender<BridgeEvent>;

/// Events emitted by the bridge to observers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    Injected {
        tab: TabId,
        mode: InjectionMode,
        features: Vec<String>,
    },
    InjectionFailed {
        tab: TabId,
        reason: String,
    },
    TornDown {
        tab: TabId,
        features: usize,
    },
    Handled {
        command: String,
        ok: bool,
    },
}

/// Receiver side of the messaging channel.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Never fails: errors come back as `ok: false` responses.
    async fn handle(&self, request: BridgeRequest) -> BridgeResponse;
}
