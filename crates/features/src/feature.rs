use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gtm_lens_core_types::FeatureId;
use gtm_lens_dom_reconciler::{
    Dom, Enhancer, Reconciler, ReconcilerSpec, ReconcilerStats, DEFAULT_DEBOUNCE,
};
use gtm_lens_policy_center::defaults::{
    CONSENT_STATUS_MONITOR, INLINE_JSON_FORMATTING, PREVIEW_UI_FILTERING, TAGS_STATUS_COLORING,
    TAGS_TYPE_COLORING, URLS_FORMATTER,
};
use gtm_lens_policy_center::FeatureDescriptor;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::FeatureError;
use crate::style::{inject_style, remove_style, InjectedStyle, StyleSheet};
use crate::{consent_monitor, json_format, preview_filter, tag_status, tag_type, url_format};

/// One page augmentation as seen by the page namespace.
#[async_trait]
pub trait Feature: Send + Sync {
    fn id(&self) -> &FeatureId;

    async fn start(&self) -> Result<(), FeatureError>;

    async fn stop(&self);

    fn is_running(&self) -> bool;

    fn command(&self, name: &str, payload: &Value) -> Result<Value, FeatureError>;

    fn stats(&self) -> Vec<ReconcilerStats>;
}

/// Result of a feature-specific command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub response: Value,
    /// Re-run every reconciler of the feature right away.
    pub rescan: bool,
}

pub trait CommandHandler: Send + Sync {
    fn handle(&self, command: &str, payload: &Value) -> Option<Result<CommandOutcome, FeatureError>>;
}

/// A feature made of a stylesheet plus one or more reconcilers, started in declaration order.
pub struct ReconciledFeature {
    id: FeatureId,
    dom: Arc<dyn Dom>,
    style: Option<StyleSheet>,
    parts: Vec<Reconciler>,
    commands: Option<Arc<dyn CommandHandler>>,
    injected: Mutex<Option<InjectedStyle>>,
}

impl ReconciledFeature {
    pub fn new(id: impl Into<FeatureId>, dom: Arc<dyn Dom>) -> Self {
        Self {
            id: id.into(),
            dom,
            style: None,
            parts: Vec::new(),
            commands: None,
            injected: Mutex::new(None),
        }
    }

    pub fn with_style(mut self, sheet: StyleSheet) -> Self {
        self.style = Some(sheet);
        self
    }

    pub fn with_part(mut self, spec: ReconcilerSpec, enhancer: Arc<dyn Enhancer>) -> Self {
        self.parts
            .push(Reconciler::new(spec, Arc::clone(&self.dom), enhancer));
        self
    }

    pub fn with_commands(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.commands = Some(handler);
        self
    }

    pub fn parts(&self) -> &[Reconciler] {
        &self.parts
    }

    async fn stop_parts(&self) {
        for part in self.parts.iter().rev() {
            part.stop().await;
        }
        let injected = self.injected.lock().take();
        if let Some(style) = injected {
            remove_style(self.dom.as_ref(), style);
        }
    }
}

#[async_trait]
impl Feature for ReconciledFeature {
    fn id(&self) -> &FeatureId {
        &self.id
    }

    async fn start(&self) -> Result<(), FeatureError> {
        if self.is_running() {
            return Ok(());
        }
        if let Some(sheet) = &self.style {
            let style = inject_style(self.dom.as_ref(), self.id.as_str(), sheet)?;
            *self.injected.lock() = Some(style);
        }
        for part in &self.parts {
            if let Err(err) = part.start() {
                self.stop_parts().await;
                return Err(err.into());
            }
        }
        info!(target: "gtm_lens::features", feature = %self.id, parts = self.parts.len(), "feature started");
        Ok(())
    }

    async fn stop(&self) {
        let was_running = self.is_running();
        self.stop_parts().await;
        if was_running {
            info!(target: "gtm_lens::features", feature = %self.id, "feature stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.parts.iter().any(Reconciler::is_running)
    }

    fn command(&self, name: &str, payload: &Value) -> Result<Value, FeatureError> {
        if name == "stats" {
            let stats = self.stats();
            return Ok(json!({ "feature": self.id.as_str(), "running": self.is_running(), "parts": stats }));
        }
        let outcome = self
            .commands
            .as_ref()
            .and_then(|handler| handler.handle(name, payload))
            .unwrap_or_else(|| {
                Err(FeatureError::UnsupportedCommand {
                    feature: self.id.to_string(),
                    command: name.to_string(),
                })
            })?;
        if outcome.rescan {
            for part in &self.parts {
                let report = part.rescan_now();
                debug!(target: "gtm_lens::features", feature = %self.id, part = part.feature(), matched = report.matched, "rescanned after command");
            }
        }
        Ok(outcome.response)
    }

    fn stats(&self) -> Vec<ReconcilerStats> {
        self.parts.iter().map(Reconciler::stats).collect()
    }
}

/// Builds features from catalog descriptors.
pub trait FeatureFactory: Send + Sync {
    fn build(
        &self,
        descriptor: &FeatureDescriptor,
        dom: Arc<dyn Dom>,
    ) -> Result<Arc<dyn Feature>, FeatureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinFeatures {
    pub debounce: Duration,
}

impl Default for BuiltinFeatures {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl BuiltinFeatures {
    pub fn with_debounce(debounce: Duration) -> Self {
        Self { debounce }
    }
}

impl FeatureFactory for BuiltinFeatures {
    fn build(
        &self,
        descriptor: &FeatureDescriptor,
        dom: Arc<dyn Dom>,
    ) -> Result<Arc<dyn Feature>, FeatureError> {
        let debounce = self.debounce;
        let feature = match descriptor.id.as_str() {
            INLINE_JSON_FORMATTING => json_format::build(dom, debounce)?,
            URLS_FORMATTER => url_format::build(dom, debounce)?,
            TAGS_TYPE_COLORING => tag_type::build(dom, debounce)?,
            TAGS_STATUS_COLORING => tag_status::build(dom, debounce)?,
            CONSENT_STATUS_MONITOR => consent_monitor::build(dom, debounce)?,
            PREVIEW_UI_FILTERING => preview_filter::build(dom, debounce)?,
            other => return Err(FeatureError::UnknownFeature(other.to_string())),
        };
        Ok(Arc::new(feature))
    }
}
