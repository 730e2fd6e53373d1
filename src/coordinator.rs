//! Background coordinator.
//!
//! Owns the classifier, the feature policy and one feature namespace per tab. Main-frame
//! navigation tears down the tab's namespace, reclassifies the tab and, when a GTM surface is
//! recognised, injects the augmentation API and starts every selected feature in priority order.
//! Bridge messages are answered here; failures come back as `ok: false` responses.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use gtm_lens_core_types::{Environment, FeatureId, InjectionMode, TabId};
use gtm_lens_dom_reconciler::Dom;
use gtm_lens_env_classifier::{
    EnvironmentClassifier, NavigationEvent, Outcome as ClassifierOutcome, PageProbe,
    ResponseEvent, TabState,
};
use gtm_lens_extensions_bridge::{
    inject_with_fallback, BridgeCommand, BridgeConfig, BridgeError, BridgeEvent, BridgeEventBus,
    BridgeRequest, BridgeResponse, MessageHandler, PageInjector,
};
use gtm_lens_features::{BuiltinFeatures, FeatureFactory, FeatureRegistry};
use gtm_lens_policy_center::{
    load_settings, FeatureDescriptor, FileSettingsStore, InMemorySettingsStore, LoadOptions,
    PolicyCenter, SettingsStore, StorePolicyCenter,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::CoordinatorError;

/// Features running on one page load of one tab.
pub struct TabNamespace {
    pub environment: Environment,
    pub mode: InjectionMode,
    dom: Arc<dyn Dom>,
    registry: FeatureRegistry,
}

impl TabNamespace {
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn dom(&self) -> &Arc<dyn Dom> {
        &self.dom
    }

    pub fn feature_ids(&self) -> Vec<String> {
        self.registry
            .ids()
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    }
}

pub struct Coordinator {
    classifier: Arc<EnvironmentClassifier>,
    policy: Arc<dyn PolicyCenter>,
    injector: Arc<dyn PageInjector>,
    factory: Arc<dyn FeatureFactory>,
    bridge: BridgeConfig,
    events: BridgeEventBus,
    namespaces: DashMap<TabId, Arc<TabNamespace>>,
}

impl Coordinator {
    pub fn new(
        classifier: Arc<EnvironmentClassifier>,
        policy: Arc<dyn PolicyCenter>,
        injector: Arc<dyn PageInjector>,
        factory: Arc<dyn FeatureFactory>,
        bridge: BridgeConfig,
    ) -> (Self, broadcast::Receiver<BridgeEvent>) {
        let (events, rx) = broadcast::channel(bridge.bus_capacity.max(1));
        (
            Self {
                classifier,
                policy,
                injector,
                factory,
                bridge,
                events,
                namespaces: DashMap::new(),
            },
            rx,
        )
    }

    /// Wires the classifier, the settings store and its overlays, and the builtin features from
    /// `config`.
    pub fn from_config(
        config: &Config,
        probe: Arc<dyn PageProbe>,
        injector: Arc<dyn PageInjector>,
    ) -> Result<(Self, broadcast::Receiver<BridgeEvent>), CoordinatorError> {
        let (classifier, _classifier_rx) =
            EnvironmentClassifier::with_config(config.classifier.clone(), probe);
        let store: Arc<dyn SettingsStore> = match &config.settings.store_path {
            Some(path) => Arc::new(FileSettingsStore::new(path.clone())),
            None => Arc::new(InMemorySettingsStore::new()),
        };
        let overlays = load_settings(&LoadOptions {
            paths: config.settings.overlay_paths.clone(),
            include_env: config.settings.env_overrides,
        })?;
        let policy = StorePolicyCenter::new(store).with_overlays(overlays);
        let factory = BuiltinFeatures::with_debounce(config.reconciler.debounce());
        Ok(Self::new(
            Arc::new(classifier),
            Arc::new(policy),
            injector,
            Arc::new(factory),
            config.bridge.clone(),
        ))
    }

    pub fn classifier(&self) -> &EnvironmentClassifier {
        &self.classifier
    }

    pub fn policy(&self) -> &dyn PolicyCenter {
        self.policy.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn namespace(&self, tab: TabId) -> Option<Arc<TabNamespace>> {
        self.namespaces.get(&tab).map(|ns| Arc::clone(ns.value()))
    }

    /// Feature ids running on `tab`, in start order.
    pub fn active_features(&self, tab: TabId) -> Vec<String> {
        self.namespace(tab)
            .map(|ns| ns.feature_ids())
            .unwrap_or_default()
    }

    pub async fn on_navigation(&self, event: NavigationEvent) -> Option<Environment> {
        let tab = event.tab;
        if !event.is_main_frame {
            debug!(target: "gtm_lens::coordinator", %tab, "ignoring sub-frame navigation");
            return self.classifier.classify(tab);
        }
        self.teardown(tab).await;

        match self.classifier.on_navigation(event).await {
            Ok(ClassifierOutcome::Classified(state)) => {
                if let Err(err) = self.activate(tab, &state).await {
                    warn!(
                        target: "gtm_lens::coordinator",
                        %tab,
                        error = %err,
                        "features unavailable for this navigation"
                    );
                }
                Some(state.environment)
            }
            Ok(ClassifierOutcome::Cleared) => None,
            Ok(ClassifierOutcome::Superseded) => self.classifier.classify(tab),
            Err(err) => {
                debug!(target: "gtm_lens::coordinator", %tab, error = %err, "navigation ignored");
                self.classifier.classify(tab)
            }
        }
    }

    pub async fn on_response(&self, event: ResponseEvent) -> Option<Environment> {
        let tab = event.tab;
        match self.classifier.on_response(event).await {
            Ok(ClassifierOutcome::Cleared) => {
                self.teardown(tab).await;
                None
            }
            Ok(_) => self.classifier.classify(tab),
            Err(err) => {
                debug!(target: "gtm_lens::coordinator", %tab, error = %err, "response ignored");
                self.classifier.classify(tab)
            }
        }
    }

    pub async fn on_tab_closed(&self, tab: TabId) {
        self.classifier.on_tab_closed(tab);
        self.teardown(tab).await;
    }

    /// Stops every feature of `tab`. Returns how many were running.
    pub async fn teardown(&self, tab: TabId) -> usize {
        let Some((_, namespace)) = self.namespaces.remove(&tab) else {
            return 0;
        };
        let stopped = namespace.registry.unregister_all().await;
        debug!(target: "gtm_lens::coordinator", %tab, stopped, "namespace torn down");
        let _ = self.events.send(BridgeEvent::TornDown {
            tab,
            features: stopped,
        });
        stopped
    }

    async fn activate(&self, tab: TabId, state: &TabState) -> Result<usize, CoordinatorError> {
        let selection = self.policy.select(state.environment).await;
        if selection.features.is_empty() {
            debug!(
                target: "gtm_lens::coordinator",
                %tab,
                environment = %state.environment,
                "no features selected"
            );
            return Ok(0);
        }

        let injection = match inject_with_fallback(self.injector.as_ref(), tab, &self.bridge).await
        {
            Ok(injection) => injection,
            Err(err) => {
                let _ = self.events.send(BridgeEvent::InjectionFailed {
                    tab,
                    reason: err.to_string(),
                });
                return Err(err.into());
            }
        };
        if !self.is_current(tab, state) {
            debug!(target: "gtm_lens::coordinator", %tab, "tab reclassified during injection");
            return Ok(0);
        }

        let namespace = Arc::new(TabNamespace {
            environment: state.environment,
            mode: injection.mode,
            dom: injection.dom,
            registry: FeatureRegistry::new(),
        });
        for descriptor in &selection.features {
            if let Err(err) = self.start_feature(&namespace, descriptor).await {
                warn!(
                    target: "gtm_lens::coordinator",
                    %tab,
                    feature = %descriptor.id,
                    error = %err,
                    "feature unavailable"
                );
            }
        }

        if !self.is_current(tab, state) {
            debug!(
                target: "gtm_lens::coordinator",
                %tab,
                "tab reclassified while features started"
            );
            namespace.registry.unregister_all().await;
            return Ok(0);
        }
        let features = namespace.feature_ids();
        if let Some(previous) = self.namespaces.insert(tab, Arc::clone(&namespace)) {
            previous.registry.unregister_all().await;
        }
        info!(
            target: "gtm_lens::coordinator",
            %tab,
            environment = %state.environment,
            mode = ?injection.mode,
            features = features.len(),
            "features active"
        );
        let count = features.len();
        let _ = self.events.send(BridgeEvent::Injected {
            tab,
            mode: injection.mode,
            features,
        });
        Ok(count)
    }

    async fn start_feature(
        &self,
        namespace: &TabNamespace,
        descriptor: &FeatureDescriptor,
    ) -> Result<(), CoordinatorError> {
        let feature = self.factory.build(descriptor, Arc::clone(&namespace.dom))?;
        feature.start().await?;
        if let Some(previous) = namespace
            .registry
            .register(descriptor.api_key.clone(), feature)
        {
            previous.stop().await;
        }
        Ok(())
    }

    fn is_current(&self, tab: TabId, state: &TabState) -> bool {
        self.classifier
            .tab_state(tab)
            .map(|current| current.last_updated == state.last_updated)
            .unwrap_or(false)
    }

    async fn dispatch(&self, command: BridgeCommand) -> Result<Value, CoordinatorError> {
        match command {
            BridgeCommand::GetEnvironment { tab } => {
                let state = self.classifier.tab_state(tab);
                Ok(json!({
                    "tab": tab,
                    "environment": state.as_ref().map(|state| state.environment),
                    "state": state,
                }))
            }
            BridgeCommand::ToggleFeature {
                tab,
                feature,
                enabled,
            } => self.toggle_feature(tab, &feature, enabled).await,
            BridgeCommand::FeatureCommand {
                tab,
                feature,
                command,
                payload,
            } => {
                let active = self
                    .namespace(tab)
                    .and_then(|ns| ns.registry.get(&feature))
                    .ok_or_else(|| BridgeError::FeatureNotActive {
                        tab,
                        feature: feature.to_string(),
                    })?;
                Ok(active.command(&command, &payload)?)
            }
            BridgeCommand::ListFeatures { tab } => Ok(self.list_features(tab).await),
        }
    }

    /// Persists the flag, then starts or stops the feature on the tab's live page.
    async fn toggle_feature(
        &self,
        tab: TabId,
        feature: &FeatureId,
        enabled: bool,
    ) -> Result<Value, CoordinatorError> {
        self.policy.set_enabled(feature, enabled).await?;

        if let Some(namespace) = self.namespace(tab) {
            if enabled {
                if namespace.registry.get(feature).is_none() {
                    let selection = self.policy.select(namespace.environment).await;
                    if let Some(descriptor) =
                        selection.features.iter().find(|desc| &desc.id == feature)
                    {
                        self.start_feature(&namespace, descriptor).await?;
                    }
                }
            } else if let Some(running) = namespace.registry.unregister(feature) {
                running.stop().await;
            }
        }

        let running = self
            .namespace(tab)
            .and_then(|ns| ns.registry.get(feature))
            .map(|active| active.is_running())
            .unwrap_or(false);
        info!(target: "gtm_lens::coordinator", %tab, %feature, enabled, running, "feature toggled");
        Ok(json!({ "feature": feature, "enabled": enabled, "running": running }))
    }

    async fn list_features(&self, tab: TabId) -> Value {
        let namespace = self.namespace(tab);
        let environment = namespace
            .as_ref()
            .map(|ns| ns.environment)
            .or_else(|| self.classifier.classify(tab));
        let selection = match environment {
            Some(environment) => Some(self.policy.select(environment).await),
            None => None,
        };

        let features: Vec<Value> = self
            .policy
            .catalog()
            .iter()
            .map(|desc| {
                let selected = selection
                    .as_ref()
                    .map(|selection| selection.contains(desc.id.as_str()))
                    .unwrap_or(false);
                let running = namespace
                    .as_ref()
                    .and_then(|ns| ns.registry.get(&desc.id))
                    .map(|active| active.is_running())
                    .unwrap_or(false);
                json!({
                    "id": desc.id,
                    "api": desc.api_key,
                    "environments": desc.applicable_environments,
                    "selected": selected,
                    "running": running,
                })
            })
            .collect();
        json!({
            "tab": tab,
            "environment": environment,
            "source": selection.map(|selection| selection.source),
            "features": features,
        })
    }
}

#[async_trait]
impl MessageHandler for Coordinator {
    async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let result = match request.parse() {
            Ok(command) => self.dispatch(command).await,
            Err(err) => Err(err.into()),
        };
        let _ = self.events.send(BridgeEvent::Handled {
            command: request.command.clone(),
            ok: result.is_ok(),
        });
        match result {
            Ok(data) => BridgeResponse::success(request.req_id, data),
            Err(err) => {
                debug!(
                    target: "gtm_lens::coordinator",
                    command = %request.command,
                    error = %err,
                    "request failed"
                );
                BridgeResponse::failure(request.req_id, err)
            }
        }
    }
}
