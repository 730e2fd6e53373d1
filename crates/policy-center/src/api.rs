use std::sync::Arc;

use async_trait::async_trait;
use gtm_lens_core_types::{Environment, FeatureId};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::defaults::default_catalog;
use crate::errors::PolicyError;
use crate::model::{FeatureDescriptor, FeatureSettings, Selection};
use crate::select::{select_with_overlays, SettingsOverlay};
use crate::store::{SettingsStore, SETTINGS_KEY};

#[async_trait]
pub trait PolicyCenter: Send + Sync {
    fn catalog(&self) -> &[FeatureDescriptor];
    /// Stored settings; `None` when the store is empty, unreachable or holds garbage.
    async fn settings(&self) -> Option<FeatureSettings>;
    async fn select(&self, environment: Environment) -> Selection;
    /// Persists the `enabled` flag of one feature and returns the updated blob.
    async fn set_enabled(
        &self,
        id: &FeatureId,
        enabled: bool,
    ) -> Result<FeatureSettings, PolicyError>;
    fn subscribe(&self) -> watch::Receiver<Arc<FeatureSettings>>;
}

pub struct StorePolicyCenter {
    catalog: Vec<FeatureDescriptor>,
    store: Arc<dyn SettingsStore>,
    overlays: Vec<SettingsOverlay>,
    write_lock: Mutex<()>,
    watch_tx: watch::Sender<Arc<FeatureSettings>>,
}

impl StorePolicyCenter {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self::with_catalog(default_catalog(), store)
    }

    pub fn with_catalog(catalog: Vec<FeatureDescriptor>, store: Arc<dyn SettingsStore>) -> Self {
        let (watch_tx, _watch_rx) = watch::channel(Arc::new(FeatureSettings::default()));
        Self {
            catalog,
            store,
            overlays: Vec::new(),
            write_lock: Mutex::new(()),
            watch_tx,
        }
    }

    /// Layers applied after the stored blob, in order.
    pub fn with_overlays(mut self, overlays: Vec<SettingsOverlay>) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn descriptor(&self, id: &FeatureId) -> Option<&FeatureDescriptor> {
        self.catalog.iter().find(|desc| &desc.id == id)
    }

    async fn stored(&self) -> Result<Option<FeatureSettings>, PolicyError> {
        match self.store.get(SETTINGS_KEY).await? {
            Some(value) => serde_json::from_value::<FeatureSettings>(value)
                .map(Some)
                .map_err(|err| PolicyError::Invalid(err.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PolicyCenter for StorePolicyCenter {
    fn catalog(&self) -> &[FeatureDescriptor] {
        &self.catalog
    }

    async fn settings(&self) -> Option<FeatureSettings> {
        match self.stored().await {
            Ok(Some(settings)) => Some(settings),
            Ok(None) => {
                debug!(target: "gtm_lens::policy", "settings store empty");
                None
            }
            Err(err) => {
                warn!(target: "gtm_lens::policy", error = %err, "stored settings unavailable");
                None
            }
        }
    }

    async fn select(&self, environment: Environment) -> Selection {
        let stored = self.settings().await;
        let selection =
            select_with_overlays(environment, &self.catalog, stored.as_ref(), &self.overlays);
        if selection.is_fallback() {
            warn!(
                target: "gtm_lens::policy",
                %environment,
                "no stored settings, enabling every applicable feature"
            );
        }
        selection
    }

    async fn set_enabled(
        &self,
        id: &FeatureId,
        enabled: bool,
    ) -> Result<FeatureSettings, PolicyError> {
        if self.descriptor(id).is_none() {
            return Err(PolicyError::UnknownFeature(id.to_string()));
        }
        let _guard = self.write_lock.lock().await;
        // An unreadable blob is never overwritten.
        let mut settings = self.stored().await?.unwrap_or_default();
        settings.entry(id).enabled = Some(enabled);
        let value =
            serde_json::to_value(&settings).map_err(|err| PolicyError::Invalid(format!("{err}")))?;
        self.store.set(SETTINGS_KEY, value).await?;
        let _ = self.watch_tx.send(Arc::new(settings.clone()));
        Ok(settings)
    }

    fn subscribe(&self) -> watch::Receiver<Arc<FeatureSettings>> {
        self.watch_tx.subscribe()
    }
}
