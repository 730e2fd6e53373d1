use std::sync::Arc;

use gtm_lens_core_types::FeatureId;
use parking_lot::RwLock;
use tracing::debug;

use crate::feature::Feature;

struct Entry {
    api_key: String,
    feature: Arc<dyn Feature>,
}

/// Per-page namespace of live features, in registration order.
#[derive(Default)]
pub struct FeatureRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `feature` under `api_key`, returning the feature it replaced.
    pub fn register(
        &self,
        api_key: impl Into<String>,
        feature: Arc<dyn Feature>,
    ) -> Option<Arc<dyn Feature>> {
        let api_key = api_key.into();
        let mut entries = self.entries.write();
        let previous = entries
            .iter()
            .position(|entry| entry.feature.id() == feature.id() || entry.api_key == api_key)
            .map(|idx| entries.remove(idx).feature);
        entries.push(Entry { api_key, feature });
        previous
    }

    pub fn get(&self, id: &FeatureId) -> Option<Arc<dyn Feature>> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.feature.id() == id)
            .map(|entry| Arc::clone(&entry.feature))
    }

    pub fn get_by_api(&self, api_key: &str) -> Option<Arc<dyn Feature>> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.api_key == api_key)
            .map(|entry| Arc::clone(&entry.feature))
    }

    pub fn unregister(&self, id: &FeatureId) -> Option<Arc<dyn Feature>> {
        let mut entries = self.entries.write();
        let idx = entries.iter().position(|entry| entry.feature.id() == id)?;
        Some(entries.remove(idx).feature)
    }

    /// Stops and drops every feature, newest first. Returns how many were registered.
    pub async fn unregister_all(&self) -> usize {
        let drained: Vec<Entry> = std::mem::take(&mut *self.entries.write());
        let count = drained.len();
        for entry in drained.into_iter().rev() {
            entry.feature.stop().await;
            debug!(target: "gtm_lens::features", feature = %entry.feature.id(), api = %entry.api_key, "feature unregistered");
        }
        count
    }

    pub fn ids(&self) -> Vec<FeatureId> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.feature.id().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
