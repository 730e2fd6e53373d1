//! Environment classifier.
//!
//! Consumes per-tab navigation and response events and keeps one [`TabState`] per tab naming the
//! GTM debugging surface it shows. Server-side previews are self-hosted on arbitrary domains, so
//! besides static origin matching the classifier looks for debug-session cookies and, when those
//! are unreadable, probes the page for the preview bootstrap global.

pub mod config;
pub mod probe;
pub mod rules;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gtm_lens_core_types::{Environment, InjectionMode, TabId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub use crate::config::{ClassifierConfig, OriginRule};
pub use crate::probe::{NoopProbe, PageProbe, ProbeError};
use crate::rules::{has_debug_cookie, OriginRules};

pub(crate) const SET_COOKIE: &str = "set-cookie";

/// Which signal produced a classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    UrlPattern,
    DebugCookie,
    DebugGlobal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabState {
    pub environment: Environment,
    pub source_url: String,
    /// Process-wide sequence number of the event that produced this state.
    pub last_updated: u64,
    pub updated_at: DateTime<Utc>,
    pub evidence: Evidence,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub tab: TabId,
    pub url: String,
    #[serde(default = "main_frame_default")]
    pub is_main_frame: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub tab: TabId,
    pub url: String,
    #[serde(default = "main_frame_default")]
    pub is_main_frame: bool,
    #[serde(default)]
    pub headers: Vec<Header>,
}

fn main_frame_default() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassifierEvent {
    Classified { tab: TabId, state: TabState },
    Cleared { tab: TabId },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("event for {0} ignored: not a main-frame event")]
    NotMainFrame(TabId),
}

pub type ClassifierBus = broadcast::Sender<ClassifierEvent>;

/// Result of feeding one event into the classifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Classified(TabState),
    Cleared,
    /// A newer event for the tab arrived while this one was waiting on the probe.
    Superseded,
}

pub struct EnvironmentClassifier {
    pub bus: ClassifierBus,
    tabs: DashMap<TabId, TabState>,
    latest: DashMap<TabId, u64>,
    cookie_evidence: DashMap<TabId, String>,
    seq: AtomicU64,
    origins: OriginRules,
    probe: Arc<dyn PageProbe>,
    config: ClassifierConfig,
}

impl EnvironmentClassifier {
    pub fn new(probe: Arc<dyn PageProbe>) -> (Self, broadcast::Receiver<ClassifierEvent>) {
        Self::with_config(ClassifierConfig::default(), probe)
    }

    pub fn with_config(
        config: ClassifierConfig,
        probe: Arc<dyn PageProbe>,
    ) -> (Self, broadcast::Receiver<ClassifierEvent>) {
        let (tx, rx) = broadcast::channel(config.bus_capacity.max(1));
        let origins = OriginRules::compile(&config.origins);
        (
            Self {
                bus: tx,
                tabs: DashMap::new(),
                latest: DashMap::new(),
                cookie_evidence: DashMap::new(),
                seq: AtomicU64::new(0),
                origins,
                probe,
                config,
            },
            rx,
        )
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, tab: TabId) -> Option<Environment> {
        self.tabs.get(&tab).map(|state| state.environment)
    }

    pub fn tab_state(&self, tab: TabId) -> Option<TabState> {
        self.tabs.get(&tab).map(|state| state.clone())
    }

    pub fn tabs(&self) -> Vec<(TabId, TabState)> {
        let mut all: Vec<_> = self
            .tabs
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(tab, _)| *tab);
        all
    }

    /// Main-frame navigation commit.
    pub async fn on_navigation(&self, event: NavigationEvent) -> Result<Outcome, ClassifierError> {
        if !event.is_main_frame {
            return Err(ClassifierError::NotMainFrame(event.tab));
        }
        let seq = self.begin(event.tab);

        let cookie_seen = self
            .cookie_evidence
            .get(&event.tab)
            .map(|url| *url == event.url)
            .unwrap_or(false);
        if cookie_seen {
            return Ok(self.apply(
                event.tab,
                seq,
                Environment::ServerSidePreview,
                Evidence::DebugCookie,
                event.url,
            ));
        }
        self.cookie_evidence.remove(&event.tab);

        if self.config.probe_enabled {
            let found = self.probe_marker(event.tab).await;
            if !self.is_current(event.tab, seq) {
                debug!(
                    target: "gtm_lens::classifier",
                    tab = %event.tab,
                    seq,
                    "discarding stale probe result"
                );
                return Ok(Outcome::Superseded);
            }
            if found {
                return Ok(self.apply(
                    event.tab,
                    seq,
                    Environment::ServerSidePreview,
                    Evidence::DebugGlobal,
                    event.url,
                ));
            }
        }

        Ok(self.resolve_by_url(event.tab, seq, event.url))
    }

    /// Main-frame response headers.
    pub async fn on_response(&self, event: ResponseEvent) -> Result<Outcome, ClassifierError> {
        if !event.is_main_frame {
            return Err(ClassifierError::NotMainFrame(event.tab));
        }
        let seq = self.begin(event.tab);

        if has_debug_cookie(&event.headers, &self.config) {
            self.cookie_evidence.insert(event.tab, event.url.clone());
            return Ok(self.apply(
                event.tab,
                seq,
                Environment::ServerSidePreview,
                Evidence::DebugCookie,
                event.url,
            ));
        }
        self.cookie_evidence.remove(&event.tab);
        Ok(self.resolve_by_url(event.tab, seq, event.url))
    }

    pub fn on_tab_closed(&self, tab: TabId) {
        self.latest.remove(&tab);
        self.cookie_evidence.remove(&tab);
        if self.tabs.remove(&tab).is_some() {
            let _ = self.bus.send(ClassifierEvent::Cleared { tab });
        }
    }

    fn begin(&self, tab: TabId) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.insert(tab, seq);
        seq
    }

    fn is_current(&self, tab: TabId, seq: u64) -> bool {
        self.latest.get(&tab).map(|latest| *latest == seq).unwrap_or(false)
    }

    fn resolve_by_url(&self, tab: TabId, seq: u64, url: String) -> Outcome {
        match self.origins.match_url(&url) {
            Some(environment) => self.apply(tab, seq, environment, Evidence::UrlPattern, url),
            None => self.clear(tab),
        }
    }

    fn apply(
        &self,
        tab: TabId,
        seq: u64,
        environment: Environment,
        evidence: Evidence,
        source_url: String,
    ) -> Outcome {
        let state = TabState {
            environment,
            source_url,
            last_updated: seq,
            updated_at: Utc::now(),
            evidence,
        };
        info!(
            target: "gtm_lens::classifier",
            %tab,
            %environment,
            ?evidence,
            "tab classified"
        );
        self.tabs.insert(tab, state.clone());
        let _ = self.bus.send(ClassifierEvent::Classified {
            tab,
            state: state.clone(),
        });
        Outcome::Classified(state)
    }

    fn clear(&self, tab: TabId) -> Outcome {
        if self.tabs.remove(&tab).is_some() {
            debug!(target: "gtm_lens::classifier", %tab, "no signal, state cleared");
            let _ = self.bus.send(ClassifierEvent::Cleared { tab });
        }
        Outcome::Cleared
    }

    /// Runs the page probe, retrying once with the fallback mode when the first injection is
    /// rejected. Every failure is "no evidence".
    async fn probe_marker(&self, tab: TabId) -> bool {
        let mut mode = InjectionMode::MainWorld;
        loop {
            match self.probe_once(tab, mode).await {
                Ok(found) => return found,
                Err(ProbeError::InjectionRejected(reason)) => match mode.fallback() {
                    Some(next) => {
                        debug!(
                            target: "gtm_lens::classifier",
                            %tab,
                            %reason,
                            ?next,
                            "probe injection rejected, retrying"
                        );
                        mode = next;
                    }
                    None => {
                        debug!(target: "gtm_lens::classifier", %tab, %reason, "probe unavailable");
                        return false;
                    }
                },
                Err(err) => {
                    debug!(target: "gtm_lens::classifier", %tab, error = %err, "probe failed");
                    return false;
                }
            }
        }
    }

    async fn probe_once(&self, tab: TabId, mode: InjectionMode) -> Result<bool, ProbeError> {
        let timeout = Duration::from_millis(self.config.probe_timeout_ms.max(1));
        let probe = self.probe.probe_global(tab, &self.config.global_marker, mode);
        match tokio::time::timeout(timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Internal("probe timed out".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> EnvironmentClassifier {
        EnvironmentClassifier::new(Arc::new(NoopProbe)).0
    }

    fn nav(tab: i64, url: &str) -> NavigationEvent {
        NavigationEvent {
            tab: TabId(tab),
            url: url.into(),
            is_main_frame: true,
        }
    }

    #[tokio::test]
    async fn url_patterns_classify_google_hosted_surfaces() {
        let classifier = classifier();
        classifier
            .on_navigation(nav(1, "https://tagmanager.google.com/#/home"))
            .await
            .unwrap();
        classifier
            .on_navigation(nav(2, "https://tagassistant.google.com/"))
            .await
            .unwrap();
        assert_eq!(classifier.classify(TabId(1)), Some(Environment::ClientUi));
        assert_eq!(classifier.classify(TabId(2)), Some(Environment::TagAssistant));
    }

    #[tokio::test]
    async fn sub_frames_are_ignored() {
        let classifier = classifier();
        let mut event = nav(1, "https://tagmanager.google.com/");
        event.is_main_frame = false;
        assert_eq!(
            classifier.on_navigation(event).await,
            Err(ClassifierError::NotMainFrame(TabId(1)))
        );
        assert_eq!(classifier.classify(TabId(1)), None);
    }

    #[tokio::test]
    async fn sequence_numbers_increase() {
        let classifier = classifier();
        let first = classifier
            .on_navigation(nav(1, "https://tagmanager.google.com/"))
            .await
            .unwrap();
        let second = classifier
            .on_navigation(nav(1, "https://tagassistant.google.com/"))
            .await
            .unwrap();
        match (first, second) {
            (Outcome::Classified(a), Outcome::Classified(b)) => {
                assert!(b.last_updated > a.last_updated)
            }
            other => panic!("unexpected outcomes: {other:?}"),
        }
    }
}
