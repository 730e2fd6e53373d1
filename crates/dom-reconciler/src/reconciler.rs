//! Observe-and-enhance loop.
//!
//! A [`Reconciler`] owns one feature's view of the page: it enhances every element matching
//! its selector exactly once, re-scans after DOM mutations settle, and on stop reverts the
//! journal of every element it still tracks. Enhanced elements carry a marker attribute
//! `data-gtm-lens-<feature>` whose value keys the tracking table, so clones produced by the
//! page are told apart from the original.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::dom::{Dom, NodeId, ObserveOptions, ObserverId};
use crate::errors::{DomError, EnhanceError, ReconcilerError};
use crate::events;
use crate::journal::DomJournal;
use crate::selector::Selector;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const MARKER_PREFIX: &str = "data-gtm-lens-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Enhanced,
    /// Nothing to do for this element yet; it stays unclaimed and is offered again next scan.
    Skipped,
}

/// Per-feature element transformation.
///
/// Every write must go through the journal so the reconciler can undo it.
pub trait Enhancer: Send + Sync {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError>;

    /// Digest of the source state an enhancement was derived from. A change between scans
    /// makes the reconciler clean the element up and enhance it again.
    fn fingerprint(&self, _dom: &dyn Dom, _node: NodeId) -> Option<String> {
        None
    }

    fn cleanup(
        &self,
        dom: &dyn Dom,
        _node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<(), DomError> {
        journal.revert(dom)
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerSpec {
    pub feature: String,
    pub selector: Selector,
    pub observe: ObserveOptions,
    pub debounce: Duration,
}

impl ReconcilerSpec {
    pub fn new(feature: impl Into<String>, selector: &str) -> Result<Self, DomError> {
        Ok(Self {
            feature: feature.into(),
            selector: Selector::parse(selector)?,
            observe: ObserveOptions::default(),
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    pub fn with_observe(mut self, observe: ObserveOptions) -> Self {
        self.observe = observe;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn marker_attribute(&self) -> String {
        format!("{MARKER_PREFIX}{}", self.feature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerState {
    Stopped,
    Starting,
    Observing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Initial,
    Rescan,
    Manual,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Initial => "initial",
            ScanKind::Rescan => "rescan",
            ScanKind::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub matched: usize,
    pub enhanced: usize,
    pub skipped: usize,
    pub refreshed: usize,
    pub released: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    pub scans: u64,
    /// Scans triggered by the mutation observer.
    pub rescans: u64,
    pub enhanced: u64,
    pub skipped: u64,
    pub refreshed: u64,
    pub released: u64,
    pub failures: u64,
    pub tracked: usize,
}

impl ReconcilerStats {
    fn absorb(&mut self, kind: ScanKind, report: &ScanReport) {
        self.scans += 1;
        if kind == ScanKind::Rescan {
            self.rescans += 1;
        }
        self.enhanced += report.enhanced as u64;
        self.skipped += report.skipped as u64;
        self.refreshed += report.refreshed as u64;
        self.released += report.released as u64;
        self.failures += report.failures as u64;
    }
}

struct Tracked {
    node: NodeId,
    journal: DomJournal,
    fingerprint: Option<String>,
}

struct Inner {
    state: ReconcilerState,
    tracked: HashMap<String, Tracked>,
    observer: Option<ObserverId>,
    shutdown: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    stats: ReconcilerStats,
}

struct Core {
    spec: ReconcilerSpec,
    marker: String,
    dom: Arc<dyn Dom>,
    enhancer: Arc<dyn Enhancer>,
    inner: Mutex<Inner>,
}

pub struct Reconciler {
    core: Arc<Core>,
}

impl Reconciler {
    pub fn new(spec: ReconcilerSpec, dom: Arc<dyn Dom>, enhancer: Arc<dyn Enhancer>) -> Self {
        let marker = spec.marker_attribute();
        Self {
            core: Arc::new(Core {
                spec,
                marker,
                dom,
                enhancer,
                inner: Mutex::new(Inner {
                    state: ReconcilerState::Stopped,
                    tracked: HashMap::new(),
                    observer: None,
                    shutdown: None,
                    task: None,
                    stats: ReconcilerStats::default(),
                }),
            }),
        }
    }

    pub fn feature(&self) -> &str {
        &self.core.spec.feature
    }

    pub fn marker_attribute(&self) -> &str {
        &self.core.marker
    }

    pub fn state(&self) -> ReconcilerState {
        self.core.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() != ReconcilerState::Stopped
    }

    pub fn stats(&self) -> ReconcilerStats {
        let inner = self.core.inner.lock();
        ReconcilerStats {
            tracked: inner.tracked.len(),
            ..inner.stats
        }
    }

    /// Enhanced elements in document order of their node ids.
    pub fn tracked_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .core
            .inner
            .lock()
            .tracked
            .values()
            .map(|t| t.node)
            .collect();
        nodes.sort();
        nodes
    }

    /// Runs the initial scan and spawns the observer task. Calling it again while running is a no-op.
    pub fn start(&self) -> Result<(), ReconcilerError> {
        let runtime = Handle::try_current().map_err(|_| ReconcilerError::NoRuntime)?;
        let core = &self.core;
        let (observer, notify) = {
            let mut inner = core.inner.lock();
            if inner.state != ReconcilerState::Stopped {
                debug!(target: "gtm_lens::reconciler", feature = %core.spec.feature, "already running");
                return Ok(());
            }
            if let Some(root) = core.spec.observe.root {
                if !core.dom.is_connected(root) {
                    return Err(ReconcilerError::NoRoot(root.to_string()));
                }
            }
            let observer = core.dom.observe(core.spec.observe.clone());
            let Some(notify) = core.dom.records_ready(observer) else {
                core.dom.disconnect(observer);
                return Err(ReconcilerError::NoRoot(format!(
                    "observer for {} vanished",
                    core.spec.feature
                )));
            };
            inner.state = ReconcilerState::Starting;
            inner.observer = Some(observer);
            (observer, notify)
        };

        core.scan(ScanKind::Initial);

        let mut inner = core.inner.lock();
        if inner.state != ReconcilerState::Starting {
            // Stopped while the initial scan ran.
            return Ok(());
        }
        let shutdown = CancellationToken::new();
        inner.task = Some(runtime.spawn(observe_loop(
            Arc::clone(core),
            observer,
            notify,
            shutdown.clone(),
        )));
        inner.shutdown = Some(shutdown);
        inner.state = ReconcilerState::Observing;
        events::emit_started(&core.spec.feature, inner.tracked.len());
        Ok(())
    }

    /// Cancels the observer task, disconnects the observer, then reverts every tracked element.
    /// Safe to call any number of times.
    pub async fn stop(&self) {
        let (shutdown, task) = {
            let mut inner = self.core.inner.lock();
            inner.state = ReconcilerState::Stopped;
            (inner.shutdown.take(), inner.task.take())
        };
        if let Some(shutdown) = shutdown {
            shutdown.cancel();
        }
        if let Some(task) = task {
            let _ = task.await;
        }
        self.core.teardown();
    }

    /// Scans immediately, outside the debounce window. Returns an empty report when stopped.
    pub fn rescan_now(&self) -> ScanReport {
        if self.state() != ReconcilerState::Observing {
            return ScanReport::default();
        }
        self.core.scan(ScanKind::Manual)
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        let mut inner = self.core.inner.lock();
        if let Some(shutdown) = inner.shutdown.take() {
            shutdown.cancel();
        }
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        if let Some(observer) = inner.observer.take() {
            self.core.dom.disconnect(observer);
        }
        inner.state = ReconcilerState::Stopped;
    }
}

impl Core {
    fn scan(&self, kind: ScanKind) -> ScanReport {
        let started = Instant::now();
        let dom = self.dom.as_ref();
        let mut report = ScanReport::default();
        let mut inner = self.inner.lock();
        if inner.state == ReconcilerState::Stopped {
            return report;
        }

        let gone: Vec<String> = inner
            .tracked
            .iter()
            .filter(|(_, t)| !dom.is_connected(t.node))
            .map(|(key, _)| key.clone())
            .collect();
        for key in gone {
            if let Some(mut tracked) = inner.tracked.remove(&key) {
                if let Err(err) = tracked.journal.revert_connected(dom) {
                    debug!(target: "gtm_lens::reconciler", feature = %self.spec.feature, error = %err, "partial revert of detached element");
                }
                report.released += 1;
            }
        }

        let stale: Vec<String> = inner
            .tracked
            .iter()
            .filter(|(_, t)| !dom.matches(t.node, &self.spec.selector))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            if let Some(tracked) = inner.tracked.remove(&key) {
                self.release(tracked);
                report.released += 1;
            }
        }

        let matched = dom.query_all(&self.spec.selector);
        report.matched = matched.len();
        for node in matched {
            if let Some(key) = self.claim_key(&inner, node) {
                let current = guarded(|| self.enhancer.fingerprint(dom, node)).unwrap_or_default();
                let unchanged = inner
                    .tracked
                    .get(&key)
                    .map(|t| t.fingerprint == current)
                    .unwrap_or(true);
                if unchanged {
                    continue;
                }
                if let Some(tracked) = inner.tracked.remove(&key) {
                    self.release(tracked);
                }
                report.refreshed += 1;
            }
            self.enhance_node(&mut inner, node, &mut report);
        }

        // Our own writes must not wake the observer task into another scan.
        if let Some(observer) = inner.observer {
            dom.take_records(observer);
        }
        inner.stats.absorb(kind, &report);
        drop(inner);
        events::emit_scan(&self.spec.feature, kind, &report, started.elapsed());
        report
    }

    fn claim_key(&self, inner: &Inner, node: NodeId) -> Option<String> {
        self.dom
            .attribute(node, &self.marker)
            .filter(|key| inner.tracked.get(key).map(|t| t.node == node).unwrap_or(false))
    }

    fn enhance_node(&self, inner: &mut Inner, node: NodeId, report: &mut ScanReport) {
        let dom = self.dom.as_ref();
        let mut journal = DomJournal::new();
        let result = guarded(|| self.enhancer.enhance(dom, node, &mut journal));
        let failure = match result {
            Ok(Ok(Outcome::Enhanced)) => {
                let key = Uuid::new_v4().to_string();
                match dom.set_attribute(node, &self.marker, &key) {
                    Ok(()) => {
                        let fingerprint =
                            guarded(|| self.enhancer.fingerprint(dom, node)).unwrap_or_default();
                        inner.tracked.insert(
                            key,
                            Tracked {
                                node,
                                journal,
                                fingerprint,
                            },
                        );
                        report.enhanced += 1;
                        return;
                    }
                    Err(err) => err.to_string(),
                }
            }
            Ok(Ok(Outcome::Skipped)) => {
                self.rollback(&mut journal);
                report.skipped += 1;
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(panic) => format!("panic: {panic}"),
        };
        self.rollback(&mut journal);
        report.failures += 1;
        events::emit_enhance_failed(&self.spec.feature, node, &failure);
    }

    fn rollback(&self, journal: &mut DomJournal) {
        if let Err(err) = journal.revert(self.dom.as_ref()) {
            debug!(target: "gtm_lens::reconciler", feature = %self.spec.feature, error = %err, "rollback incomplete");
        }
    }

    fn release(&self, mut tracked: Tracked) {
        let dom = self.dom.as_ref();
        let node = tracked.node;
        let outcome = guarded(|| self.enhancer.cleanup(dom, node, &mut tracked.journal));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(target: "gtm_lens::reconciler", feature = %self.spec.feature, %node, error = %err, "cleanup incomplete");
            }
            Err(panic) => {
                debug!(target: "gtm_lens::reconciler", feature = %self.spec.feature, %node, reason = %panic, "cleanup panicked");
                self.rollback(&mut tracked.journal);
            }
        }
        if let Err(err) = dom.remove_attribute(node, &self.marker) {
            debug!(target: "gtm_lens::reconciler", feature = %self.spec.feature, %node, error = %err, "marker removal failed");
        }
    }

    fn teardown(&self) {
        let dom = self.dom.as_ref();
        let mut inner = self.inner.lock();
        if let Some(observer) = inner.observer.take() {
            dom.disconnect(observer);
        }
        let tracked: Vec<Tracked> = inner.tracked.drain().map(|(_, t)| t).collect();
        let cleaned = tracked.len();
        for mut entry in tracked {
            if dom.is_connected(entry.node) {
                self.release(entry);
            } else if let Err(err) = entry.journal.revert_connected(dom) {
                debug!(target: "gtm_lens::reconciler", feature = %self.spec.feature, error = %err, "partial revert of detached element");
            }
        }
        inner.stats.released += cleaned as u64;
        events::emit_stopped(&self.spec.feature, cleaned);
    }
}

async fn observe_loop(
    core: Arc<Core>,
    observer: ObserverId,
    notify: Arc<Notify>,
    shutdown: CancellationToken,
) {
    let debounce = core.spec.debounce;
    'outer: loop {
        select! {
            _ = shutdown.cancelled() => break,
            _ = notify.notified() => {}
        }
        // Trailing edge: every further batch pushes the deadline out.
        let mut deadline = time::Instant::now() + debounce;
        loop {
            select! {
                _ = shutdown.cancelled() => break 'outer,
                _ = notify.notified() => {
                    deadline = time::Instant::now() + debounce;
                }
                _ = sleep_until(deadline) => break,
            }
        }
        if core.dom.take_records(observer).is_empty() {
            continue;
        }
        core.scan(ScanKind::Rescan);
    }
    debug!(target: "gtm_lens::reconciler", feature = %core.spec.feature, "observer task exited");
}

fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}
