use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gtm_lens_core_types::{Environment, InjectionMode, TabId};
use gtm_lens_env_classifier::{
    ClassifierEvent, EnvironmentClassifier, Evidence, Header, NavigationEvent, NoopProbe, Outcome,
    PageProbe, ProbeError, ResponseEvent,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct ScriptedProbe {
    responses: Mutex<VecDeque<Result<bool, ProbeError>>>,
    modes: Mutex<Vec<InjectionMode>>,
}

impl ScriptedProbe {
    fn with(responses: Vec<Result<bool, ProbeError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            modes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PageProbe for ScriptedProbe {
    async fn probe_global(
        &self,
        _tab: TabId,
        marker: &str,
        mode: InjectionMode,
    ) -> Result<bool, ProbeError> {
        assert_eq!(marker, "_gtmDebugBootstrap");
        self.modes.lock().push(mode);
        self.responses.lock().pop_front().unwrap_or(Ok(false))
    }
}

/// Blocks the first call until released; later calls answer immediately.
struct GatedProbe {
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PageProbe for GatedProbe {
    async fn probe_global(
        &self,
        _tab: TabId,
        _marker: &str,
        _mode: InjectionMode,
    ) -> Result<bool, ProbeError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.release.notified().await;
            return Ok(true);
        }
        Ok(false)
    }
}

fn nav(tab: i64, url: &str) -> NavigationEvent {
    NavigationEvent {
        tab: TabId(tab),
        url: url.into(),
        is_main_frame: true,
    }
}

fn response(tab: i64, url: &str, cookies: &[&str]) -> ResponseEvent {
    ResponseEvent {
        tab: TabId(tab),
        url: url.into(),
        is_main_frame: true,
        headers: cookies
            .iter()
            .map(|value| Header {
                name: "Set-Cookie".into(),
                value: (*value).into(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn unmatched_url_without_evidence_is_unset() {
    let (classifier, _rx) = EnvironmentClassifier::new(Arc::new(NoopProbe));
    let outcome = classifier
        .on_navigation(nav(7, "https://shop.example.com/"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Cleared);
    assert_eq!(classifier.classify(TabId(7)), None);
}

#[tokio::test]
async fn debug_cookie_marks_server_side_preview() {
    let (classifier, _rx) = EnvironmentClassifier::new(Arc::new(NoopProbe));
    classifier
        .on_response(response(3, "https://sgtm.example.com/gtm/debug?id=1", &["gtm_debug=abc; Path=/"]))
        .await
        .unwrap();
    assert_eq!(
        classifier.classify(TabId(3)),
        Some(Environment::ServerSidePreview)
    );

    // The commit for the same document keeps the cookie evidence.
    classifier
        .on_navigation(nav(3, "https://sgtm.example.com/gtm/debug?id=1"))
        .await
        .unwrap();
    let state = classifier.tab_state(TabId(3)).unwrap();
    assert_eq!(state.environment, Environment::ServerSidePreview);
    assert_eq!(state.evidence, Evidence::DebugCookie);
}

#[tokio::test]
async fn cookie_evidence_overrides_url_pattern() {
    let (classifier, _rx) = EnvironmentClassifier::new(Arc::new(NoopProbe));
    classifier
        .on_response(response(1, "https://tagassistant.google.com/", &["gtm_preview=1"]))
        .await
        .unwrap();
    assert_eq!(
        classifier.classify(TabId(1)),
        Some(Environment::ServerSidePreview)
    );
}

#[tokio::test]
async fn response_without_signal_clears_state() {
    let (classifier, _rx) = EnvironmentClassifier::new(Arc::new(NoopProbe));
    classifier
        .on_navigation(nav(1, "https://tagmanager.google.com/"))
        .await
        .unwrap();
    classifier
        .on_response(response(1, "https://www.example.org/", &["sid=1"]))
        .await
        .unwrap();
    assert_eq!(classifier.classify(TabId(1)), None);
}

#[tokio::test]
async fn probe_marker_marks_server_side_preview() {
    let probe = ScriptedProbe::with(vec![Ok(true)]);
    let (classifier, _rx) = EnvironmentClassifier::new(probe.clone());
    classifier
        .on_navigation(nav(4, "https://preview.example.net/"))
        .await
        .unwrap();
    let state = classifier.tab_state(TabId(4)).unwrap();
    assert_eq!(state.environment, Environment::ServerSidePreview);
    assert_eq!(state.evidence, Evidence::DebugGlobal);
    assert_eq!(*probe.modes.lock(), vec![InjectionMode::MainWorld]);
}

#[tokio::test]
async fn rejected_injection_retries_once_with_fallback() {
    let probe = ScriptedProbe::with(vec![
        Err(ProbeError::InjectionRejected("csp".into())),
        Ok(true),
    ]);
    let (classifier, _rx) = EnvironmentClassifier::new(probe.clone());
    classifier
        .on_navigation(nav(4, "https://preview.example.net/"))
        .await
        .unwrap();
    assert_eq!(
        classifier.classify(TabId(4)),
        Some(Environment::ServerSidePreview)
    );
    assert_eq!(
        *probe.modes.lock(),
        vec![InjectionMode::MainWorld, InjectionMode::ScriptElement]
    );
}

#[tokio::test]
async fn failed_probe_is_no_evidence() {
    let probe = ScriptedProbe::with(vec![
        Err(ProbeError::InjectionRejected("csp".into())),
        Err(ProbeError::InjectionRejected("csp".into())),
        Ok(true),
    ]);
    let (classifier, _rx) = EnvironmentClassifier::new(probe.clone());
    let outcome = classifier
        .on_navigation(nav(4, "https://preview.example.net/"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Cleared);
    assert_eq!(probe.modes.lock().len(), 2);

    let probe = ScriptedProbe::with(vec![Err(ProbeError::Internal("boom".into()))]);
    let (classifier, _rx) = EnvironmentClassifier::new(probe.clone());
    classifier
        .on_navigation(nav(5, "https://tagmanager.google.com/"))
        .await
        .unwrap();
    assert_eq!(classifier.classify(TabId(5)), Some(Environment::ClientUi));
    assert_eq!(probe.modes.lock().len(), 1);
}

#[tokio::test]
async fn stale_probe_result_is_discarded() {
    let probe = Arc::new(GatedProbe {
        calls: AtomicUsize::new(0),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let (classifier, _rx) = EnvironmentClassifier::new(probe.clone());
    let classifier = Arc::new(classifier);

    let slow = {
        let classifier = Arc::clone(&classifier);
        tokio::spawn(async move {
            classifier
                .on_navigation(nav(9, "https://preview.example.net/"))
                .await
        })
    };
    probe.entered.notified().await;

    classifier
        .on_navigation(nav(9, "https://tagmanager.google.com/"))
        .await
        .unwrap();
    probe.release.notify_one();

    let outcome = slow.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Superseded);
    assert_eq!(classifier.classify(TabId(9)), Some(Environment::ClientUi));
}

#[tokio::test]
async fn tab_close_clears_state_and_publishes() {
    let (classifier, mut rx) = EnvironmentClassifier::new(Arc::new(NoopProbe));
    classifier
        .on_navigation(nav(2, "https://tagassistant.google.com/"))
        .await
        .unwrap();
    classifier.on_tab_closed(TabId(2));
    assert_eq!(classifier.classify(TabId(2)), None);

    match rx.recv().await.unwrap() {
        ClassifierEvent::Classified { tab, state } => {
            assert_eq!(tab, TabId(2));
            assert_eq!(state.environment, Environment::TagAssistant);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        rx.recv().await.unwrap(),
        ClassifierEvent::Cleared { tab: TabId(2) }
    );
}

#[test]
fn events_deserialize_from_host_payloads() {
    let event: ResponseEvent = serde_json::from_str(
        r#"{"tab": 12, "url": "https://a.test/", "headers": [{"name": "set-cookie", "value": "x=1"}]}"#,
    )
    .unwrap();
    assert!(event.is_main_frame);
    assert_eq!(event.tab, TabId(12));
    assert_eq!(event.headers.len(), 1);
}
