use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use gtm_lens_core_types::{Environment, FeatureId};
use serde_json::{json, Value};

use crate::api::{PolicyCenter, StorePolicyCenter};
use crate::defaults::{default_catalog, CONSENT_STATUS_MONITOR, TAGS_STATUS_COLORING};
use crate::errors::PolicyError;
use crate::loader::{load_settings, settings_from_vars, LoadOptions};
use crate::model::{FeatureSettings, PolicySource, SettingsSource};
use crate::select::{select_features, select_with_overlays, SettingsOverlay};
use crate::store::{FileSettingsStore, InMemorySettingsStore, SettingsStore, SETTINGS_KEY};

struct BrokenStore;

#[async_trait]
impl SettingsStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>, PolicyError> {
        Err(PolicyError::Store("offline".into()))
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<(), PolicyError> {
        Err(PolicyError::Store("offline".into()))
    }
}

/// Reads fail; writes are recorded.
#[derive(Default)]
struct WriteOnlyStore {
    writes: Mutex<Vec<Value>>,
}

#[async_trait]
impl SettingsStore for WriteOnlyStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>, PolicyError> {
        Err(PolicyError::Store("read timed out".into()))
    }

    async fn set(&self, _key: &str, value: Value) -> Result<(), PolicyError> {
        self.writes.lock().unwrap().push(value);
        Ok(())
    }
}

fn settings(value: Value) -> FeatureSettings {
    serde_json::from_value(value).unwrap()
}

#[test]
fn catalog_order_is_declared_priority() {
    let catalog = default_catalog();
    let orders: Vec<i32> = catalog.iter().map(|desc| desc.order).collect();
    let mut sorted = orders.clone();
    sorted.sort();
    assert_eq!(orders, sorted);
    assert_eq!(catalog[0].id.as_str(), "inline-json-formatting");
    assert_eq!(catalog[5].api_key, "previewUIFilters");
}

#[test]
fn disabled_feature_is_excluded_even_when_environment_applies() {
    let stored = settings(json!({
        "features": [{"id": CONSENT_STATUS_MONITOR, "enabled": false}]
    }));
    let selection = select_features(Environment::ServerSidePreview, Some(&stored));
    assert_eq!(selection.source, SettingsSource::Store);
    assert!(!selection.contains(CONSENT_STATUS_MONITOR));
    assert!(selection.contains(TAGS_STATUS_COLORING));
}

#[test]
fn environment_filter_applies() {
    let selection = select_features(Environment::ClientUi, Some(&FeatureSettings::default()));
    assert_eq!(
        selection.ids(),
        vec!["tags-type-coloring", "tags-status-coloring"]
    );
}

#[test]
fn missing_settings_fail_open_and_say_so() {
    let selection = select_features(Environment::ServerSidePreview, None);
    assert!(selection.is_fallback());
    assert_eq!(selection.features.len(), 6);
}

#[test]
fn whitelist_narrows_catalog_environments() {
    let stored = settings(json!({
        "features": [{"id": "tags-type-coloring", "environments": ["GTMTASS"]}]
    }));
    let ui = select_features(Environment::ClientUi, Some(&stored));
    assert!(!ui.contains("tags-type-coloring"));
    let ss = select_features(Environment::ServerSidePreview, Some(&stored));
    assert!(ss.contains("tags-type-coloring"));

    // A whitelist cannot widen a feature beyond its catalog environments.
    let stored = settings(json!({
        "features": [{"id": "urls-formatter", "environments": ["client_ui"]}]
    }));
    assert!(!select_features(Environment::ClientUi, Some(&stored)).contains("urls-formatter"));
}

#[test]
fn order_override_reorders_and_ties_keep_catalog_order() {
    let stored = settings(json!({
        "features": [
            {"id": "tags-status-coloring", "order": 5},
            {"id": "preview-ui-filtering", "order": 10},
            {"id": "no-such-feature", "enabled": true}
        ]
    }));
    let selection = select_features(Environment::TagAssistant, Some(&stored));
    assert_eq!(
        selection.ids(),
        vec![
            "tags-status-coloring",
            "preview-ui-filtering",
            "tags-type-coloring"
        ]
    );
}

#[test]
fn overlays_win_over_store_and_record_source() {
    let stored = settings(json!({"features": [{"id": "tags-type-coloring", "enabled": true}]}));
    let overlay = SettingsOverlay {
        source: PolicySource::Env,
        settings: settings(json!({"features": [{"id": "tags-type-coloring", "enabled": false}]})),
    };
    let selection =
        select_with_overlays(Environment::ClientUi, &default_catalog(), Some(&stored), &[overlay]);
    assert_eq!(selection.ids(), vec!["tags-status-coloring"]);

    let overlay = SettingsOverlay {
        source: PolicySource::File,
        settings: settings(json!({"features": [{"id": "tags-status-coloring", "order": 1}]})),
    };
    let selection =
        select_with_overlays(Environment::ClientUi, &default_catalog(), None, &[overlay]);
    assert!(selection.is_fallback());
    assert_eq!(selection.features[0].source, PolicySource::File);
    assert_eq!(selection.features[1].source, PolicySource::Builtin);
}

#[tokio::test]
async fn center_reads_store_and_persists_toggles() {
    let store = Arc::new(InMemorySettingsStore::new());
    let center = StorePolicyCenter::new(store.clone());
    assert_eq!(center.settings().await, None);
    assert!(center.select(Environment::ClientUi).await.is_fallback());

    let mut rx = center.subscribe();
    center
        .set_enabled(&FeatureId::from("tags-type-coloring"), false)
        .await
        .unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().features.len(), 1);

    let stored = store.get(SETTINGS_KEY).await.unwrap().unwrap();
    assert_eq!(stored["features"][0]["enabled"], json!(false));

    let selection = center.select(Environment::ClientUi).await;
    assert_eq!(selection.source, SettingsSource::Store);
    assert_eq!(selection.ids(), vec!["tags-status-coloring"]);
}

#[tokio::test]
async fn unknown_feature_toggle_is_rejected() {
    let center = StorePolicyCenter::new(Arc::new(InMemorySettingsStore::new()));
    let err = center
        .set_enabled(&FeatureId::from("nope"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::UnknownFeature(_)));
}

#[tokio::test]
async fn unreachable_store_falls_back() {
    let center = StorePolicyCenter::new(Arc::new(BrokenStore));
    let selection = center.select(Environment::TagAssistant).await;
    assert!(selection.is_fallback());
    assert_eq!(selection.features.len(), 3);
    assert!(center
        .set_enabled(&FeatureId::from("tags-type-coloring"), true)
        .await
        .is_err());
}

#[tokio::test]
async fn garbage_in_store_falls_back() {
    let store = Arc::new(InMemorySettingsStore::with_value(SETTINGS_KEY, json!("oops")));
    let center = StorePolicyCenter::new(store);
    assert!(center.select(Environment::ClientUi).await.is_fallback());
}

#[tokio::test]
async fn toggle_does_not_overwrite_garbage() {
    let store = Arc::new(InMemorySettingsStore::with_value(SETTINGS_KEY, json!("oops")));
    let center = StorePolicyCenter::new(store.clone());
    let mut rx = center.subscribe();

    let err = center
        .set_enabled(&FeatureId::from("tags-type-coloring"), false)
        .await
        .unwrap_err();

    assert!(matches!(err, PolicyError::Invalid(_)));
    assert_eq!(store.get(SETTINGS_KEY).await.unwrap(), Some(json!("oops")));
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn toggle_fails_when_store_cannot_be_read() {
    let store = Arc::new(WriteOnlyStore::default());
    let center = StorePolicyCenter::new(store.clone());

    let err = center
        .set_enabled(&FeatureId::from("tags-type-coloring"), true)
        .await
        .unwrap_err();

    assert!(matches!(err, PolicyError::Store(_)));
    assert!(store.writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn file_store_round_trips_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.json");
    let store = FileSettingsStore::new(&path);
    assert_eq!(store.get(SETTINGS_KEY).await.unwrap(), None);

    store.set("other", json!(1)).await.unwrap();
    store
        .set(SETTINGS_KEY, json!({"features": []}))
        .await
        .unwrap();
    assert_eq!(store.get("other").await.unwrap(), Some(json!(1)));
    assert_eq!(
        store.get(SETTINGS_KEY).await.unwrap(),
        Some(json!({"features": []}))
    );

    std::fs::write(&path, "[1, 2]").unwrap();
    assert!(matches!(
        store.get(SETTINGS_KEY).await,
        Err(PolicyError::Invalid(_))
    ));
}

#[test]
fn settings_file_accepts_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("features.yaml");
    std::fs::write(
        &file_path,
        r#"features:
  - id: preview-ui-filtering
    enabled: false
  - id: tags-type-coloring
    environments: [GTMUI, tag_assistant]
"#,
    )
    .unwrap();

    let overlays = load_settings(&LoadOptions {
        paths: vec![file_path, dir.path().join("missing.yaml")],
        include_env: false,
    })
    .unwrap();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].source, PolicySource::File);
    let settings = &overlays[0].settings;
    assert_eq!(
        settings
            .get(&FeatureId::from("tags-type-coloring"))
            .and_then(|s| s.environments.clone()),
        Some(vec![Environment::ClientUi, Environment::TagAssistant])
    );
}

#[test]
fn env_vars_map_to_settings() {
    let vars = vec![
        ("GTM_LENS_FEATURE__TAGS_TYPE_COLORING__ENABLED".to_string(), "false".to_string()),
        ("GTM_LENS_FEATURE__URLS_FORMATTER__ORDER".to_string(), "99".to_string()),
        (
            "GTM_LENS_FEATURE__PREVIEW_UI_FILTERING__ENVIRONMENTS".to_string(),
            "GTMTASS, tag_assistant".to_string(),
        ),
        ("GTM_LENS_FEATURE__URLS_FORMATTER__COLOR".to_string(), "red".to_string()),
        ("PATH".to_string(), "/bin".to_string()),
    ];
    let settings = settings_from_vars(vars).unwrap();
    assert_eq!(settings.features.len(), 3);
    let coloring = settings.get(&FeatureId::from("tags-type-coloring")).unwrap();
    assert_eq!(coloring.enabled, Some(false));
    let urls = settings.get(&FeatureId::from("urls-formatter")).unwrap();
    assert_eq!(urls.order, Some(99));
    let filtering = settings.get(&FeatureId::from("preview-ui-filtering")).unwrap();
    assert_eq!(
        filtering.environments,
        Some(vec![Environment::ServerSidePreview, Environment::TagAssistant])
    );
}

#[test]
fn env_vars_reject_bad_values() {
    let vars = vec![(
        "GTM_LENS_FEATURE__URLS_FORMATTER__ENABLED".to_string(),
        "sometimes".to_string(),
    )];
    assert!(matches!(
        settings_from_vars(vars),
        Err(PolicyError::InvalidValue(_))
    ));
}

#[test]
fn process_env_layer_is_loaded() {
    let _guard = env_guard().lock().unwrap();
    let key = "GTM_LENS_FEATURE__CONSENT_STATUS_MONITOR__ENABLED";
    env::set_var(key, "0");
    let overlays = load_settings(&LoadOptions {
        paths: Vec::new(),
        include_env: true,
    });
    env::remove_var(key);
    let overlays = overlays.unwrap();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].source, PolicySource::Env);
    assert_eq!(
        overlays[0]
            .settings
            .get(&FeatureId::from(CONSENT_STATUS_MONITOR))
            .and_then(|s| s.enabled),
        Some(false)
    );
}

fn env_guard() -> &'static Mutex<()> {
    static ENV_GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_GUARD.get_or_init(|| Mutex::new(()))
}
