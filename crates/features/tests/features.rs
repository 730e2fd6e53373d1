use std::sync::Arc;
use std::time::Duration;

use gtm_lens_dom_reconciler::{Dom, MemoryDom, NodeId, Selector};
use gtm_lens_features::{BuiltinFeatures, Feature, FeatureError, FeatureFactory, FeatureRegistry};
use gtm_lens_policy_center::defaults::{
    CONSENT_STATUS_MONITOR, INLINE_JSON_FORMATTING, PREVIEW_UI_FILTERING, TAGS_STATUS_COLORING,
    TAGS_TYPE_COLORING, URLS_FORMATTER,
};
use gtm_lens_policy_center::{default_catalog, feature_ids, FeatureDescriptor};
use serde_json::{json, Value};
use tokio::time::sleep;

const TAGS: &str = concat!(
    r#"<tags-tab id="tab">"#,
    r#"<div class="gtm-debug-card" id="c1"><div class="gtm-debug-card__title">GA4 - Purchase</div><div class="gtm-debug-card__subtitle">Google Analytics: GA4 Event</div><span id="s1">Succeeded</span></div>"#,
    r#"<div class="gtm-debug-card" id="c2"><div class="gtm-debug-card__title">FB Pixel</div><div class="gtm-debug-card__subtitle">Facebook Pixel</div><span id="s2">Failed</span></div>"#,
    r#"<div class="gtm-debug-card" id="c3"><div class="gtm-debug-card__title">Old tag</div><div class="gtm-debug-card__subtitle">Paused</div></div>"#,
    r#"</tags-tab>"#,
);

const BODIES: &str = concat!(
    r#"<div class="gtm-debug-table-cell--http-body"><pre id="json" data-ng-bind="ctrl.getBody()">{"value":12.5,"event":"purchase"}</pre></div>"#,
    r#"<div class="gtm-debug-table-cell--http-body"><pre id="plain" data-ng-bind="ctrl.getBody()">not json</pre></div>"#,
);

const URLS: &str = concat!(
    r#"<http-url-details><div class="gtm-debug-table-row">"#,
    r#"<div class="gtm-debug-table-cell gtm-debug-table-cell--query-param" id="method"><pre>GET</pre></div>"#,
    r#"<div class="gtm-debug-table-cell" id="url"><pre id="url-pre">https://sgtm.example.com/g/collect?v=2&amp;en=page_view</pre></div>"#,
    r#"</div></http-url-details>"#,
);

const MESSAGES: &str = concat!(
    r#"<div class="message-list__group"><div class="message-list__row message-list__row--child-selected">"#,
    r#"<span class="wd-debug-message-title" id="title" title="collect?v=2&amp;gcs=G111">collect</span>"#,
    r#"</div></div>"#,
    r#"<div id="details"><div class="blg-card-tabs" id="tabs"></div></div>"#,
);

const BLOCKED: &str = concat!(
    r#"<tags-tab__blocked-tags id="blocked">"#,
    r#"<div class="gtm-debug-card" id="b1"><div class="gtm-debug-card__title">Blocked floodlight</div><div class="gtm-debug-card__subtitle">Floodlight Counter - Blocked</div></div>"#,
    r#"</tags-tab__blocked-tags>"#,
);

const VARIABLES: &str = concat!(
    r#"<variables-tab id="vars">"#,
    r#"<div class="gtm-debug-variable-table-row" id="v1">"#,
    r#"<div class="gtm-debug-table-cell">ecommerce.value</div>"#,
    r#"<div class="gtm-debug-table-cell gtm-debug-variable-table-cell-20">Data Layer Variable</div>"#,
    r#"<div class="gtm-debug-table-cell">number</div>"#,
    r#"<div class="gtm-debug-table-cell">12.5</div>"#,
    r#"</div>"#,
    r#"<div class="gtm-debug-variable-table-row" id="v2">"#,
    r#"<div class="gtm-debug-table-cell">Page Path</div>"#,
    r#"<div class="gtm-debug-table-cell gtm-debug-variable-table-cell-20">URL</div>"#,
    r#"<div class="gtm-debug-table-cell">string</div>"#,
    r#"<div class="gtm-debug-table-cell">/checkout</div>"#,
    r#"</div>"#,
    r#"<div class="gtm-debug-table-row" id="v3">"#,
    r#"<div class="gtm-debug-table-cell">Event</div>"#,
    r#"<div class="gtm-debug-table-cell gtm-debug-variable-table-cell-20">Data Layer Variable</div>"#,
    r#"<div class="gtm-debug-table-cell">string</div>"#,
    r#"<div class="gtm-debug-table-cell">purchase</div>"#,
    r#"</div>"#,
    r#"</variables-tab>"#,
);

fn page(body: &str) -> Arc<MemoryDom> {
    let html = format!("<html><head></head><body>{body}</body></html>");
    Arc::new(MemoryDom::parse(&html).unwrap())
}

fn descriptor(id: &str) -> FeatureDescriptor {
    default_catalog()
        .into_iter()
        .find(|descriptor| descriptor.id.as_str() == id)
        .unwrap()
}

fn build(id: &str, dom: &Arc<MemoryDom>) -> Arc<dyn Feature> {
    BuiltinFeatures::default()
        .build(&descriptor(id), Arc::clone(dom) as Arc<dyn Dom>)
        .unwrap()
}

fn node(dom: &MemoryDom, id: &str) -> NodeId {
    dom.by_id(id).unwrap()
}

fn select(dom: &MemoryDom, root: NodeId, selector: &str) -> Vec<NodeId> {
    dom.query_within(root, &Selector::parse(selector).unwrap())
}

#[tokio::test(start_paused = true)]
async fn tag_type_coloring_marks_vendors_and_restores() {
    let dom = page(TAGS);
    let before = dom.snapshot();
    let feature = build(TAGS_TYPE_COLORING, &dom);
    feature.start().await.unwrap();

    assert!(feature.is_running());
    assert!(dom.has_class(node(&dom, "c1"), "gtm-lens-border-google"));
    assert!(dom.has_class(node(&dom, "c2"), "gtm-lens-border-facebook"));
    assert_eq!(dom.classes(node(&dom, "c3")), vec!["gtm-debug-card".to_string()]);
    let style = node(&dom, "gtm-lens-tag-type-styles");
    assert_eq!(dom.parent(style), dom.head());

    feature.stop().await;
    assert!(!feature.is_running());
    assert_eq!(dom.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn tag_status_coloring_follows_status_text() {
    let dom = page(TAGS);
    let feature = build(TAGS_STATUS_COLORING, &dom);
    feature.start().await.unwrap();
    assert!(dom.has_class(node(&dom, "c2"), "gtm-lens-status-failed"));
    assert!(!dom.has_class(node(&dom, "c1"), "gtm-lens-status-failed"));

    dom.set_text(node(&dom, "s1"), "Failed").unwrap();
    dom.set_text(node(&dom, "s2"), "Succeeded").unwrap();
    sleep(Duration::from_millis(500)).await;

    assert!(dom.has_class(node(&dom, "c1"), "gtm-lens-status-failed"));
    assert!(!dom.has_class(node(&dom, "c2"), "gtm-lens-status-failed"));
    feature.stop().await;
    assert!(!dom.has_class(node(&dom, "c1"), "gtm-lens-status-failed"));
}

#[tokio::test(start_paused = true)]
async fn preview_filters_hide_cards_and_follow_commands() {
    let dom = page(TAGS);
    let before = dom.snapshot();
    let feature = build(PREVIEW_UI_FILTERING, &dom);
    feature.start().await.unwrap();

    let tab = node(&dom, "tab");
    let hidden = |id: &str| dom.has_class(node(&dom, id), "gtm-lens-hidden");
    assert!(hidden("c3"));
    assert!(!hidden("c1"));
    assert!(!hidden("c2"));
    assert_eq!(
        dom.attribute(node(&dom, "c3"), "style").as_deref(),
        Some("display: none;")
    );
    let first = dom.children(tab)[0];
    assert!(dom.has_class(first, "gtm-lens-filter-bar"));

    let response = feature
        .command("set-filter", &json!({ "query": "ga4" }))
        .unwrap();
    assert_eq!(response["generation"], 1);
    assert!(!hidden("c1"));
    assert!(hidden("c2"));
    assert!(hidden("c3"));
    let bars = select(&dom, tab, ".gtm-lens-filter-bar");
    assert_eq!(bars.len(), 1);
    let input = select(&dom, bars[0], "input")[0];
    assert_eq!(dom.attribute(input, "value").as_deref(), Some("ga4"));

    feature.command("clear-filter", &Value::Null).unwrap();
    assert!(!hidden("c2"));
    assert!(hidden("c3"));

    feature.stop().await;
    assert_eq!(dom.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn preview_filters_cover_blocked_tags() {
    let dom = page(&format!("{TAGS}{BLOCKED}"));
    let before = dom.snapshot();
    let feature = build(PREVIEW_UI_FILTERING, &dom);
    feature.start().await.unwrap();

    let hidden = |id: &str| dom.has_class(node(&dom, id), "gtm-lens-hidden");
    assert!(!hidden("b1"));
    feature
        .command("set-filter", &json!({ "query": "purchase" }))
        .unwrap();
    assert!(hidden("b1"));
    assert!(!hidden("c1"));

    feature
        .command("set-filter", &json!({ "types": ["Floodlight Counter"] }))
        .unwrap();
    assert!(!hidden("b1"));
    assert!(hidden("c1"));
    assert!(hidden("c2"));

    feature.stop().await;
    assert_eq!(dom.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn preview_filters_search_variables() {
    let dom = page(VARIABLES);
    let before = dom.snapshot();
    let feature = build(PREVIEW_UI_FILTERING, &dom);
    feature.start().await.unwrap();

    let vars = node(&dom, "vars");
    let bar = dom.children(vars)[0];
    assert!(dom.has_class(bar, "gtm-lens-filter-bar"));
    let input = select(&dom, bar, "input")[0];
    assert_eq!(
        dom.attribute(input, "placeholder").as_deref(),
        Some("Search by variable name or value...")
    );

    let hidden = |id: &str| dom.has_class(node(&dom, id), "gtm-lens-hidden");
    assert!(!hidden("v1") && !hidden("v2") && !hidden("v3"));

    // value
    feature
        .command("set-filter", &json!({ "query": "/checkout" }))
        .unwrap();
    assert!(hidden("v1"));
    assert!(!hidden("v2"));
    assert!(hidden("v3"));

    // return type
    feature
        .command("set-filter", &json!({ "query": "string" }))
        .unwrap();
    assert!(hidden("v1"));
    assert!(!hidden("v2"));
    assert!(!hidden("v3"));

    // the type column alone does not match
    feature
        .command("set-filter", &json!({ "query": "layer" }))
        .unwrap();
    assert!(hidden("v1") && hidden("v2") && hidden("v3"));

    feature
        .command(
            "set-filter",
            &json!({ "query": "e", "variable_types": ["Data Layer Variable"] }),
        )
        .unwrap();
    assert!(!hidden("v1"));
    assert!(hidden("v2"));
    assert!(!hidden("v3"));
    assert_eq!(
        dom.attribute(node(&dom, "v2"), "style").as_deref(),
        Some("display: none;")
    );

    feature.command("clear-filter", &Value::Null).unwrap();
    assert!(!hidden("v1") && !hidden("v2") && !hidden("v3"));

    feature.stop().await;
    assert_eq!(dom.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn get_filter_reports_type_counts() {
    let dom = page(&format!("{TAGS}{BLOCKED}{VARIABLES}"));
    let feature = build(PREVIEW_UI_FILTERING, &dom);
    feature.start().await.unwrap();

    let report = feature.command("get-filter", &Value::Null).unwrap();
    assert_eq!(report["query"], "");
    assert_eq!(
        report["available"]["tags"],
        json!([
            { "name": "Google Analytics: GA4 Event", "count": 1 },
            { "name": "Facebook Pixel", "count": 1 },
            { "name": "Floodlight Counter", "count": 1 },
        ])
    );
    assert_eq!(
        report["available"]["variables"],
        json!([
            { "name": "Data Layer Variable", "count": 2 },
            { "name": "URL", "count": 1 },
        ])
    );

    feature.stop().await;
}

#[tokio::test(start_paused = true)]
async fn json_bodies_are_formatted_in_place() {
    let dom = page(BODIES);
    let before = dom.snapshot();
    let feature = build(INLINE_JSON_FORMATTING, &dom);
    feature.start().await.unwrap();

    let pre = node(&dom, "json");
    assert!(dom.has_class(pre, "gtm-lens-json"));
    assert_eq!(
        dom.text_content(pre),
        "{\n  \"event\": \"purchase\",\n  \"value\": 12.5\n}"
    );
    assert_eq!(select(&dom, pre, "code.language-json").len(), 1);
    assert_eq!(select(&dom, pre, ".gtm-lens-json-key").len(), 2);
    assert_eq!(select(&dom, pre, ".gtm-lens-json-number").len(), 1);

    let plain = node(&dom, "plain");
    assert_eq!(dom.text_content(plain), "not json");
    assert!(dom.classes(plain).is_empty());

    feature.stop().await;
    assert_eq!(dom.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn rebound_json_body_is_formatted_again() {
    let dom = page(BODIES);
    let feature = build(INLINE_JSON_FORMATTING, &dom);
    feature.start().await.unwrap();
    let pre = node(&dom, "json");

    dom.set_text(pre, r#"{"event":"refund"}"#).unwrap();
    sleep(Duration::from_millis(500)).await;

    assert_eq!(dom.text_content(pre), "{\n  \"event\": \"refund\"\n}");
    feature.stop().await;
    assert_eq!(dom.text_content(pre), r#"{"event":"refund"}"#);
    assert!(!dom.has_class(pre, "gtm-lens-json"));
}

#[tokio::test(start_paused = true)]
async fn url_details_get_a_parameter_table() {
    let dom = page(URLS);
    let before = dom.snapshot();
    let feature = build(URLS_FORMATTER, &dom);
    feature.start().await.unwrap();

    assert_eq!(
        dom.attribute(node(&dom, "method"), "style").as_deref(),
        Some("display: none;")
    );
    assert_eq!(
        dom.attribute(node(&dom, "url-pre"), "style").as_deref(),
        Some("display: none;")
    );
    let url_cell = node(&dom, "url");
    let keys: Vec<String> = select(&dom, url_cell, ".gtm-lens-url-key")
        .into_iter()
        .map(|cell| dom.text_content(cell))
        .collect();
    assert_eq!(keys, vec!["v".to_string(), "en".to_string()]);
    let header = select(&dom, url_cell, ".gtm-lens-url-header")[0];
    assert_eq!(dom.text_content(header), "GET sgtm.example.com/g/collect");

    feature.stop().await;
    assert_eq!(dom.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn consent_table_tracks_selected_request() {
    let dom = page(MESSAGES);
    let feature = build(CONSENT_STATUS_MONITOR, &dom);
    feature.start().await.unwrap();

    let details = node(&dom, "details");
    let tables = select(&dom, details, ".gtm-lens-consent-table");
    assert_eq!(tables.len(), 1);
    assert_eq!(dom.previous_element_sibling(tables[0]), Some(node(&dom, "tabs")));
    let rows = select(&dom, tables[0], "tbody tr");
    let text: Vec<String> = rows.iter().map(|row| dom.text_content(*row)).collect();
    assert_eq!(
        text,
        vec![
            "ad_storageGrantedGranted",
            "analytics_storageGrantedGranted",
            "ad_user_dataDeniedDenied",
            "ad_personalizationDeniedDenied",
        ]
    );

    let title = node(&dom, "title");
    dom.set_attribute(title, "title", "collect?v=2&gcs=G100").unwrap();
    sleep(Duration::from_millis(500)).await;
    let tables = select(&dom, details, ".gtm-lens-consent-table");
    assert_eq!(tables.len(), 1);
    let rows = select(&dom, tables[0], "tbody tr");
    assert_eq!(dom.text_content(rows[2]), "ad_user_dataGrantedGranted");

    dom.set_attribute(title, "title", "page_view").unwrap();
    sleep(Duration::from_millis(500)).await;
    assert!(select(&dom, details, ".gtm-lens-consent-table").is_empty());

    feature.stop().await;
    assert!(dom.by_id("gtm-lens-consent-styles").is_none());
}

#[tokio::test(start_paused = true)]
async fn registry_starts_catalog_and_unregisters_everything() {
    let dom = page(&format!("{TAGS}{BODIES}{URLS}{MESSAGES}"));
    let before = dom.snapshot();
    let registry = FeatureRegistry::new();
    let factory = BuiltinFeatures::default();
    for descriptor in default_catalog() {
        let feature = factory
            .build(&descriptor, Arc::clone(&dom) as Arc<dyn Dom>)
            .unwrap();
        feature.start().await.unwrap();
        assert!(registry.register(descriptor.api_key.clone(), feature).is_none());
    }

    assert_eq!(registry.len(), 6);
    let ids: Vec<String> = registry.ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(ids, feature_ids());
    let coloring = registry.get_by_api("tagTypeColoring").unwrap();
    assert_eq!(coloring.id().as_str(), TAGS_TYPE_COLORING);
    assert_ne!(dom.snapshot(), before);

    assert_eq!(registry.unregister_all().await, 6);
    assert!(registry.is_empty());
    assert_eq!(dom.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn styles_fall_back_to_body() {
    let dom = Arc::new(MemoryDom::parse(&format!("<body>{TAGS}</body>")).unwrap());
    let feature = build(TAGS_TYPE_COLORING, &dom);
    feature.start().await.unwrap();
    let style = node(&dom, "gtm-lens-tag-type-styles");
    assert_eq!(dom.parent(style), dom.body());
    feature.stop().await;
    assert!(dom.by_id("gtm-lens-tag-type-styles").is_none());
}

#[tokio::test(start_paused = true)]
async fn document_without_head_or_body_is_unavailable() {
    let dom = Arc::new(MemoryDom::parse(TAGS).unwrap());
    let feature = build(TAGS_TYPE_COLORING, &dom);
    let err = feature.start().await.unwrap_err();
    assert!(matches!(err, FeatureError::Unavailable { .. }));
    assert!(!feature.is_running());
    assert!(!dom.has_class(node(&dom, "c1"), "gtm-lens-border-google"));
}

#[tokio::test(start_paused = true)]
async fn commands_are_feature_specific() {
    let dom = page(TAGS);
    let feature = build(TAGS_TYPE_COLORING, &dom);
    feature.start().await.unwrap();

    let err = feature.command("set-filter", &Value::Null).unwrap_err();
    assert!(matches!(err, FeatureError::UnsupportedCommand { .. }));

    let stats = feature.command("stats", &Value::Null).unwrap();
    assert_eq!(stats["running"], true);
    assert_eq!(stats["parts"][0]["enhanced"], 2);
    feature.stop().await;
}

#[test]
fn unknown_descriptor_is_rejected() {
    let mut unknown = descriptor(TAGS_TYPE_COLORING);
    unknown.id = "dark-mode".into();
    let dom = page("");
    let err = BuiltinFeatures::default()
        .build(&unknown, Arc::clone(&dom) as Arc<dyn Dom>)
        .err()
        .unwrap();
    assert!(matches!(err, FeatureError::UnknownFeature(id) if id == "dark-mode"));
}
