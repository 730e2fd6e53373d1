//! Scripted event replay against in-memory pages.
//!
//! A replay script is a JSON array of events. Navigation events may carry the page markup, which
//! is loaded into the tab before the coordinator sees the commit. The report lists the final
//! classification, the running features and the markup of every tab touched by the script.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use gtm_lens_core_types::TabId;
use gtm_lens_dom_reconciler::{Dom, Selector};
use gtm_lens_env_classifier::{Header, NavigationEvent, ResponseEvent, TabState};
use gtm_lens_extensions_bridge::{BridgeRequest, BridgeResponse, MemoryPageInjector, MessageHandler};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::errors::CoordinatorError;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Response {
        tab: TabId,
        url: String,
        #[serde(default = "main_frame")]
        is_main_frame: bool,
        #[serde(default)]
        headers: Vec<Header>,
    },
    Navigation {
        tab: TabId,
        url: String,
        #[serde(default = "main_frame")]
        is_main_frame: bool,
        /// Markup of the committed page.
        #[serde(default)]
        html: Option<String>,
    },
    /// Third-party page update: sets text and/or attributes on the first match of `selector`.
    Mutate {
        tab: TabId,
        selector: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        attributes: Vec<(String, String)>,
    },
    Message {
        request: BridgeRequest,
    },
    Wait {
        ms: u64,
    },
    Closed {
        tab: TabId,
    },
}

fn main_frame() -> bool {
    true
}

#[derive(Clone, Debug, Serialize)]
pub struct TabReport {
    pub tab: TabId,
    pub state: Option<TabState>,
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub tabs: Vec<TabReport>,
    pub responses: Vec<BridgeResponse>,
}

#[derive(Clone, Copy, Debug)]
pub struct ReplayOptions {
    /// Pause after every page mutation so debounced rescans settle.
    pub settle: Duration,
    pub include_html: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            include_html: false,
        }
    }
}

pub fn parse_script(raw: &str) -> Result<Vec<ReplayEvent>, CoordinatorError> {
    serde_json::from_str(raw).map_err(|err| CoordinatorError::Replay(err.to_string()))
}

pub fn load_script(path: &Path) -> Result<Vec<ReplayEvent>, CoordinatorError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| CoordinatorError::Replay(format!("{}: {err}", path.display())))?;
    parse_script(&raw)
}

pub async fn replay(
    coordinator: &Coordinator,
    pages: &MemoryPageInjector,
    events: Vec<ReplayEvent>,
    options: ReplayOptions,
) -> Result<ReplayReport, CoordinatorError> {
    let total = events.len();
    let mut seen = BTreeSet::new();
    let mut responses = Vec::new();

    for event in events {
        match event {
            ReplayEvent::Response {
                tab,
                url,
                is_main_frame,
                headers,
            } => {
                seen.insert(tab);
                coordinator
                    .on_response(ResponseEvent {
                        tab,
                        url,
                        is_main_frame,
                        headers,
                    })
                    .await;
            }
            ReplayEvent::Navigation {
                tab,
                url,
                is_main_frame,
                html,
            } => {
                seen.insert(tab);
                if let Some(html) = html.filter(|_| is_main_frame) {
                    pages.load(tab, &html)?;
                }
                coordinator
                    .on_navigation(NavigationEvent {
                        tab,
                        url,
                        is_main_frame,
                    })
                    .await;
            }
            ReplayEvent::Mutate {
                tab,
                selector,
                text,
                attributes,
            } => {
                let page = pages.page(tab).ok_or_else(|| {
                    CoordinatorError::Replay(format!("mutate on {tab} without a page"))
                })?;
                let parsed = Selector::parse(&selector)?;
                match page.query_first(page.document(), &parsed) {
                    Some(node) => {
                        if let Some(text) = text {
                            page.set_text(node, &text)?;
                        }
                        for (name, value) in attributes {
                            page.set_attribute(node, &name, &value)?;
                        }
                    }
                    None => {
                        debug!(target: "gtm_lens::replay", %tab, %selector, "mutation target missing")
                    }
                }
                tokio::time::sleep(options.settle).await;
            }
            ReplayEvent::Message { request } => {
                responses.push(coordinator.handle(request).await);
            }
            ReplayEvent::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            ReplayEvent::Closed { tab } => {
                seen.insert(tab);
                coordinator.on_tab_closed(tab).await;
                pages.close(tab);
            }
        }
    }

    let tabs = seen
        .into_iter()
        .map(|tab| TabReport {
            tab,
            state: coordinator.classifier().tab_state(tab),
            features: coordinator.active_features(tab),
            html: pages
                .page(tab)
                .filter(|_| options.include_html)
                .map(|page| page.snapshot()),
        })
        .collect();
    Ok(ReplayReport {
        events: total,
        tabs,
        responses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_events_use_type_tags() {
        let events = parse_script(
            r##"[
                {"type": "navigation", "tab": 1, "url": "https://tagmanager.google.com/"},
                {"type": "mutate", "tab": 1, "selector": "#s1", "text": "Failed"},
                {"type": "message", "request": {"command": "list-features", "payload": {"tab": 1}}},
                {"type": "closed", "tab": 1}
            ]"##,
        )
        .unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(
            &events[0],
            ReplayEvent::Navigation { is_main_frame: true, html: None, .. }
        ));
        match &events[2] {
            ReplayEvent::Message { request } => assert_eq!(request.command, "list-features"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_script_is_reported() {
        assert!(matches!(
            parse_script(r#"[{"type": "teleport"}]"#),
            Err(CoordinatorError::Replay(_))
        ));
    }
}
