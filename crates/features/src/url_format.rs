//! Parameter table for request URLs shown in `http-url-details` blocks.

use std::sync::Arc;
use std::time::Duration;

use gtm_lens_dom_reconciler::{
    Dom, DomError, DomJournal, EnhanceError, Enhancer, NodeId, Outcome, ReconcilerSpec, Selector,
};
use gtm_lens_policy_center::defaults::URLS_FORMATTER;
use once_cell::sync::Lazy;
use serde::Serialize;
use url::{ParseError, Url};

use crate::errors::FeatureError;
use crate::feature::ReconciledFeature;
use crate::markup::{append_all, class_name, child_text, element, text_element};
use crate::style::StyleSheet;

pub const SELECTOR: &str = "http-url-details";
pub const MAX_VALUE_CHARS: usize = 80;
const STYLE_ID: &str = "gtm-lens-url-styles";

/// Resolves relative request URLs; its host is never reported.
static RELATIVE_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("http://relative.invalid/").expect("static base url is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRequest {
    pub method: String,
    /// `None` for relative URLs.
    pub host: Option<String>,
    /// Explicit non-default port.
    pub port: Option<u16>,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl ParsedRequest {
    pub fn parse(method: &str, url: &str) -> Self {
        let url = url.trim();
        let (parsed, relative) = match Url::parse(url) {
            Ok(parsed) => (Some(parsed), false),
            Err(ParseError::RelativeUrlWithoutBase) => (
                Url::options().base_url(Some(&RELATIVE_BASE)).parse(url).ok(),
                true,
            ),
            Err(_) => (None, false),
        };
        let method = method.trim().to_string();
        let Some(parsed) = parsed else {
            return Self {
                method,
                host: None,
                port: None,
                path: url.to_string(),
                params: Vec::new(),
            };
        };
        let host = if relative {
            None
        } else {
            parsed.host_str().map(str::to_string)
        };
        Self {
            method,
            port: host.as_ref().and(parsed.port()),
            host,
            path: parsed.path().to_string(),
            params: parsed.query_pairs().into_owned().collect(),
        }
    }

    pub fn summary(&self) -> String {
        let target = match (&self.host, self.port) {
            (Some(host), Some(port)) => format!("{host}:{port}{}", self.path),
            (Some(host), None) => format!("{host}{}", self.path),
            (None, _) => self.path.clone(),
        };
        if self.method.is_empty() {
            target
        } else {
            format!("{} {target}", self.method)
        }
    }
}

/// Display text for a parameter value plus the full value when it had to be truncated.
pub fn display_value(value: &str) -> (String, Option<String>) {
    if value.chars().count() > MAX_VALUE_CHARS {
        let head: String = value.chars().take(MAX_VALUE_CHARS).collect();
        (format!("{head}..."), Some(value.to_string()))
    } else {
        (value.to_string(), None)
    }
}

fn render(dom: &dyn Dom, request: &ParsedRequest) -> Result<NodeId, DomError> {
    let container_class = class_name("url-params");
    let container = element(dom, "div", &[("class", container_class.as_str())])?;
    let header_class = class_name("url-header");
    let header = text_element(
        dom,
        "div",
        &[("class", header_class.as_str())],
        &request.summary(),
    )?;
    dom.append_child(container, header)?;

    if request.params.is_empty() {
        let empty_class = class_name("url-empty");
        let empty = text_element(
            dom,
            "div",
            &[("class", empty_class.as_str())],
            "No parameters found",
        )?;
        dom.append_child(container, empty)?;
        return Ok(container);
    }

    let table_class = class_name("url-table");
    let table = element(dom, "table", &[("class", table_class.as_str())])?;
    let thead = element(dom, "thead", &[])?;
    let head_row = element(dom, "tr", &[])?;
    let key_header = text_element(dom, "th", &[], "Parameter")?;
    let value_header = text_element(dom, "th", &[], "Value")?;
    append_all(dom, head_row, &[key_header, value_header])?;
    dom.append_child(thead, head_row)?;

    let tbody = element(dom, "tbody", &[])?;
    let key_class = class_name("url-key");
    let value_class = class_name("url-value");
    for (key, value) in &request.params {
        let row = element(dom, "tr", &[])?;
        let key_cell = text_element(dom, "td", &[("class", key_class.as_str())], key)?;
        let (shown, full) = display_value(value);
        let value_cell = match &full {
            Some(full) => text_element(
                dom,
                "td",
                &[("class", value_class.as_str()), ("title", full.as_str())],
                &shown,
            )?,
            None => text_element(dom, "td", &[("class", value_class.as_str())], &shown)?,
        };
        append_all(dom, row, &[key_cell, value_cell])?;
        dom.append_child(tbody, row)?;
    }
    append_all(dom, table, &[thead, tbody])?;
    dom.append_child(container, table)?;
    Ok(container)
}

struct UrlDetailsFormatter {
    method_cell: Selector,
    url_cell: Selector,
    pre: Selector,
}

impl UrlDetailsFormatter {
    fn new() -> Result<Self, DomError> {
        Ok(Self {
            method_cell: Selector::parse(".gtm-debug-table-cell--query-param")?,
            url_cell: Selector::parse(
                ".gtm-debug-table-cell--query-param + .gtm-debug-table-cell",
            )?,
            pre: Selector::parse("pre")?,
        })
    }

    fn url_pre(&self, dom: &dyn Dom, node: NodeId) -> Option<(NodeId, NodeId)> {
        let cell = dom.query_first(node, &self.url_cell)?;
        let pre = dom.query_first(cell, &self.pre)?;
        Some((cell, pre))
    }
}

impl Enhancer for UrlDetailsFormatter {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        let Some((url_cell, url_pre)) = self.url_pre(dom, node) else {
            return Ok(Outcome::Skipped);
        };
        let url = dom.text_content(url_pre).trim().to_string();
        if url.is_empty() {
            return Ok(Outcome::Skipped);
        }
        let method_cell = dom.query_first(node, &self.method_cell);
        let method = method_cell
            .and_then(|cell| child_text(dom, cell, &self.pre))
            .unwrap_or_default();
        let request = ParsedRequest::parse(&method, &url);

        if let Some(cell) = method_cell {
            journal.add_style(dom, cell, "display: none")?;
        }
        journal.add_style(dom, url_pre, "display: none")?;
        let panel = render(dom, &request)?;
        journal.append_child(dom, url_cell, panel)?;
        Ok(Outcome::Enhanced)
    }

    fn fingerprint(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        self.url_pre(dom, node)
            .map(|(_, pre)| dom.text_content(pre).trim().to_string())
    }
}

fn stylesheet() -> StyleSheet {
    let css = format!(
        ".{params} {{ background: #f8f9fa; border: 1px solid #e9ecef; border-radius: 6px; padding: 12px; margin: 4px 0; font-size: 13px; }}\n\
         .{header} {{ font-weight: bold; color: #495057; margin-bottom: 12px; }}\n\
         .{table} {{ width: 100%; border-collapse: collapse; font-size: 12px; background: white; }}\n\
         .{key} {{ font-family: monospace; color: #d73a49; word-break: break-word; }}\n\
         .{value} {{ font-family: monospace; color: #032f62; word-break: break-word; }}\n\
         .{empty} {{ color: #6c757d; text-align: center; padding: 20px; }}",
        params = class_name("url-params"),
        header = class_name("url-header"),
        table = class_name("url-table"),
        key = class_name("url-key"),
        value = class_name("url-value"),
        empty = class_name("url-empty"),
    );
    StyleSheet::new(STYLE_ID, css)
}

pub fn build(dom: Arc<dyn Dom>, debounce: Duration) -> Result<ReconciledFeature, FeatureError> {
    let spec = ReconcilerSpec::new(URLS_FORMATTER, SELECTOR)?.with_debounce(debounce);
    Ok(ReconciledFeature::new(URLS_FORMATTER, dom)
        .with_style(stylesheet())
        .with_part(spec, Arc::new(UrlDetailsFormatter::new()?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_urls() {
        let request = ParsedRequest::parse(
            "POST",
            "https://sgtm.example.com/g/collect?v=2&en=page_view&dl=https%3A%2F%2Fshop.test%2F#top",
        );
        assert_eq!(request.host.as_deref(), Some("sgtm.example.com"));
        assert_eq!(request.path, "/g/collect");
        assert_eq!(
            request.params,
            vec![
                ("v".to_string(), "2".to_string()),
                ("en".to_string(), "page_view".to_string()),
                ("dl".to_string(), "https://shop.test/".to_string()),
            ]
        );
        assert_eq!(request.summary(), "POST sgtm.example.com/g/collect");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let request = ParsedRequest::parse("GET", "HTTPS://sgtm.example.com/g/collect?v=2");
        assert_eq!(request.host.as_deref(), Some("sgtm.example.com"));
        assert_eq!(request.port, None);
        assert_eq!(request.path, "/g/collect");
        assert_eq!(request.params, vec![("v".to_string(), "2".to_string())]);
    }

    #[test]
    fn userinfo_and_port_stay_out_of_host() {
        let request =
            ParsedRequest::parse("GET", "https://user@sgtm.example.com:8443/g/collect?v=2");
        assert_eq!(request.host.as_deref(), Some("sgtm.example.com"));
        assert_eq!(request.port, Some(8443));
        assert_eq!(request.path, "/g/collect");
        assert_eq!(request.summary(), "GET sgtm.example.com:8443/g/collect");

        let default_port = ParsedRequest::parse("GET", "https://sgtm.example.com:443/g/collect");
        assert_eq!(default_port.port, None);
    }

    #[test]
    fn relative_urls_keep_their_query() {
        let request = ParsedRequest::parse("GET", "/g/collect?v=2&en=scroll#frag");
        assert_eq!(request.host, None);
        assert_eq!(request.port, None);
        assert_eq!(request.path, "/g/collect");
        assert_eq!(request.params.len(), 2);
        assert_eq!(request.summary(), "GET /g/collect");
    }

    #[test]
    fn parses_relative_urls_without_query() {
        let request = ParsedRequest::parse("", "/data");
        assert_eq!(request.host, None);
        assert_eq!(request.path, "/data");
        assert!(request.params.is_empty());
        assert_eq!(request.summary(), "/data");
    }

    #[test]
    fn long_values_are_truncated_with_full_title() {
        let long = "x".repeat(81);
        let (shown, full) = display_value(&long);
        assert_eq!(shown, format!("{}...", "x".repeat(80)));
        assert_eq!(full.as_deref(), Some(long.as_str()));

        let exact = "y".repeat(80);
        assert_eq!(display_value(&exact), (exact.clone(), None));
    }
}
