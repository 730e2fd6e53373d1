//! Inline JSON formatting for HTTP request bodies in the server-side preview.

use std::sync::Arc;
use std::time::Duration;

use gtm_lens_dom_reconciler::{
    Dom, DomError, DomJournal, EnhanceError, Enhancer, JournalOp, NodeId, Outcome, ReconcilerSpec,
};
use gtm_lens_policy_center::defaults::INLINE_JSON_FORMATTING;
use serde_json::Value;

use crate::errors::FeatureError;
use crate::feature::ReconciledFeature;
use crate::markup::{class_name, element, text_element};
use crate::style::StyleSheet;

pub const SELECTOR: &str =
    r#".gtm-debug-table-cell--http-body pre[data-ng-bind="ctrl.getBody()"]"#;
const STYLE_ID: &str = "gtm-lens-json-styles";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonToken {
    Key,
    String,
    Number,
    Boolean,
    Null,
    Brace,
    Bracket,
    Comma,
}

impl JsonToken {
    pub fn class_suffix(&self) -> &'static str {
        match self {
            JsonToken::Key => "json-key",
            JsonToken::String => "json-string",
            JsonToken::Number => "json-number",
            JsonToken::Boolean => "json-boolean",
            JsonToken::Null => "json-null",
            JsonToken::Brace => "json-brace",
            JsonToken::Bracket => "json-bracket",
            JsonToken::Comma => "json-comma",
        }
    }
}

/// Splits serialized JSON into token runs and the plain text between them.
pub fn highlight(text: &str) -> Vec<(Option<JsonToken>, &str)> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut runs = Vec::new();
    let mut plain_start = 0;
    let mut i = 0;
    while i < len {
        let start = i;
        let token = match bytes[i] {
            b'"' => {
                i += 1;
                while i < len && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(len);
                let mut next = i;
                while next < len && bytes[next].is_ascii_whitespace() {
                    next += 1;
                }
                if bytes.get(next) == Some(&b':') {
                    JsonToken::Key
                } else {
                    JsonToken::String
                }
            }
            b'-' | b'0'..=b'9' => {
                i += 1;
                while i < len && matches!(bytes[i], b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')
                {
                    i += 1;
                }
                JsonToken::Number
            }
            b't' if text[i..].starts_with("true") => {
                i += 4;
                JsonToken::Boolean
            }
            b'f' if text[i..].starts_with("false") => {
                i += 5;
                JsonToken::Boolean
            }
            b'n' if text[i..].starts_with("null") => {
                i += 4;
                JsonToken::Null
            }
            b'{' | b'}' => {
                i += 1;
                JsonToken::Brace
            }
            b'[' | b']' => {
                i += 1;
                JsonToken::Bracket
            }
            b',' => {
                i += 1;
                JsonToken::Comma
            }
            _ => {
                i += 1;
                continue;
            }
        };
        if plain_start < start {
            runs.push((None, &text[plain_start..start]));
        }
        runs.push((Some(token), &text[start..i]));
        plain_start = i;
    }
    if plain_start < len {
        runs.push((None, &text[plain_start..]));
    }
    runs
}

/// Parses `raw` as a JSON object or array and pretty prints it with a 2-space indent.
pub fn pretty_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

fn formatted_child(dom: &dyn Dom, node: NodeId) -> bool {
    match dom.children(node).as_slice() {
        [only] => {
            dom.tag_name(*only).as_deref() == Some("code") && dom.has_class(*only, "language-json")
        }
        _ => false,
    }
}

struct JsonBodyFormatter;

impl Enhancer for JsonBodyFormatter {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        let Some(pretty) = pretty_json(&dom.text_content(node)) else {
            return Ok(Outcome::Skipped);
        };
        let code = element(dom, "code", &[("class", "language-json")])?;
        for (token, run) in highlight(&pretty) {
            let child = match token {
                Some(token) => {
                    let class = class_name(token.class_suffix());
                    text_element(dom, "span", &[("class", class.as_str())], run)?
                }
                None => dom.create_text(run),
            };
            dom.append_child(code, child)?;
        }
        journal.replace_children(dom, node, &[code])?;
        journal.add_class(dom, node, &class_name("json"))?;
        Ok(Outcome::Enhanced)
    }

    fn fingerprint(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        let state = if formatted_child(dom, node) {
            "formatted"
        } else {
            "raw"
        };
        Some(state.to_string())
    }

    fn cleanup(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<(), DomError> {
        // The page rebound the body; its new content wins over the saved original.
        if !formatted_child(dom, node) {
            journal.retain(|op| !matches!(op, JournalOp::ChildrenReplaced { .. }));
        }
        journal.revert(dom)
    }
}

fn stylesheet() -> StyleSheet {
    let css = [
        (JsonToken::Key, "color: #e91e63; font-weight: bold;"),
        (JsonToken::String, "color: #4caf50;"),
        (JsonToken::Number, "color: #ff9800; font-weight: 500;"),
        (JsonToken::Boolean, "color: #2196f3; font-weight: bold;"),
        (JsonToken::Null, "color: #9c27b0; font-weight: bold;"),
        (JsonToken::Brace, "color: #607d8b; font-weight: bold;"),
        (JsonToken::Bracket, "color: #607d8b; font-weight: bold;"),
        (JsonToken::Comma, "color: #757575;"),
    ]
    .iter()
    .map(|(token, rule)| format!(".{} {{ {rule} }}", class_name(token.class_suffix())))
    .collect::<Vec<_>>()
    .join("\n");
    StyleSheet::new(
        STYLE_ID,
        format!(".{} {{ position: relative; white-space: pre-wrap; }}\n{css}", class_name("json")),
    )
}

pub fn build(dom: Arc<dyn Dom>, debounce: Duration) -> Result<ReconciledFeature, FeatureError> {
    let spec = ReconcilerSpec::new(INLINE_JSON_FORMATTING, SELECTOR)?.with_debounce(debounce);
    Ok(ReconciledFeature::new(INLINE_JSON_FORMATTING, dom)
        .with_style(stylesheet())
        .with_part(spec, Arc::new(JsonBodyFormatter)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_prints_objects_and_arrays_only() {
        assert_eq!(pretty_json(" [1,2] ").as_deref(), Some("[\n  1,\n  2\n]"));
        assert_eq!(
            pretty_json(r#"{"a":{"b":true}}"#).as_deref(),
            Some("{\n  \"a\": {\n    \"b\": true\n  }\n}")
        );
        assert!(pretty_json("42").is_none());
        assert!(pretty_json("{not json").is_none());
        assert!(pretty_json("").is_none());
    }

    #[test]
    fn highlight_tags_keys_and_values() {
        let runs = highlight(r#"{"k": "v\"x", "n": -1.5e3, "b": false, "z": null, "l": [1]}"#);
        let tokens: Vec<(JsonToken, &str)> = runs
            .iter()
            .filter_map(|(token, text)| token.map(|t| (t, *text)))
            .collect();
        assert_eq!(
            tokens,
            vec![
                (JsonToken::Brace, "{"),
                (JsonToken::Key, r#""k""#),
                (JsonToken::String, r#""v\"x""#),
                (JsonToken::Comma, ","),
                (JsonToken::Key, r#""n""#),
                (JsonToken::Number, "-1.5e3"),
                (JsonToken::Comma, ","),
                (JsonToken::Key, r#""b""#),
                (JsonToken::Boolean, "false"),
                (JsonToken::Comma, ","),
                (JsonToken::Key, r#""z""#),
                (JsonToken::Null, "null"),
                (JsonToken::Comma, ","),
                (JsonToken::Key, r#""l""#),
                (JsonToken::Bracket, "["),
                (JsonToken::Number, "1"),
                (JsonToken::Bracket, "]"),
                (JsonToken::Brace, "}"),
            ]
        );
        let rebuilt: String = runs.iter().map(|(_, text)| *text).collect();
        assert_eq!(rebuilt, r#"{"k": "v\"x", "n": -1.5e3, "b": false, "z": null, "l": [1]}"#);
    }
}
