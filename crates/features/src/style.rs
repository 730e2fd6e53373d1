use gtm_lens_dom_reconciler::{Dom, NodeId};
use tracing::debug;

use crate::errors::FeatureError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSheet {
    pub id: String,
    pub css: String,
}

impl StyleSheet {
    pub fn new(id: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            css: css.into(),
        }
    }
}

/// Handle to an injected `<style>`. `owned` is false when the element was already on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedStyle {
    pub node: NodeId,
    pub owned: bool,
}

/// Appends the sheet to `head`, falling back once to `body`.
pub fn inject_style(
    dom: &dyn Dom,
    feature: &str,
    sheet: &StyleSheet,
) -> Result<InjectedStyle, FeatureError> {
    if let Some(node) = dom.by_id(&sheet.id) {
        return Ok(InjectedStyle { node, owned: false });
    }
    let node = dom.create_element("style");
    dom.set_attribute(node, "id", &sheet.id)?;
    dom.set_text(node, &sheet.css)?;

    if let Some(head) = dom.head() {
        match dom.append_child(head, node) {
            Ok(()) => return Ok(InjectedStyle { node, owned: true }),
            Err(err) => {
                debug!(target: "gtm_lens::features", feature, error = %err, "style injection into head failed");
            }
        }
    }
    let body = dom
        .body()
        .ok_or_else(|| FeatureError::unavailable(feature, "document has neither head nor body"))?;
    dom.append_child(body, node)
        .map_err(|err| FeatureError::unavailable(feature, format!("style injection failed: {err}")))?;
    Ok(InjectedStyle { node, owned: true })
}

pub fn remove_style(dom: &dyn Dom, style: InjectedStyle) {
    if style.owned {
        if let Err(err) = dom.remove(style.node) {
            debug!(target: "gtm_lens::features", error = %err, "style removal failed");
        }
    }
}
