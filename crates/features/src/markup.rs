//! Helpers for building detached element trees before a single journaled insertion.

use gtm_lens_dom_reconciler::{Dom, DomError, NodeId};

pub const CLASS_PREFIX: &str = "gtm-lens-";

pub fn class_name(suffix: &str) -> String {
    format!("{CLASS_PREFIX}{suffix}")
}

pub fn element(dom: &dyn Dom, tag: &str, attrs: &[(&str, &str)]) -> Result<NodeId, DomError> {
    let node = dom.create_element(tag);
    for (name, value) in attrs {
        dom.set_attribute(node, name, value)?;
    }
    Ok(node)
}

pub fn text_element(
    dom: &dyn Dom,
    tag: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<NodeId, DomError> {
    let node = element(dom, tag, attrs)?;
    let content = dom.create_text(text);
    dom.append_child(node, content)?;
    Ok(node)
}

pub fn append_all(dom: &dyn Dom, parent: NodeId, children: &[NodeId]) -> Result<(), DomError> {
    for child in children {
        dom.append_child(parent, *child)?;
    }
    Ok(())
}

/// Trimmed text of the first descendant matching `selector`.
pub fn child_text(dom: &dyn Dom, node: NodeId, selector: &gtm_lens_dom_reconciler::Selector) -> Option<String> {
    dom.query_first(node, selector)
        .map(|found| dom.text_content(found).trim().to_string())
}
