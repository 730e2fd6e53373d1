//! Inverse-operation log of the DOM writes one enhancement made.

use tracing::debug;

use crate::dom::{Dom, NodeId};
use crate::errors::DomError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    ClassAdded {
        node: NodeId,
        class: String,
        attr_was_absent: bool,
    },
    AttributeSet {
        node: NodeId,
        name: String,
        previous: Option<String>,
    },
    Inserted {
        node: NodeId,
    },
    ChildrenReplaced {
        parent: NodeId,
        original: Vec<NodeId>,
    },
}

impl JournalOp {
    /// Node whose presence in the document decides whether reverting this op matters.
    fn target(&self) -> NodeId {
        match self {
            JournalOp::ClassAdded { node, .. }
            | JournalOp::AttributeSet { node, .. }
            | JournalOp::Inserted { node } => *node,
            JournalOp::ChildrenReplaced { parent, .. } => *parent,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DomJournal {
    ops: Vec<JournalOp>,
}

impl DomJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[JournalOp] {
        &self.ops
    }

    pub fn add_class(&mut self, dom: &dyn Dom, node: NodeId, class: &str) -> Result<(), DomError> {
        let attr_was_absent = dom.attribute(node, "class").is_none();
        if dom.add_class(node, class)? {
            self.ops.push(JournalOp::ClassAdded {
                node,
                class: class.to_string(),
                attr_was_absent,
            });
        }
        Ok(())
    }

    pub fn set_attribute(
        &mut self,
        dom: &dyn Dom,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), DomError> {
        let previous = dom.attribute(node, name);
        if previous.as_deref() == Some(value) {
            return Ok(());
        }
        dom.set_attribute(node, name, value)?;
        self.ops.push(JournalOp::AttributeSet {
            node,
            name: name.to_string(),
            previous,
        });
        Ok(())
    }

    /// Appends one declaration to the inline `style` attribute.
    pub fn add_style(
        &mut self,
        dom: &dyn Dom,
        node: NodeId,
        declaration: &str,
    ) -> Result<(), DomError> {
        let current = dom.attribute(node, "style").unwrap_or_default();
        let current = current.trim().trim_end_matches(';').trim();
        let value = if current.is_empty() {
            format!("{declaration};")
        } else {
            format!("{current}; {declaration};")
        };
        self.set_attribute(dom, node, "style", &value)
    }

    pub fn append_child(
        &mut self,
        dom: &dyn Dom,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), DomError> {
        dom.append_child(parent, child)?;
        self.ops.push(JournalOp::Inserted { node: child });
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        dom: &dyn Dom,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        dom.insert_before(parent, child, reference)?;
        self.ops.push(JournalOp::Inserted { node: child });
        Ok(())
    }

    pub fn insert_after(
        &mut self,
        dom: &dyn Dom,
        anchor: NodeId,
        node: NodeId,
    ) -> Result<(), DomError> {
        dom.insert_after(anchor, node)?;
        self.ops.push(JournalOp::Inserted { node });
        Ok(())
    }

    pub fn replace_children(
        &mut self,
        dom: &dyn Dom,
        parent: NodeId,
        children: &[NodeId],
    ) -> Result<(), DomError> {
        let original = dom.replace_children(parent, children)?;
        self.ops.push(JournalOp::ChildrenReplaced { parent, original });
        Ok(())
    }

    /// Drops recorded ops without undoing them.
    pub fn retain(&mut self, keep: impl FnMut(&JournalOp) -> bool) {
        self.ops.retain(keep);
    }

    /// Undoes every recorded op, newest first. Keeps going past failures and returns the first.
    pub fn revert(&mut self, dom: &dyn Dom) -> Result<(), DomError> {
        self.revert_where(dom, |_| true)
    }

    /// Like [`revert`](Self::revert) but skips ops whose target has left the document.
    pub fn revert_connected(&mut self, dom: &dyn Dom) -> Result<(), DomError> {
        self.revert_where(dom, |op| dom.is_connected(op.target()))
    }

    fn revert_where(
        &mut self,
        dom: &dyn Dom,
        keep: impl Fn(&JournalOp) -> bool,
    ) -> Result<(), DomError> {
        let mut first_error = None;
        while let Some(op) = self.ops.pop() {
            if !keep(&op) {
                continue;
            }
            if let Err(err) = undo(dom, &op) {
                debug!(target: "gtm_lens::reconciler", ?op, error = %err, "revert step failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn undo(dom: &dyn Dom, op: &JournalOp) -> Result<(), DomError> {
    match op {
        JournalOp::ClassAdded {
            node,
            class,
            attr_was_absent,
        } => {
            dom.remove_class(*node, class)?;
            let now_empty = dom
                .attribute(*node, "class")
                .map(|value| value.trim().is_empty())
                .unwrap_or(false);
            if *attr_was_absent && now_empty {
                dom.remove_attribute(*node, "class")?;
            }
            Ok(())
        }
        JournalOp::AttributeSet {
            node,
            name,
            previous,
        } => match previous {
            Some(value) => dom.set_attribute(*node, name, value),
            None => dom.remove_attribute(*node, name),
        },
        JournalOp::Inserted { node } => dom.remove(*node),
        JournalOp::ChildrenReplaced { parent, original } => {
            dom.replace_children(*parent, original).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDom;

    #[test]
    fn revert_restores_snapshot() {
        let dom = MemoryDom::parse(
            r#"<div id="card" class="c"><span id="s" style="color: red">text</span><p id="p"></p></div>"#,
        )
        .unwrap();
        let before = dom.snapshot();
        let card = dom.by_id("card").unwrap();
        let span = dom.by_id("s").unwrap();
        let p = dom.by_id("p").unwrap();

        let mut journal = DomJournal::new();
        journal.add_class(&dom, card, "x").unwrap();
        journal.add_class(&dom, card, "x").unwrap();
        journal.add_class(&dom, p, "y").unwrap();
        journal.add_style(&dom, span, "display: none").unwrap();
        let extra = dom.create_element("table");
        journal.insert_after(&dom, span, extra).unwrap();
        let text = dom.create_text("replaced");
        journal.replace_children(&dom, p, &[text]).unwrap();
        assert_eq!(journal.len(), 5);
        assert_ne!(dom.snapshot(), before);
        assert_eq!(
            dom.attribute(span, "style").as_deref(),
            Some("color: red; display: none;")
        );

        journal.revert(&dom).unwrap();
        assert!(journal.is_empty());
        assert_eq!(dom.snapshot(), before);
    }

    #[test]
    fn revert_connected_skips_detached_targets() {
        let dom = MemoryDom::parse(r#"<div id="host"><div id="card"></div></div>"#).unwrap();
        let host = dom.by_id("host").unwrap();
        let card = dom.by_id("card").unwrap();
        let before_host = dom.outer_html(host);

        let mut journal = DomJournal::new();
        journal.add_class(&dom, card, "mark").unwrap();
        let sibling = dom.create_element("aside");
        journal.insert_after(&dom, card, sibling).unwrap();

        // The page drops the card; the injected sibling stays behind.
        dom.remove(card).unwrap();
        journal.revert_connected(&dom).unwrap();
        assert_eq!(dom.inner_html(host), "");
        assert_ne!(dom.outer_html(host), before_host);
        assert!(dom.has_class(card, "mark"));
    }
}
