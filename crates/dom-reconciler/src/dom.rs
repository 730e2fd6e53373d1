//! Host-neutral DOM surface.
//!
//! The trait mirrors the handful of browser DOM operations the augmentations need, plus the
//! MutationObserver contract: an observer queues [`MutationRecord`]s and signals a
//! [`Notify`] whenever the queue becomes non-empty.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::errors::DomError;
use crate::selector::Selector;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ObserverId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub attribute: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Observation root; `None` observes the whole document.
    pub root: Option<NodeId>,
    pub subtree: bool,
    pub child_list: bool,
    pub attributes: bool,
    /// Only these attribute names are reported. `None` reports every attribute.
    pub attribute_filter: Option<Vec<String>>,
    pub character_data: bool,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            root: None,
            subtree: true,
            child_list: true,
            attributes: false,
            attribute_filter: None,
            character_data: false,
        }
    }
}

impl ObserveOptions {
    pub fn with_attributes(mut self, names: &[&str]) -> Self {
        self.attributes = true;
        self.attribute_filter = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn with_character_data(mut self) -> Self {
        self.character_data = true;
        self
    }

    pub fn wants(&self, kind: MutationKind, attribute: Option<&str>) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
            MutationKind::Attributes => {
                if !self.attributes {
                    return false;
                }
                match (&self.attribute_filter, attribute) {
                    (Some(filter), Some(name)) => filter.iter().any(|f| f == name),
                    (Some(_), None) => false,
                    (None, _) => true,
                }
            }
        }
    }
}

/// Object-safe DOM access. Handles are only meaningful for the `Dom` that issued them.
pub trait Dom: Send + Sync {
    fn document(&self) -> NodeId;
    fn head(&self) -> Option<NodeId>;
    fn body(&self) -> Option<NodeId>;
    fn by_id(&self, id: &str) -> Option<NodeId>;

    fn is_connected(&self, node: NodeId) -> bool;
    /// Lower-case tag name; `None` for text and document nodes.
    fn tag_name(&self, node: NodeId) -> Option<String>;
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;
    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError>;
    fn text_content(&self, node: NodeId) -> String;
    fn set_text(&self, node: NodeId, text: &str) -> Result<(), DomError>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    /// Child nodes, text included, in order.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn create_element(&self, tag: &str) -> NodeId;
    fn create_text(&self, text: &str) -> NodeId;
    fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError>;
    /// Inserts before `reference`, or appends when it is `None`.
    fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError>;
    /// Detaches `node` from its parent. The handle stays valid for reinsertion.
    fn remove(&self, node: NodeId) -> Result<(), DomError>;
    /// Replaces every child of `parent` and returns the detached originals in order.
    fn replace_children(
        &self,
        parent: NodeId,
        children: &[NodeId],
    ) -> Result<Vec<NodeId>, DomError>;

    fn observe(&self, options: ObserveOptions) -> ObserverId;
    fn records_ready(&self, observer: ObserverId) -> Option<Arc<Notify>>;
    fn take_records(&self, observer: ObserverId) -> Vec<MutationRecord>;
    fn disconnect(&self, observer: ObserverId);

    fn is_element(&self, node: NodeId) -> bool {
        self.tag_name(node).is_some()
    }

    fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.element_children(parent);
        let idx = siblings.iter().position(|sibling| *sibling == node)?;
        idx.checked_sub(1).map(|prev| siblings[prev])
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let idx = siblings.iter().position(|sibling| *sibling == node)?;
        siblings.get(idx + 1).copied()
    }

    fn insert_after(&self, anchor: NodeId, node: NodeId) -> Result<(), DomError> {
        let parent = self
            .parent(anchor)
            .ok_or_else(|| DomError::InvalidOperation(format!("{anchor} has no parent")))?;
        self.insert_before(parent, node, self.next_sibling(anchor))
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(self, node)
    }

    /// Matching descendants of `root` (excluding `root`) in document order.
    fn query_within(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                if selector.matches(self, node) {
                    out.push(node);
                }
                stack.extend(self.children(node).into_iter().rev());
            }
        }
        out
    }

    fn query_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.query_within(self.document(), selector)
    }

    fn query_first(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.query_within(root, selector).into_iter().next()
    }

    fn classes(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).iter().any(|c| c == class)
    }

    /// Returns `false` when the class was already present.
    fn add_class(&self, node: NodeId, class: &str) -> Result<bool, DomError> {
        let mut classes = self.classes(node);
        if classes.iter().any(|c| c == class) {
            return Ok(false);
        }
        classes.push(class.to_string());
        self.set_attribute(node, "class", &classes.join(" "))?;
        Ok(true)
    }

    /// Returns `false` when the class was absent.
    fn remove_class(&self, node: NodeId, class: &str) -> Result<bool, DomError> {
        let classes = self.classes(node);
        if !classes.iter().any(|c| c == class) {
            return Ok(false);
        }
        let kept: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
        self.set_attribute(node, "class", &kept.join(" "))?;
        Ok(true)
    }
}
