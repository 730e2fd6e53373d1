//! Arena-backed [`Dom`] used by tests and the CLI harness.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::dom::{Dom, MutationKind, MutationRecord, NodeId, ObserveOptions, ObserverId};
use crate::errors::DomError;

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Observer {
    options: ObserveOptions,
    pending: Vec<MutationRecord>,
    notify: Arc<Notify>,
}

struct Arena {
    nodes: Vec<NodeData>,
    observers: HashMap<ObserverId, Observer>,
    next_observer: u64,
}

const DOCUMENT: NodeId = NodeId(0);

impl Arena {
    fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            observers: HashMap::new(),
            next_observer: 1,
        }
    }

    fn node(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(id.0).ok_or(DomError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes.get_mut(id.0).ok_or(DomError::NodeNotFound(id))
    }

    fn attrs_mut(&mut self, id: NodeId) -> Result<&mut Vec<(String, String)>, DomError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attrs, .. } => Ok(attrs),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = self.nodes.get(node.0).and_then(|n| n.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current.0).and_then(|n| n.parent);
        }
        false
    }

    fn emit(&mut self, record: MutationRecord) {
        let attribute = record.attribute.clone();
        let mut targets = Vec::new();
        for (id, observer) in &self.observers {
            let root = observer.options.root.unwrap_or(DOCUMENT);
            let in_scope = record.target == root
                || (observer.options.subtree && self.is_ancestor(root, record.target));
            if in_scope && observer.options.wants(record.kind, attribute.as_deref()) {
                targets.push(*id);
            }
        }
        for id in targets {
            if let Some(observer) = self.observers.get_mut(&id) {
                observer.pending.push(record.clone());
                observer.notify.notify_one();
            }
        }
    }

    fn detach(&mut self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        let Some(parent) = self.node(node)?.parent else {
            return Ok(None);
        };
        self.node_mut(parent)?.children.retain(|child| *child != node);
        self.node_mut(node)?.parent = None;
        Ok(Some(parent))
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if matches!(self.node(parent)?.kind, NodeKind::Text(_)) {
            return Err(DomError::InvalidOperation(format!(
                "text node {parent} cannot have children"
            )));
        }
        if matches!(self.node(child)?.kind, NodeKind::Document) {
            return Err(DomError::InvalidOperation("document cannot be inserted".into()));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(DomError::InvalidOperation(format!(
                "inserting {child} under {parent} would create a cycle"
            )));
        }
        Ok(())
    }

    /// Moves `child` under `parent` before `reference`, emitting removal and insertion records.
    fn insert(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.check_insertable(parent, child)?;
        if let Some(reference) = reference {
            if self.node(reference)?.parent != Some(parent) {
                return Err(DomError::InvalidOperation(format!(
                    "{reference} is not a child of {parent}"
                )));
            }
        }
        if let Some(old_parent) = self.detach(child)? {
            self.emit(MutationRecord {
                kind: MutationKind::ChildList,
                target: old_parent,
                added: Vec::new(),
                removed: vec![child],
                attribute: None,
            });
        }
        self.insert_silent(parent, child, reference)?;
        self.emit(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            added: vec![child],
            removed: Vec::new(),
            attribute: None,
        });
        Ok(())
    }

    fn insert_silent(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        let siblings = &mut self.node_mut(parent)?.children;
        let idx = reference
            .and_then(|reference| siblings.iter().position(|c| *c == reference))
            .unwrap_or(siblings.len());
        siblings.insert(idx, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn text_of(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.nodes.get(node.0) else {
            return;
        };
        match &data.kind {
            NodeKind::Text(text) => out.push_str(text),
            _ => {
                for child in &data.children {
                    self.text_of(*child, out);
                }
            }
        }
    }

    fn find_tag(&self, tag: &str) -> Option<NodeId> {
        let mut stack = vec![DOCUMENT];
        while let Some(node) = stack.pop() {
            let data = self.nodes.get(node.0)?;
            if let NodeKind::Element { tag: t, .. } = &data.kind {
                if t == tag {
                    return Some(node);
                }
            }
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }

    fn serialize(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.nodes.get(node.0) else {
            return;
        };
        match &data.kind {
            NodeKind::Document => {
                for child in &data.children {
                    self.serialize(*child, out);
                }
            }
            NodeKind::Text(text) => out.push_str(&escape(text, false)),
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                if is_void_tag(tag) {
                    return;
                }
                for child in &data.children {
                    self.serialize(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

pub struct MemoryDom {
    inner: Mutex<Arena>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Arena::new()),
        }
    }

    /// Builds a document from an HTML-ish fragment.
    pub fn parse(html: &str) -> Result<Self, DomError> {
        let dom = Self::new();
        {
            let mut arena = dom.inner.lock();
            let roots = parse_fragment(&mut arena, html)?;
            for root in roots {
                arena.insert_silent(DOCUMENT, root, None)?;
            }
        }
        Ok(dom)
    }

    /// Parses `html` and appends the resulting nodes to `parent`, as a page script would.
    pub fn append_html(&self, parent: NodeId, html: &str) -> Result<Vec<NodeId>, DomError> {
        let mut arena = self.inner.lock();
        let roots = parse_fragment(&mut arena, html)?;
        for root in &roots {
            arena.insert(parent, *root, None)?;
        }
        Ok(roots)
    }

    /// Serialized document, for before/after comparisons.
    pub fn snapshot(&self) -> String {
        self.outer_html(DOCUMENT)
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let arena = self.inner.lock();
        let mut out = String::new();
        arena.serialize(node, &mut out);
        out
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let arena = self.inner.lock();
        let mut out = String::new();
        if let Some(data) = arena.nodes.get(node.0) {
            for child in &data.children {
                arena.serialize(*child, &mut out);
            }
        }
        out
    }

    pub fn pending_records(&self, observer: ObserverId) -> usize {
        self.inner
            .lock()
            .observers
            .get(&observer)
            .map(|o| o.pending.len())
            .unwrap_or(0)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

impl Dom for MemoryDom {
    fn document(&self) -> NodeId {
        DOCUMENT
    }

    fn head(&self) -> Option<NodeId> {
        self.inner.lock().find_tag("head")
    }

    fn body(&self) -> Option<NodeId> {
        self.inner.lock().find_tag("body")
    }

    fn by_id(&self, id: &str) -> Option<NodeId> {
        let arena = self.inner.lock();
        let mut stack = vec![DOCUMENT];
        while let Some(node) = stack.pop() {
            let data = arena.nodes.get(node.0)?;
            if let NodeKind::Element { attrs, .. } = &data.kind {
                if attrs.iter().any(|(name, value)| name == "id" && value == id) {
                    return Some(node);
                }
            }
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let arena = self.inner.lock();
        node == DOCUMENT || arena.is_ancestor(DOCUMENT, node)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        match &self.inner.lock().nodes.get(node.0)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.inner.lock().nodes.get(node.0)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, value)| value.clone()),
            _ => None,
        }
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut arena = self.inner.lock();
        let attrs = arena.attrs_mut(node)?;
        match attrs.iter_mut().find(|(attr, _)| attr == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
        arena.emit(MutationRecord {
            kind: MutationKind::Attributes,
            target: node,
            added: Vec::new(),
            removed: Vec::new(),
            attribute: Some(name.to_string()),
        });
        Ok(())
    }

    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DomError> {
        let mut arena = self.inner.lock();
        let attrs = arena.attrs_mut(node)?;
        let before = attrs.len();
        attrs.retain(|(attr, _)| attr != name);
        if attrs.len() != before {
            arena.emit(MutationRecord {
                kind: MutationKind::Attributes,
                target: node,
                added: Vec::new(),
                removed: Vec::new(),
                attribute: Some(name.to_string()),
            });
        }
        Ok(())
    }

    fn text_content(&self, node: NodeId) -> String {
        let arena = self.inner.lock();
        let mut out = String::new();
        arena.text_of(node, &mut out);
        out
    }

    fn set_text(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        let mut arena = self.inner.lock();
        if let NodeKind::Text(current) = &mut arena.node_mut(node)?.kind {
            *current = text.to_string();
            arena.emit(MutationRecord {
                kind: MutationKind::CharacterData,
                target: node,
                added: Vec::new(),
                removed: Vec::new(),
                attribute: None,
            });
            return Ok(());
        }
        let removed = std::mem::take(&mut arena.node_mut(node)?.children);
        for child in &removed {
            arena.node_mut(*child)?.parent = None;
        }
        let text_node = arena.push(NodeKind::Text(text.to_string()));
        arena.insert_silent(node, text_node, None)?;
        arena.emit(MutationRecord {
            kind: MutationKind::ChildList,
            target: node,
            added: vec![text_node],
            removed,
            attribute: None,
        });
        Ok(())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.lock().nodes.get(node.0)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .lock()
            .nodes
            .get(node.0)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn create_element(&self, tag: &str) -> NodeId {
        self.inner.lock().push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.inner.lock().push(NodeKind::Text(text.to_string()))
    }

    fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.inner.lock().insert(parent, child, None)
    }

    fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.inner.lock().insert(parent, child, reference)
    }

    fn remove(&self, node: NodeId) -> Result<(), DomError> {
        let mut arena = self.inner.lock();
        if let Some(parent) = arena.detach(node)? {
            arena.emit(MutationRecord {
                kind: MutationKind::ChildList,
                target: parent,
                added: Vec::new(),
                removed: vec![node],
                attribute: None,
            });
        }
        Ok(())
    }

    fn replace_children(
        &self,
        parent: NodeId,
        children: &[NodeId],
    ) -> Result<Vec<NodeId>, DomError> {
        let mut arena = self.inner.lock();
        for child in children {
            arena.check_insertable(parent, *child)?;
        }
        let removed = std::mem::take(&mut arena.node_mut(parent)?.children);
        for child in &removed {
            arena.node_mut(*child)?.parent = None;
        }
        for child in children {
            if let Some(old_parent) = arena.detach(*child)? {
                arena.emit(MutationRecord {
                    kind: MutationKind::ChildList,
                    target: old_parent,
                    added: Vec::new(),
                    removed: vec![*child],
                    attribute: None,
                });
            }
            arena.insert_silent(parent, *child, None)?;
        }
        arena.emit(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
            added: children.to_vec(),
            removed: removed.clone(),
            attribute: None,
        });
        Ok(removed)
    }

    fn observe(&self, options: ObserveOptions) -> ObserverId {
        let mut arena = self.inner.lock();
        let id = ObserverId(arena.next_observer);
        arena.next_observer += 1;
        arena.observers.insert(
            id,
            Observer {
                options,
                pending: Vec::new(),
                notify: Arc::new(Notify::new()),
            },
        );
        id
    }

    fn records_ready(&self, observer: ObserverId) -> Option<Arc<Notify>> {
        self.inner
            .lock()
            .observers
            .get(&observer)
            .map(|o| Arc::clone(&o.notify))
    }

    fn take_records(&self, observer: ObserverId) -> Vec<MutationRecord> {
        self.inner
            .lock()
            .observers
            .get_mut(&observer)
            .map(|o| std::mem::take(&mut o.pending))
            .unwrap_or_default()
    }

    fn disconnect(&self, observer: ObserverId) {
        self.inner.lock().observers.remove(&observer);
    }
}

fn escape(raw: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attr_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.' | b'@' | b'[' | b']' | b'(' | b')')
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|pos| pos + from)
}

/// Creates detached nodes for `html` and returns the top-level ones. Nodes below the top level
/// are attached without emitting mutation records.
fn parse_fragment(arena: &mut Arena, html: &str) -> Result<Vec<NodeId>, DomError> {
    let bytes = html.as_bytes();
    let mut roots = Vec::new();
    let mut stack: Vec<(NodeId, String)> = Vec::new();
    let mut i = 0usize;

    let attach = |arena: &mut Arena,
                      stack: &Vec<(NodeId, String)>,
                      roots: &mut Vec<NodeId>,
                      node: NodeId|
     -> Result<(), DomError> {
        match stack.last() {
            Some((parent, _)) => arena.insert_silent(*parent, node, None),
            None => {
                roots.push(node);
                Ok(())
            }
        }
    };

    while i < bytes.len() {
        if bytes[i..].starts_with(b"<!--") {
            let end = find_from(bytes, i + 4, b"-->")
                .ok_or_else(|| DomError::HtmlParse("unclosed comment".into()))?;
            i = end + 3;
            continue;
        }
        if bytes[i..].starts_with(b"<!") {
            let end = find_from(bytes, i, b">")
                .ok_or_else(|| DomError::HtmlParse("unclosed declaration".into()))?;
            i = end + 1;
            continue;
        }
        if bytes[i..].starts_with(b"</") {
            let end = find_from(bytes, i, b">")
                .ok_or_else(|| DomError::HtmlParse("unclosed end tag".into()))?;
            let tag = html[i + 2..end].trim().to_ascii_lowercase();
            i = end + 1;
            if let Some(pos) = stack.iter().rposition(|(_, open)| *open == tag) {
                stack.truncate(pos);
            }
            continue;
        }
        if bytes[i] == b'<' && bytes.get(i + 1).map(|b| b.is_ascii_alphabetic()).unwrap_or(false)
        {
            let (tag, attrs, self_closing, next) = parse_start_tag(html, i)?;
            i = next;
            let node = arena.push(NodeKind::Element {
                tag: tag.clone(),
                attrs,
            });
            attach(arena, &stack, &mut roots, node)?;
            if is_raw_text_tag(&tag) && !self_closing {
                let closing = format!("</{tag}");
                let end = find_from(bytes, i, closing.as_bytes())
                    .ok_or_else(|| DomError::HtmlParse(format!("unclosed <{tag}>")))?;
                if end > i {
                    let text = arena.push(NodeKind::Text(html[i..end].to_string()));
                    arena.insert_silent(node, text, None)?;
                }
                let close = find_from(bytes, end, b">")
                    .ok_or_else(|| DomError::HtmlParse(format!("unclosed </{tag}")))?;
                i = close + 1;
                continue;
            }
            if !self_closing && !is_void_tag(&tag) {
                stack.push((node, tag));
            }
            continue;
        }

        let start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        let text = decode_entities(&html[start..i]);
        if !text.trim().is_empty() || (!text.is_empty() && !stack.is_empty()) {
            let node = arena.push(NodeKind::Text(text));
            attach(arena, &stack, &mut roots, node)?;
        }
    }
    Ok(roots)
}

fn parse_start_tag(
    html: &str,
    at: usize,
) -> Result<(String, Vec<(String, String)>, bool, usize), DomError> {
    let bytes = html.as_bytes();
    let mut i = at + 1;
    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html[tag_start..i].to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();

    loop {
        skip_ws(bytes, &mut i);
        match bytes.get(i) {
            None => return Err(DomError::HtmlParse(format!("unclosed <{tag}>"))),
            Some(b'>') => return Ok((tag, attrs, false, i + 1)),
            Some(b'/') if bytes.get(i + 1) == Some(&b'>') => return Ok((tag, attrs, true, i + 2)),
            Some(_) => {}
        }

        let name_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        if i == name_start {
            return Err(DomError::HtmlParse(format!("bad attribute in <{tag}>")));
        }
        let name = html[name_start..i].to_ascii_lowercase();
        skip_ws(bytes, &mut i);

        let value = if bytes.get(i) == Some(&b'=') {
            i += 1;
            skip_ws(bytes, &mut i);
            match bytes.get(i) {
                Some(&quote) if quote == b'"' || quote == b'\'' => {
                    let start = i + 1;
                    let end = bytes[start..]
                        .iter()
                        .position(|b| *b == quote)
                        .map(|pos| pos + start)
                        .ok_or_else(|| DomError::HtmlParse("unclosed attribute value".into()))?;
                    i = end + 1;
                    decode_entities(&html[start..end])
                }
                _ => {
                    let start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    decode_entities(&html[start..i])
                }
            }
        } else {
            String::new()
        };
        if !attrs.iter().any(|(existing, _)| *existing == name) {
            attrs.push((name, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;

    fn sel(source: &str) -> Selector {
        Selector::parse(source).unwrap()
    }

    #[test]
    fn parse_and_serialize_round_trip() {
        let html = r#"<html><head></head><body><div class="a b" id="x">hi <b>there</b><br></div></body></html>"#;
        let dom = MemoryDom::parse(html).unwrap();
        assert_eq!(dom.snapshot(), html);
        assert!(dom.head().is_some());
        let x = dom.by_id("x").unwrap();
        assert_eq!(dom.text_content(x), "hi there");
        assert!(dom.has_class(x, "b"));
    }

    #[test]
    fn selectors_match_with_backtracking() {
        let dom = MemoryDom::parse(
            r#"<section class="outer"><div class="card"><span class="inner"><p>t</p></span></div></section>"#,
        )
        .unwrap();
        assert_eq!(dom.query_all(&sel(".outer .card p")).len(), 1);
        assert_eq!(dom.query_all(&sel(".outer > .card p")).len(), 1);
        assert_eq!(dom.query_all(&sel(".outer > p")).len(), 0);
        assert_eq!(dom.query_all(&sel("section span > p")).len(), 1);
    }

    #[test]
    fn adjacent_sibling_skips_text_nodes() {
        let dom = MemoryDom::parse(
            r#"<div><span class="k">GET</span> <span class="v"><pre>u</pre></span></div>"#,
        )
        .unwrap();
        assert_eq!(dom.query_all(&sel(".k + .v pre")).len(), 1);
        assert_eq!(dom.query_all(&sel(".v + .k")).len(), 0);
    }

    #[test]
    fn attribute_selectors_compare_exact_values() {
        let dom = MemoryDom::parse(
            r#"<pre data-ng-if="ctrl.message.body">{}</pre><pre data-ng-if="other">{}</pre>"#,
        )
        .unwrap();
        assert_eq!(
            dom.query_all(&sel("pre[data-ng-if=\"ctrl.message.body\"]")).len(),
            1
        );
        assert_eq!(dom.query_all(&sel("pre[data-ng-if]")).len(), 2);
    }

    #[test]
    fn observers_receive_scoped_records() {
        let dom = MemoryDom::parse(r#"<div id="a"><p id="p"></p></div><div id="b"></div>"#).unwrap();
        let a = dom.by_id("a").unwrap();
        let b = dom.by_id("b").unwrap();
        let p = dom.by_id("p").unwrap();
        let observer = dom.observe(ObserveOptions {
            root: Some(a),
            ..ObserveOptions::default()
        }
        .with_attributes(&["class"]));

        dom.set_attribute(p, "class", "x").unwrap();
        dom.set_attribute(p, "title", "ignored").unwrap();
        dom.append_html(b, "<i>out of scope</i>").unwrap();
        dom.append_html(p, "<i>in scope</i>").unwrap();

        let records = dom.take_records(observer);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, MutationKind::Attributes);
        assert_eq!(records[1].kind, MutationKind::ChildList);
        assert!(dom.take_records(observer).is_empty());

        dom.disconnect(observer);
        assert_eq!(dom.observer_count(), 0);
    }

    #[test]
    fn replace_children_returns_originals() {
        let dom = MemoryDom::parse(r#"<div id="a">one<b>two</b></div>"#).unwrap();
        let a = dom.by_id("a").unwrap();
        let fresh = dom.create_text("new");
        let originals = dom.replace_children(a, &[fresh]).unwrap();
        assert_eq!(originals.len(), 2);
        assert_eq!(dom.inner_html(a), "new");
        assert!(!dom.is_connected(originals[1]));
        dom.replace_children(a, &originals).unwrap();
        assert_eq!(dom.inner_html(a), "one<b>two</b>");
    }

    #[test]
    fn cycles_are_rejected() {
        let dom = MemoryDom::parse(r#"<div id="a"><p id="p"></p></div>"#).unwrap();
        let a = dom.by_id("a").unwrap();
        let p = dom.by_id("p").unwrap();
        assert!(matches!(
            dom.append_child(p, a),
            Err(DomError::InvalidOperation(_))
        ));
    }

    #[test]
    fn raw_text_and_comments() {
        let dom = MemoryDom::parse("<!DOCTYPE html><!-- c --><style>a > b {}</style><p>&lt;x&gt;</p>")
            .unwrap();
        assert_eq!(dom.snapshot(), "<style>a &gt; b {}</style><p>&lt;x&gt;</p>");
    }
}
