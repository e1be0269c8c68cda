//! In-process document tree.
//!
//! Implements both [`LiveDocument`] and [`CaptureHost`], so a whole
//! record-then-replay cycle can run without a browser. Interactions driven
//! through `user_*` methods behave like real user input: they change the tree
//! and, while capture is attached, are reported to the capture sink.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::error::DomError;
use super::path::{CaptureKind, CapturedEvent, ElementPath, NodeDescriptor, ScrollOffset};
use super::selector::{SelectorList, SelectorTree};
use super::traits::{CaptureHost, KeyStroke, LiveDocument, StyleProperty, TextInputState};

/// Handle to a node of a [`MemoryDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Event delivered to an element by replay
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchedEvent {
    Click,
    KeyDown(KeyStroke),
    Input,
}

#[derive(Debug, Clone, Default)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    styles: BTreeMap<&'static str, String>,
    value: String,
    caret: Option<usize>,
    scroll: ScrollOffset,
    fault: Option<String>,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    window_scroll: ScrollOffset,
    last_scroll_smooth: Option<bool>,
    dispatched: Vec<(NodeId, DispatchedEvent)>,
}

impl Tree {
    fn node(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| DomError::StaleElement(format!("{:?}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| DomError::StaleElement(format!("{:?}", id)))
    }

    fn push(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        });
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != child);
        }
    }

    /// Attached elements in document order
    fn document_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    fn check_fault(&self, id: NodeId) -> Result<(), DomError> {
        match self.node(id)?.fault {
            Some(ref message) => Err(DomError::Script(message.clone())),
            None => Ok(()),
        }
    }

    fn is_text_input(&self, id: NodeId) -> Result<bool, DomError> {
        let node = self.node(id)?;
        Ok(match node.tag.as_str() {
            "textarea" => true,
            "input" => matches!(
                node.attributes
                    .get("type")
                    .map(|t| t.to_ascii_lowercase())
                    .as_deref(),
                None | Some("text" | "search" | "email" | "url" | "tel" | "password" | "number")
            ),
            _ => false,
        })
    }

    fn describe(&self, id: NodeId) -> ElementPath {
        let mut nodes = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            let (position, _) = self.element_position(node_id);
            nodes.push(NodeDescriptor {
                tag: node.tag.clone(),
                id: node.attributes.get("id").cloned(),
                classes: node
                    .attributes
                    .get("class")
                    .map(|c| c.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                position,
            });
            current = node.parent;
        }
        ElementPath::new(nodes)
    }
}

impl SelectorTree for Tree {
    type Node = NodeId;

    fn tag<'a>(&'a self, node: NodeId) -> &'a str {
        &self.nodes[node.0].tag
    }

    fn attribute<'a>(&'a self, node: NodeId, name: &str) -> Option<&'a str> {
        self.nodes[node.0].attributes.get(name).map(String::as_str)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn element_position(&self, node: NodeId) -> (usize, usize) {
        match self.nodes[node.0].parent {
            Some(parent) => {
                let siblings = &self.nodes[parent.0].children;
                let position = siblings.iter().position(|c| *c == node).unwrap_or(0) + 1;
                (position, siblings.len())
            }
            None => (1, 1),
        }
    }
}

/// Document tree held in memory: `html > (head, body)` plus whatever is appended
pub struct MemoryDocument {
    tree: Mutex<Tree>,
    capture: Mutex<Option<mpsc::UnboundedSender<CapturedEvent>>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            window_scroll: ScrollOffset::default(),
            last_scroll_smooth: None,
            dispatched: Vec::new(),
        };
        let root = tree.push("html");
        let head = tree.push("head");
        let body = tree.push("body");
        tree.attach(root, head);
        tree.attach(root, body);
        tree.root = root;
        tree.head = head;
        tree.body = body;

        Self {
            tree: Mutex::new(tree),
            capture: Mutex::new(None),
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn root(&self) -> NodeId {
        self.tree().root
    }

    pub fn head(&self) -> NodeId {
        self.tree().head
    }

    pub fn body(&self) -> NodeId {
        self.tree().body
    }

    /// New element with no parent
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree().push(tag)
    }

    /// New element appended as the last child of `parent`
    pub fn append_element(&self, parent: NodeId, tag: &str) -> NodeId {
        let mut tree = self.tree();
        let child = tree.push(tag);
        tree.attach(parent, child);
        child
    }

    /// Move `child` (attached or not) to the end of `parent`'s children
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.tree().attach(parent, child);
    }

    /// Detach `node` from its parent; the subtree stays addressable
    pub fn remove(&self, node: NodeId) {
        self.tree().detach(node);
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.tree().nodes[node.0]
            .attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn set_id(&self, node: NodeId, id: &str) {
        self.set_attribute(node, "id", id);
    }

    pub fn set_text_input(&self, node: NodeId, value: &str, caret: Option<usize>) {
        let mut tree = self.tree();
        let data = &mut tree.nodes[node.0];
        data.value = value.to_string();
        data.caret = caret;
    }

    pub fn value(&self, node: NodeId) -> String {
        self.tree().nodes[node.0].value.clone()
    }

    pub fn caret(&self, node: NodeId) -> Option<usize> {
        self.tree().nodes[node.0].caret
    }

    pub fn style(&self, node: NodeId, property: StyleProperty) -> String {
        self.tree().nodes[node.0]
            .styles
            .get(property.css_name())
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_style(&self, node: NodeId, property: StyleProperty, value: &str) {
        self.tree().nodes[node.0]
            .styles
            .insert(property.css_name(), value.to_string());
    }

    pub fn scroll_offsets(&self, node: NodeId) -> ScrollOffset {
        self.tree().nodes[node.0].scroll
    }

    pub fn window_scroll(&self) -> ScrollOffset {
        self.tree().window_scroll
    }

    /// Whether the last window-level scroll asked for smooth behavior
    pub fn last_window_scroll_smooth(&self) -> Option<bool> {
        self.tree().last_scroll_smooth
    }

    /// Events replay delivered to `node`, oldest first
    pub fn dispatched(&self, node: NodeId) -> Vec<DispatchedEvent> {
        self.tree()
            .dispatched
            .iter()
            .filter(|(target, _)| *target == node)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Make every interaction dispatched to `node` fail with `message`
    pub fn inject_fault(&self, node: NodeId, message: &str) {
        self.tree().nodes[node.0].fault = Some(message.to_string());
    }

    /// Attached elements in document order
    pub fn elements(&self) -> Vec<NodeId> {
        self.tree().document_order()
    }

    /// Snapshot of `node` and its ancestors, as a capture host reports it
    pub fn describe(&self, node: NodeId) -> ElementPath {
        self.tree().describe(node)
    }

    fn emit(&self, event: CapturedEvent) {
        let capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref sink) = *capture {
            if sink.send(event).is_err() {
                log::debug!("capture sink closed, dropping event");
            }
        }
    }

    /// A user pointer click on `node`
    pub fn user_click(&self, node: NodeId) {
        self.user_click_with_pointer(node, 1);
    }

    /// A click carrying an explicit pointer id (`-1` marks synthetic UI clicks)
    pub fn user_click_with_pointer(&self, node: NodeId, pointer_id: i64) {
        let target = self.describe(node);
        self.emit(CapturedEvent {
            target,
            kind: CaptureKind::Click { pointer_id },
        });
    }

    /// A user key press on `node`; `code` may be empty as with some virtual keyboards
    pub fn user_key_down(&self, node: NodeId, key: &str, key_code: u32, code: &str) {
        let target = self.describe(node);
        self.emit(CapturedEvent {
            target,
            kind: CaptureKind::Keydown {
                key: key.to_string(),
                key_code,
                code: code.to_string(),
            },
        });
    }

    /// A user scroll of `node` (the window when `node` is the root or body) to `(x, y)`
    pub fn user_scroll(&self, node: NodeId, x: f64, y: f64) {
        let (element_offset, window_offset, target) = {
            let mut tree = self.tree();
            let offset = ScrollOffset::new(x, y);
            if node == tree.root || node == tree.body {
                tree.window_scroll = offset;
            } else {
                tree.nodes[node.0].scroll = offset;
            }
            (tree.nodes[node.0].scroll, tree.window_scroll, tree.describe(node))
        };
        self.emit(CapturedEvent {
            target,
            kind: CaptureKind::Scroll {
                element_offset,
                window_offset,
            },
        });
    }
}

#[async_trait]
impl LiveDocument for MemoryDocument {
    type Element = NodeId;

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        let tree = self.tree();
        Ok(tree
            .document_order()
            .into_iter()
            .filter(|id| list.matches(&*tree, *id))
            .collect())
    }

    async fn is_viewport(&self, element: &NodeId) -> Result<bool, DomError> {
        let tree = self.tree();
        tree.node(*element)?;
        Ok(*element == tree.root || *element == tree.body)
    }

    async fn inline_style(
        &self,
        element: &NodeId,
        property: StyleProperty,
    ) -> Result<String, DomError> {
        let tree = self.tree();
        Ok(tree
            .node(*element)?
            .styles
            .get(property.css_name())
            .cloned()
            .unwrap_or_default())
    }

    async fn set_inline_style(
        &self,
        element: &NodeId,
        property: StyleProperty,
        value: &str,
    ) -> Result<(), DomError> {
        let mut tree = self.tree();
        let node = tree.node_mut(*element)?;
        if value.is_empty() {
            node.styles.remove(property.css_name());
        } else {
            node.styles.insert(property.css_name(), value.to_string());
        }
        Ok(())
    }

    async fn click(&self, element: &NodeId) -> Result<(), DomError> {
        let mut tree = self.tree();
        tree.check_fault(*element)?;
        tree.dispatched.push((*element, DispatchedEvent::Click));
        Ok(())
    }

    async fn dispatch_key_down(&self, element: &NodeId, stroke: &KeyStroke) -> Result<(), DomError> {
        let mut tree = self.tree();
        tree.check_fault(*element)?;
        tree.dispatched
            .push((*element, DispatchedEvent::KeyDown(stroke.clone())));
        Ok(())
    }

    async fn text_input_state(&self, element: &NodeId) -> Result<Option<TextInputState>, DomError> {
        let tree = self.tree();
        if !tree.is_text_input(*element)? {
            return Ok(None);
        }
        let node = tree.node(*element)?;
        Ok(Some(TextInputState {
            value: node.value.clone(),
            caret: node.caret,
        }))
    }

    async fn set_text_input_state(
        &self,
        element: &NodeId,
        state: &TextInputState,
    ) -> Result<(), DomError> {
        let mut tree = self.tree();
        tree.check_fault(*element)?;
        let node = tree.node_mut(*element)?;
        let len = state.value.chars().count();
        node.value = state.value.clone();
        node.caret = state.caret.map(|c| c.min(len));
        Ok(())
    }

    async fn dispatch_input(&self, element: &NodeId) -> Result<(), DomError> {
        let mut tree = self.tree();
        tree.check_fault(*element)?;
        tree.dispatched.push((*element, DispatchedEvent::Input));
        Ok(())
    }

    async fn scroll_window_to(&self, x: f64, y: f64, smooth: bool) -> Result<(), DomError> {
        let mut tree = self.tree();
        tree.window_scroll = ScrollOffset::new(x, y);
        tree.last_scroll_smooth = Some(smooth);
        Ok(())
    }

    async fn set_scroll_offsets(&self, element: &NodeId, x: f64, y: f64) -> Result<(), DomError> {
        let mut tree = self.tree();
        tree.check_fault(*element)?;
        tree.node_mut(*element)?.scroll = ScrollOffset::new(x, y);
        Ok(())
    }
}

#[async_trait]
impl CaptureHost for MemoryDocument {
    async fn attach_capture(
        &self,
        sink: mpsc::UnboundedSender<CapturedEvent>,
    ) -> Result<(), DomError> {
        *self.capture.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
        Ok(())
    }

    async fn detach_capture(&self) -> Result<(), DomError> {
        self.capture.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_in_document_order() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let form = doc.append_element(body, "form");
        let a = doc.append_element(form, "input");
        let b = doc.append_element(body, "input");

        let found = doc.query_selector_all("input").await.unwrap();
        assert_eq!(found, vec![a, b]);

        let found = doc
            .query_selector_all("body > form:nth-child(1) > input:nth-child(1)")
            .await
            .unwrap();
        assert_eq!(found, vec![a]);
    }

    #[tokio::test]
    async fn test_detached_nodes_are_not_matched() {
        let doc = MemoryDocument::new();
        let lonely = doc.create_element("button");
        doc.set_id(lonely, "go");
        assert!(doc.query_selector_all("#go").await.unwrap().is_empty());

        doc.append_child(doc.body(), lonely);
        assert_eq!(doc.query_selector_all("#go").await.unwrap(), vec![lonely]);

        doc.remove(lonely);
        assert!(doc.query_selector_all("#go").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_input_capability() {
        let doc = MemoryDocument::new();
        let text = doc.append_element(doc.body(), "input");
        let checkbox = doc.append_element(doc.body(), "input");
        doc.set_attribute(checkbox, "type", "checkbox");
        let area = doc.append_element(doc.body(), "textarea");
        let div = doc.append_element(doc.body(), "div");

        assert!(doc.text_input_state(&text).await.unwrap().is_some());
        assert!(doc.text_input_state(&area).await.unwrap().is_some());
        assert!(doc.text_input_state(&checkbox).await.unwrap().is_none());
        assert!(doc.text_input_state(&div).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capture_only_while_attached() {
        let doc = MemoryDocument::new();
        let button = doc.append_element(doc.body(), "button");
        let (tx, mut rx) = mpsc::unbounded_channel();

        doc.user_click(button);
        doc.attach_capture(tx).await.unwrap();
        doc.user_click(button);
        doc.detach_capture().await.unwrap();
        doc.detach_capture().await.unwrap();
        doc.user_click(button);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.target.nodes[0].tag, "button");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let doc = MemoryDocument::new();
        let button = doc.append_element(doc.body(), "button");
        doc.inject_fault(button, "handler threw");
        assert_eq!(
            doc.click(&button).await,
            Err(DomError::Script("handler threw".to_string()))
        );
        assert!(doc.dispatched(button).is_empty());
    }

    #[test]
    fn test_describe_positions() {
        let doc = MemoryDocument::new();
        let list = doc.append_element(doc.body(), "ul");
        doc.set_attribute(list, "class", "menu open");
        doc.append_element(list, "li");
        let second = doc.append_element(list, "li");

        let path = doc.describe(second);
        let tags: Vec<&str> = path.nodes.iter().map(|n| n.tag.as_str()).collect();
        assert_eq!(tags, vec!["li", "ul", "body", "html"]);
        assert_eq!(path.nodes[0].position, 2);
        assert_eq!(path.nodes[1].classes, vec!["menu", "open"]);
        assert_eq!(path.nodes[2].position, 2);
    }
}
