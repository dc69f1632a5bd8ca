//! Canonical node and edge collections for one session.
//!
//! The store is keyed by node id so upserts resolve in O(1): drag
//! interaction feeds it at pointer-move frequency. Nodes keep their
//! first-sighting order so a renderer gets a stable draw order.
//!
//! No delete path exists. Edges are append-only and never deduplicated;
//! an edge may name endpoints the store has not seen (yet).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Point;

/// Title given to nodes created without a payload.
pub const DEFAULT_PLACEHOLDER_TITLE: &str = "git clone";

/// Display data attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub title: String,
    pub description: Option<String>,
    pub code: Option<String>,
}

impl NodePayload {
    /// Payload with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            code: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Interaction flags carried by every shape on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeFlags {
    pub draggable: bool,
    pub is_dragging: bool,
    /// Rotation in whole degrees.
    pub rotation: i64,
}

/// A node record. Positions are canvas space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub position: Point,
    pub payload: NodePayload,
    pub flags: ShapeFlags,
    /// Kind tag the session server keeps per shape; echoed on every update.
    #[serde(default)]
    pub node_type: Option<String>,
}

/// Connection endpoints as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeEndpoints {
    pub source: String,
    pub source_handle: Option<String>,
    pub target: String,
    pub target_handle: Option<String>,
}

impl EdgeEndpoints {
    /// Endpoints without handle names.
    pub fn between(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_handle: None,
            target: target.into(),
            target_handle: None,
        }
    }

    pub fn with_handles(
        mut self,
        source_handle: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        self.source_handle = Some(source_handle.into());
        self.target_handle = Some(target_handle.into());
        self
    }
}

/// An edge record. `id` is generated locally and only gives the edge a
/// rendering identity; peers assign their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    #[serde(flatten)]
    pub endpoints: EdgeEndpoints,
}

/// Outcome of [`GraphStore::upsert_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Keyed node map plus an append-only edge list.
///
/// Holds no lock of its own; callers keep a single writer.
#[derive(Debug, Clone)]
pub struct GraphStore {
    nodes: IndexMap<String, Node>,
    edges: Vec<Edge>,
    placeholder: NodePayload,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::with_placeholder(NodePayload::titled(DEFAULT_PLACEHOLDER_TITLE))
    }

    /// Store that substitutes `placeholder` when a node is created without a payload.
    pub fn with_placeholder(placeholder: NodePayload) -> Self {
        Self {
            nodes: IndexMap::new(),
            edges: Vec::new(),
            placeholder,
        }
    }

    /// Insert or merge a node keyed by `id`.
    ///
    /// Known id: the position is replaced, and the payload only when one is
    /// supplied. Unknown id: a full record is created, with the placeholder
    /// payload if none is supplied. Flags and the node type are left to the
    /// caller through [`GraphStore::node_mut`].
    pub fn upsert_node(
        &mut self,
        id: &str,
        position: Point,
        payload: Option<NodePayload>,
    ) -> Upsert {
        if let Some(node) = self.nodes.get_mut(id) {
            node.position = position;
            if let Some(payload) = payload {
                node.payload = payload;
            }
            return Upsert::Updated;
        }

        let payload = payload.unwrap_or_else(|| self.placeholder.clone());
        log::trace!("node {id} created at ({}, {})", position.x, position.y);
        self.nodes.insert(
            id.to_owned(),
            Node {
                id: id.to_owned(),
                position,
                payload,
                flags: ShapeFlags::default(),
                node_type: None,
            },
        );
        Upsert::Created
    }

    /// Append a new edge. Identical endpoints produce a second record.
    ///
    /// Returns the locally generated edge id.
    pub fn upsert_edge(&mut self, endpoints: EdgeEndpoints) -> String {
        let id = format!("edge-{}", Uuid::new_v4());
        if self.is_dangling(&endpoints) {
            log::debug!(
                "edge {id} references unknown node(s): {} -> {}",
                endpoints.source,
                endpoints.target
            );
        }
        self.edges.push(Edge {
            id: id.clone(),
            endpoints,
        });
        id
    }

    /// Whether either endpoint names a node the store has not seen.
    pub fn is_dangling(&self, endpoints: &EdgeEndpoints) -> bool {
        !self.nodes.contains_key(&endpoints.source) || !self.nodes.contains_key(&endpoints.target)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in first-sighting order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges in arrival order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn placeholder(&self) -> &NodePayload {
        &self.placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_with_placeholder() {
        let mut store = GraphStore::new();
        let outcome = store.upsert_node("n1", Point::new(10.0, 20.0), None);

        assert_eq!(outcome, Upsert::Created);
        let node = store.node("n1").unwrap();
        assert_eq!(node.position, Point::new(10.0, 20.0));
        assert_eq!(node.payload.title, DEFAULT_PLACEHOLDER_TITLE);
        assert_eq!(node.flags, ShapeFlags::default());
    }

    #[test]
    fn test_upsert_creates_with_supplied_payload() {
        let mut store = GraphStore::new();
        let payload = NodePayload::titled("build")
            .with_description("compile the workspace")
            .with_code("cargo build");
        store.upsert_node("n1", Point::ORIGIN, Some(payload.clone()));
        assert_eq!(store.node("n1").unwrap().payload, payload);
    }

    #[test]
    fn test_upsert_merges_position_and_keeps_payload() {
        let mut store = GraphStore::new();
        store.upsert_node("n1", Point::new(10.0, 20.0), Some(NodePayload::titled("fetch")));
        let outcome = store.upsert_node("n1", Point::new(15.0, 25.0), None);

        assert_eq!(outcome, Upsert::Updated);
        assert_eq!(store.node_count(), 1);
        let node = store.node("n1").unwrap();
        assert_eq!(node.position, Point::new(15.0, 25.0));
        assert_eq!(node.payload.title, "fetch");
    }

    #[test]
    fn test_upsert_replaces_payload_when_supplied() {
        let mut store = GraphStore::new();
        store.upsert_node("n1", Point::ORIGIN, None);
        store.upsert_node("n1", Point::ORIGIN, Some(NodePayload::titled("deploy")));
        assert_eq!(store.node("n1").unwrap().payload.title, "deploy");
    }

    #[test]
    fn test_upsert_keeps_flags() {
        let mut store = GraphStore::new();
        store.upsert_node("n1", Point::ORIGIN, None);
        store.node_mut("n1").unwrap().flags.rotation = 90;
        store.upsert_node("n1", Point::new(1.0, 1.0), None);
        assert_eq!(store.node("n1").unwrap().flags.rotation, 90);
    }

    #[test]
    fn test_upsert_keeps_node_type() {
        let mut store = GraphStore::new();
        store.upsert_node("n1", Point::ORIGIN, None);
        assert_eq!(store.node("n1").unwrap().node_type, None);

        store.node_mut("n1").unwrap().node_type = Some("cargo test".into());
        store.upsert_node("n1", Point::new(2.0, 3.0), Some(NodePayload::titled("test")));
        assert_eq!(store.node("n1").unwrap().node_type.as_deref(), Some("cargo test"));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut once = GraphStore::new();
        once.upsert_node("n1", Point::new(3.0, 4.0), None);

        let mut twice = GraphStore::new();
        twice.upsert_node("n1", Point::new(3.0, 4.0), None);
        twice.upsert_node("n1", Point::new(3.0, 4.0), None);

        let a: Vec<_> = once.nodes().cloned().collect();
        let b: Vec<_> = twice.nodes().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_last_write_wins_over_sequence() {
        let mut store = GraphStore::new();
        for i in 0..100 {
            store.upsert_node("n1", Point::new(i as f64, -(i as f64)), None);
        }
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.node("n1").unwrap().position, Point::new(99.0, -99.0));
    }

    #[test]
    fn test_nodes_keep_first_sighting_order() {
        let mut store = GraphStore::new();
        store.upsert_node("b", Point::ORIGIN, None);
        store.upsert_node("a", Point::ORIGIN, None);
        store.upsert_node("b", Point::new(1.0, 1.0), None);

        let ids: Vec<&str> = store.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_edges_are_kept() {
        let mut store = GraphStore::new();
        let endpoints = EdgeEndpoints::between("n1", "n2").with_handles("out", "in");
        let first = store.upsert_edge(endpoints.clone());
        let second = store.upsert_edge(endpoints);

        assert_eq!(store.edge_count(), 2);
        assert_ne!(first, second);
    }

    #[test]
    fn test_dangling_edge_is_accepted() {
        let mut store = GraphStore::new();
        store.upsert_node("n1", Point::ORIGIN, None);
        let endpoints = EdgeEndpoints::between("n1", "n2");

        assert!(store.is_dangling(&endpoints));
        store.upsert_edge(endpoints.clone());
        assert_eq!(store.edge_count(), 1);

        store.upsert_node("n2", Point::ORIGIN, None);
        assert!(!store.is_dangling(&endpoints));
    }

    #[test]
    fn test_edge_ids_disjoint_from_node_ids() {
        let mut store = GraphStore::new();
        store.upsert_node("n1", Point::ORIGIN, None);
        let id = store.upsert_edge(EdgeEndpoints::between("n1", "n1"));
        assert!(id.starts_with("edge-"));
        assert!(!store.contains_node(&id));
    }

    #[test]
    fn test_custom_placeholder() {
        let mut store = GraphStore::with_placeholder(NodePayload::titled("step"));
        store.upsert_node("n1", Point::ORIGIN, None);
        assert_eq!(store.node("n1").unwrap().payload.title, "step");
        assert_eq!(store.placeholder().title, "step");
    }

    #[test]
    fn test_edge_serializes_flat() {
        let edge = Edge {
            id: "edge-1".into(),
            endpoints: EdgeEndpoints::between("a", "b"),
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["id"], "edge-1");
        assert_eq!(json["source"], "a");
        assert_eq!(json["target"], "b");
    }
}
