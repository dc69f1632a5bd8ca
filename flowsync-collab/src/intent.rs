//! Turns local gestures into protocol intents.
//!
//! Per-node drag state machine:
//!
//! ```text
//!          drag_started / node_dragged
//!   Idle ───────────────────────────────► Dragging
//!    ▲                                       │
//!    └────────────── drag_ended ─────────────┘
//! ```
//!
//! Transitions are local and never wait on the server. The builder does not
//! touch the graph store: intents only take effect once the server echoes
//! them back.

use std::collections::HashMap;

use flowsync_core::{EdgeEndpoints, Point, ShapeFlags, Viewport};

use crate::protocol::Intent;

/// Drag state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging,
}

/// Builds outbound intents and tracks which nodes are being dragged.
#[derive(Debug, Default)]
pub struct IntentBuilder {
    dragging: HashMap<String, DragState>,
}

impl IntentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local pointer moved; `screen` is relative to the render surface.
    pub fn pointer_moved(&self, screen: Point, viewport: &Viewport) -> Intent {
        Intent::UpdateMouse {
            position: viewport.to_canvas(screen),
        }
    }

    /// A palette element was dropped at `screen`.
    pub fn element_dropped(
        &self,
        screen: Point,
        viewport: &Viewport,
        node_type: Option<String>,
    ) -> Intent {
        Intent::CreateShape {
            position: viewport.to_canvas(screen),
            flags: ShapeFlags::default(),
            node_type,
        }
    }

    /// Enter `Dragging` for `id`. Emits nothing; the first frame does.
    pub fn drag_started(&mut self, id: &str) {
        if self.state(id) == DragState::Dragging {
            log::debug!("drag_started for {id} while already dragging");
        }
        self.dragging.insert(id.to_owned(), DragState::Dragging);
    }

    /// One drag frame at canvas `position`. `flags` and `node_type` are the
    /// node's current ones; the server overwrites its record with whatever
    /// the frame carries.
    ///
    /// An idle node enters `Dragging` implicitly.
    pub fn node_dragged(
        &mut self,
        id: &str,
        position: Point,
        flags: ShapeFlags,
        node_type: Option<&str>,
    ) -> Intent {
        if self.state(id) == DragState::Idle {
            log::debug!("drag frame for idle node {id}; entering Dragging");
            self.dragging.insert(id.to_owned(), DragState::Dragging);
        }
        Intent::UpdateShape {
            id: id.to_owned(),
            position,
            flags: ShapeFlags {
                is_dragging: true,
                ..flags
            },
            node_type: node_type.map(str::to_owned),
        }
    }

    /// Release. Emits the terminal `isDragging = false` update, or nothing
    /// if the node was not being dragged.
    pub fn drag_ended(
        &mut self,
        id: &str,
        position: Point,
        flags: ShapeFlags,
        node_type: Option<&str>,
    ) -> Option<Intent> {
        if self.dragging.remove(id).is_none() {
            log::debug!("drag_ended for idle node {id}");
            return None;
        }
        Some(Intent::UpdateShape {
            id: id.to_owned(),
            position,
            flags: ShapeFlags {
                is_dragging: false,
                ..flags
            },
            node_type: node_type.map(str::to_owned),
        })
    }

    /// Two handles were connected.
    pub fn handles_connected(&self, endpoints: EdgeEndpoints) -> Intent {
        Intent::CreateEdge(endpoints)
    }

    pub fn state(&self, id: &str) -> DragState {
        self.dragging.get(id).copied().unwrap_or_default()
    }

    /// Ids currently in `Dragging`.
    pub fn dragging(&self) -> impl Iterator<Item = &str> {
        self.dragging.keys().map(String::as_str)
    }

    /// Abandon every drag in progress.
    pub fn reset(&mut self) {
        self.dragging.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_moved_sends_canvas_space() {
        let builder = IntentBuilder::new();
        let viewport = Viewport::new(100.0, 50.0, 2.0);
        let intent = builder.pointer_moved(Point::new(120.0, 90.0), &viewport);
        assert_eq!(intent, Intent::UpdateMouse { position: Point::new(10.0, 20.0) });
    }

    #[test]
    fn test_element_dropped_creates_shape() {
        let builder = IntentBuilder::new();
        let intent = builder.element_dropped(
            Point::new(40.0, 40.0),
            &Viewport::IDENTITY,
            Some("git clone".into()),
        );
        assert_eq!(
            intent,
            Intent::CreateShape {
                position: Point::new(40.0, 40.0),
                flags: ShapeFlags::default(),
                node_type: Some("git clone".into()),
            }
        );
    }

    #[test]
    fn test_drag_cycle() {
        let mut builder = IntentBuilder::new();
        let flags = ShapeFlags { draggable: true, is_dragging: false, rotation: 15 };

        assert_eq!(builder.state("n1"), DragState::Idle);
        builder.drag_started("n1");
        assert_eq!(builder.state("n1"), DragState::Dragging);

        match builder.node_dragged("n1", Point::new(5.0, 6.0), flags, Some("cargo fmt")) {
            Intent::UpdateShape { id, position, flags, node_type } => {
                assert_eq!(id, "n1");
                assert_eq!(position, Point::new(5.0, 6.0));
                assert!(flags.is_dragging);
                assert!(flags.draggable);
                assert_eq!(flags.rotation, 15);
                assert_eq!(node_type.as_deref(), Some("cargo fmt"));
            }
            other => panic!("Expected UpdateShape, got {other:?}"),
        }

        match builder.drag_ended("n1", Point::new(7.0, 8.0), flags, Some("cargo fmt")) {
            Some(Intent::UpdateShape { flags, position, node_type, .. }) => {
                assert!(!flags.is_dragging);
                assert_eq!(node_type.as_deref(), Some("cargo fmt"));
                assert_eq!(position, Point::new(7.0, 8.0));
            }
            other => panic!("Expected terminal UpdateShape, got {other:?}"),
        }
        assert_eq!(builder.state("n1"), DragState::Idle);
    }

    #[test]
    fn test_drag_frame_on_idle_node_enters_dragging() {
        let mut builder = IntentBuilder::new();
        builder.node_dragged("n1", Point::ORIGIN, ShapeFlags::default(), None);
        assert_eq!(builder.state("n1"), DragState::Dragging);
    }

    #[test]
    fn test_drag_end_on_idle_node_emits_nothing() {
        let mut builder = IntentBuilder::new();
        assert!(builder.drag_ended("n1", Point::ORIGIN, ShapeFlags::default(), None).is_none());
    }

    #[test]
    fn test_drag_states_are_per_node() {
        let mut builder = IntentBuilder::new();
        builder.drag_started("a");
        builder.drag_started("b");
        builder.drag_ended("a", Point::ORIGIN, ShapeFlags::default(), None);

        assert_eq!(builder.state("a"), DragState::Idle);
        assert_eq!(builder.state("b"), DragState::Dragging);
        assert_eq!(builder.dragging().collect::<Vec<_>>(), vec!["b"]);

        builder.reset();
        assert_eq!(builder.state("b"), DragState::Idle);
    }

    #[test]
    fn test_handles_connected() {
        let builder = IntentBuilder::new();
        let endpoints = EdgeEndpoints::between("a", "b").with_handles("out", "in");
        assert_eq!(
            builder.handles_connected(endpoints.clone()),
            Intent::CreateEdge(endpoints)
        );
    }
}
