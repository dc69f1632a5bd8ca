//! # flowsync-core — shared graph model for live flow sessions
//!
//! Pure, single-writer state: no I/O, no locking, no clocks.
//!
//! ## Modules
//!
//! - [`geometry`] — canvas / screen points
//! - [`viewport`] — pan/zoom state and the canvas ⇄ screen transform
//! - [`graph`] — node and edge records plus the keyed [`GraphStore`]
//!
//! ```text
//! canvas space ──Viewport::to_screen──► screen space
//!      ▲                                     │
//!      └────────Viewport::to_canvas──────────┘
//! ```

pub mod geometry;
pub mod graph;
pub mod viewport;

pub use geometry::Point;
pub use graph::{
    Edge, EdgeEndpoints, GraphStore, Node, NodePayload, ShapeFlags, Upsert,
    DEFAULT_PLACEHOLDER_TITLE,
};
pub use viewport::{Viewport, MAX_ZOOM, MIN_ZOOM};
