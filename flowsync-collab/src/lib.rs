//! # flowsync-collab — live graph and presence reconciliation
//!
//! Client side of a shared flow-graph session: one WebSocket to the
//! session server, JSON deltas both ways, and a single-writer engine that
//! merges the server's broadcasts into a local graph and a set of remote
//! cursors.
//!
//! ## Architecture
//!
//! ```text
//! gesture ─► IntentBuilder ─► ChannelAdapter ─► server ─► broadcast
//!                                                           │
//! snapshot ◄─ GraphStore / PresenceStore ◄─ Event::decode ◄─┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — wire frames: inbound [`Event`]s, outbound [`Intent`]s
//! - [`channel`] — transport trait, WebSocket and in-memory transports
//! - [`throttle`] — keyed coalescing with an injectable [`Clock`]
//! - [`presence`] — remote cursors, throttled and projected to screen space
//! - [`intent`] — gesture → intent translation and per-node drag state
//! - [`session`] — the [`SessionEngine`] and its [`SessionHandle`]
//! - [`config`] — [`SessionConfig`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use flowsync_collab::{SessionConfig, SessionEngine};
//!
//! # async fn demo() {
//! let engine = SessionEngine::websocket(SessionConfig::default());
//! let handle = engine.handle();
//! let task = tokio::spawn(engine.run());
//!
//! let snapshot = handle.snapshot();
//! println!("{} node(s)", snapshot.nodes.len());
//!
//! handle.stop();
//! task.await.ok();
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod intent;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod throttle;

pub use channel::{
    Channel, ChannelAdapter, ChannelError, ChannelEvent, ChannelEventKind, ChannelStats,
    ConnectionState, MemoryChannel, MemoryRemote, WsChannel,
};
pub use config::SessionConfig;
pub use intent::{DragState, IntentBuilder};
pub use presence::{Collaborator, CursorColor, PresenceStore};
pub use protocol::{Event, Intent, MessageType, ProtocolError, ShapeState};
pub use session::{SessionEngine, SessionHandle, SessionSnapshot};
pub use throttle::{Clock, ManualClock, SystemClock, Throttle, ThrottleStats};
