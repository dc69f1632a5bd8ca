//! The session engine: single writer for graph, presence and connection.
//!
//! ```text
//!  SessionHandle ──Command──┐
//!                           ▼
//!  Channel ──ChannelEvent──► SessionEngine ──watch──► Arc<SessionSnapshot>
//!     ▲                      │  GraphStore
//!     └───────Intent─────────┘  PresenceStore (throttled)
//! ```
//!
//! Everything is applied one event at a time in arrival order. The engine
//! can be driven synchronously (`pump`, gesture methods) or spawned as an
//! actor with [`SessionEngine::run`] and steered through [`SessionHandle`]s.
//! Local gestures only ever produce intents; shared state changes when the
//! server's echo arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flowsync_core::{Edge, EdgeEndpoints, GraphStore, Node, NodePayload, Point, Viewport};
use tokio::sync::{mpsc, watch};

use crate::channel::{
    Channel, ChannelAdapter, ChannelEvent, ChannelStats, ConnectionState, WsChannel,
};
use crate::config::SessionConfig;
use crate::intent::IntentBuilder;
use crate::presence::{Collaborator, PresenceStore};
use crate::protocol::{Event, Intent, ShapeState};
use crate::throttle::{Clock, SystemClock};

/// Immutable view of the session handed to renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Bumped on every publish.
    pub revision: u64,
    pub connection: ConnectionState,
    /// Nodes in first-seen order.
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Sorted by connection id.
    pub collaborators: Vec<Collaborator>,
    pub viewport: Viewport,
    /// Position of each node id in `nodes`.
    node_index: HashMap<String, usize>,
}

impl SessionSnapshot {
    fn empty(viewport: Viewport) -> Self {
        Self {
            revision: 0,
            connection: ConnectionState::Disconnected,
            nodes: Vec::new(),
            edges: Vec::new(),
            collaborators: Vec::new(),
            viewport,
            node_index: HashMap::new(),
        }
    }

    /// Node by id, in constant time.
    pub fn node(&self, id: &str) -> Option<&Node> {
        let &i = self.node_index.get(id)?;
        self.nodes.get(i).filter(|n| n.id == id)
    }

    pub fn collaborator(&self, conn_id: &str) -> Option<&Collaborator> {
        self.collaborators
            .binary_search_by(|c| c.conn_id.as_str().cmp(conn_id))
            .ok()
            .map(|i| &self.collaborators[i])
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }
}

/// Commands accepted by a running engine.
#[derive(Debug, Clone)]
enum Command {
    PointerMoved(Point),
    ElementDropped { screen: Point, node_type: Option<String> },
    DragStarted(String),
    NodeDragged { id: String, position: Point },
    DragEnded { id: String, position: Point },
    ConnectHandles(EdgeEndpoints),
    SetViewport(Viewport),
    PanBy { dx: f64, dy: f64 },
    ZoomAt { anchor: Point, factor: f64 },
    Reconnect,
    Stop,
}

/// Reconciles the local graph and presence with the session server.
pub struct SessionEngine<C, K = SystemClock> {
    config: SessionConfig,
    adapter: ChannelAdapter<C>,
    clock: K,
    graph: GraphStore,
    presence: PresenceStore,
    viewport: Viewport,
    intents: IntentBuilder,
    events_rx: mpsc::Receiver<ChannelEvent>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    snapshot_tx: watch::Sender<Arc<SessionSnapshot>>,
    revision: u64,
    dirty: bool,
}

impl SessionEngine<WsChannel, SystemClock> {
    /// Engine talking WebSocket to `config.server_url`, on the wall clock.
    pub fn websocket(config: SessionConfig) -> Self {
        let channel = WsChannel::with_capacity(config.outbound_capacity);
        Self::new(config, channel, SystemClock::new())
    }
}

impl<C: Channel, K: Clock> SessionEngine<C, K> {
    pub fn new(config: SessionConfig, channel: C, clock: K) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let viewport = Viewport::IDENTITY;
        let (snapshot_tx, _) = watch::channel(Arc::new(SessionSnapshot::empty(viewport)));

        Self {
            adapter: ChannelAdapter::new(channel, config.server_url.clone(), events_tx),
            clock,
            graph: GraphStore::with_placeholder(NodePayload::titled(config.placeholder_title.clone())),
            presence: PresenceStore::new(config.throttle_window),
            viewport,
            intents: IntentBuilder::new(),
            events_rx,
            commands_tx,
            commands_rx,
            snapshot_tx,
            revision: 0,
            dirty: false,
            config,
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open the connection. No-op unless disconnected.
    pub fn start(&mut self) -> bool {
        let started = self.adapter.start();
        self.dirty |= started;
        self.publish();
        started
    }

    /// Close the connection if one is open or opening.
    ///
    /// Graph state is kept; presence and in-progress drags are dropped.
    pub fn stop(&mut self) -> bool {
        let stopped = self.adapter.stop();
        if stopped {
            self.connection_lost();
        }
        self.publish();
        stopped
    }

    fn connection_lost(&mut self) {
        if !self.presence.is_empty() || self.presence.pending_len() > 0 {
            log::debug!("Dropping {} collaborator cursor(s)", self.presence.len());
        }
        self.presence.clear();
        self.intents.reset();
        self.dirty = true;
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Process every queued transport event and command, then release due
    /// presence updates. Returns the number of events and commands handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.on_channel_event(event);
            handled += 1;
        }
        while let Ok(command) = self.commands_rx.try_recv() {
            self.execute(command);
            handled += 1;
        }
        self.flush_presence();
        self.publish();
        handled
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        let before = self.adapter.state();
        let frame = self.adapter.on_event(event);
        let after = self.adapter.state();

        if before != after {
            self.dirty = true;
            if after == ConnectionState::Disconnected {
                self.connection_lost();
            }
        }
        if let Some(frame) = frame {
            self.apply_frame(&frame);
        }
    }

    /// Decode and apply one raw frame. Junk is dropped.
    pub fn apply_frame(&mut self, raw: &str) -> bool {
        match Event::decode(raw) {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Merge one decoded event into the stores.
    pub fn apply(&mut self, event: Event) {
        match event {
            Event::ShapeCreated(shape) => {
                let payload = if self.graph.contains_node(&shape.id) {
                    None
                } else {
                    shape.node_type.as_deref().map(NodePayload::titled)
                };
                self.merge_shape(shape, payload);
            }
            Event::ShapeUpdated(shape) => self.merge_shape(shape, None),
            Event::EdgeCreated(endpoints) => {
                self.graph.upsert_edge(endpoints);
                self.dirty = true;
            }
            Event::MouseMoved { conn_id, position } => {
                // Becomes visible on the next flush.
                self.presence.on_remote_cursor(&conn_id, position, self.clock.now());
            }
            Event::PeerDisconnected { conn_id } => {
                self.dirty |= self.presence.on_disconnect(&conn_id);
            }
        }
    }

    /// Upsert a shape, then take its flags and any node type it names.
    fn merge_shape(&mut self, shape: ShapeState, payload: Option<NodePayload>) {
        self.graph.upsert_node(&shape.id, shape.position, payload);
        if let Some(node) = self.graph.node_mut(&shape.id) {
            node.flags = shape.flags;
            if shape.node_type.is_some() {
                node.node_type = shape.node_type;
            }
        }
        self.dirty = true;
    }

    /// Apply presence updates whose throttle window has elapsed.
    pub fn flush_presence(&mut self) -> usize {
        let applied = self.presence.flush_due(self.clock.now(), &self.viewport);
        self.dirty |= applied > 0;
        applied
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Local pointer moved to `screen`.
    pub fn pointer_moved(&mut self, screen: Point) -> bool {
        let intent = self.intents.pointer_moved(screen, &self.viewport);
        self.adapter.send(&intent)
    }

    /// A palette element was dropped at `screen`.
    pub fn element_dropped(&mut self, screen: Point, node_type: Option<String>) -> bool {
        let intent = self.intents.element_dropped(screen, &self.viewport, node_type);
        self.adapter.send(&intent)
    }

    pub fn drag_started(&mut self, id: &str) {
        self.intents.drag_started(id);
    }

    /// One drag frame; `position` is the node's canvas position.
    pub fn node_dragged(&mut self, id: &str, position: Point) -> bool {
        let node = self.graph.node(id);
        let flags = node.map(|n| n.flags).unwrap_or_default();
        let node_type = node.and_then(|n| n.node_type.as_deref());
        let intent = self.intents.node_dragged(id, position, flags, node_type);
        self.adapter.send(&intent)
    }

    /// Drag released at canvas `position`.
    pub fn drag_ended(&mut self, id: &str, position: Point) -> bool {
        let node = self.graph.node(id);
        let flags = node.map(|n| n.flags).unwrap_or_default();
        let node_type = node.and_then(|n| n.node_type.as_deref());
        match self.intents.drag_ended(id, position, flags, node_type) {
            Some(intent) => self.adapter.send(&intent),
            None => false,
        }
    }

    pub fn connect_handles(&mut self, endpoints: EdgeEndpoints) -> bool {
        let intent = self.intents.handles_connected(endpoints);
        self.adapter.send(&intent)
    }

    /// Send a prepared intent as-is.
    pub fn send(&mut self, intent: &Intent) -> bool {
        self.adapter.send(intent)
    }

    // ── Viewport ────────────────────────────────────────────────────

    /// Replace the viewport and reproject every collaborator.
    ///
    /// Out-of-range fields are brought back into bounds first.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport.normalized();
        self.presence.reproject(&self.viewport);
        self.dirty = true;
        self.publish();
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        let mut viewport = self.viewport;
        viewport.pan_by(dx, dy);
        self.set_viewport(viewport);
    }

    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        let mut viewport = self.viewport;
        viewport.zoom_at(anchor, factor);
        self.set_viewport(viewport);
    }

    // ── Snapshots ───────────────────────────────────────────────────

    fn publish(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.revision += 1;

        let nodes: Vec<Node> = self.graph.nodes().cloned().collect();
        let node_index = nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect();
        let snapshot = SessionSnapshot {
            revision: self.revision,
            connection: self.adapter.state(),
            nodes,
            edges: self.graph.edges().to_vec(),
            collaborators: self.presence.collaborators(),
            viewport: self.viewport,
            node_index,
        };
        log::trace!(
            "snapshot r{}: {} node(s), {} edge(s), {} collaborator(s)",
            snapshot.revision,
            snapshot.nodes.len(),
            snapshot.edges.len(),
            snapshot.collaborators.len()
        );
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// A command handle for this engine, usable once it is running.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cmd_tx: self.commands_tx.clone(),
            snapshots: self.snapshot_tx.subscribe(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.adapter.state()
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.adapter.stats()
    }

    pub fn channel(&self) -> &C {
        self.adapter.transport()
    }

    // ── Actor loop ──────────────────────────────────────────────────

    fn execute(&mut self, command: Command) {
        match command {
            Command::PointerMoved(screen) => {
                self.pointer_moved(screen);
            }
            Command::ElementDropped { screen, node_type } => {
                self.element_dropped(screen, node_type);
            }
            Command::DragStarted(id) => self.drag_started(&id),
            Command::NodeDragged { id, position } => {
                self.node_dragged(&id, position);
            }
            Command::DragEnded { id, position } => {
                self.drag_ended(&id, position);
            }
            Command::ConnectHandles(endpoints) => {
                self.connect_handles(endpoints);
            }
            Command::SetViewport(viewport) => self.set_viewport(viewport),
            Command::PanBy { dx, dy } => self.pan_by(dx, dy),
            Command::ZoomAt { anchor, factor } => self.zoom_at(anchor, factor),
            Command::Reconnect => {
                self.start();
            }
            Command::Stop => {
                self.stop();
            }
        }
    }

    /// Start the connection and serve events and commands until a
    /// [`SessionHandle::stop`] arrives or every handle is dropped.
    pub async fn run(mut self) {
        // Only handles keep the command queue open from here on. The
        // replacement sender feeds a queue nobody reads.
        drop(std::mem::replace(&mut self.commands_tx, mpsc::unbounded_channel().0));
        self.start();

        loop {
            let flush_in = self
                .presence
                .next_deadline()
                .map(|at| at.saturating_sub(self.clock.now()));

            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    self.on_channel_event(event);
                }
                command = self.commands_rx.recv() => match command {
                    Some(Command::Stop) | None => break,
                    Some(command) => self.execute(command),
                },
                _ = tokio::time::sleep(flush_in.unwrap_or(Duration::ZERO)), if flush_in.is_some() => {}
            }

            self.flush_presence();
            self.publish();
        }

        self.stop();
        log::info!("Session engine stopped");
    }
}

/// Cloneable front-end to a running [`SessionEngine`].
///
/// Every method is fire-and-forget; `false` means the engine is gone.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
}

impl SessionHandle {
    fn send(&self, command: Command) -> bool {
        self.cmd_tx.send(command).is_ok()
    }

    pub fn pointer_moved(&self, screen: Point) -> bool {
        self.send(Command::PointerMoved(screen))
    }

    pub fn element_dropped(&self, screen: Point, node_type: Option<String>) -> bool {
        self.send(Command::ElementDropped { screen, node_type })
    }

    pub fn drag_started(&self, id: impl Into<String>) -> bool {
        self.send(Command::DragStarted(id.into()))
    }

    pub fn node_dragged(&self, id: impl Into<String>, position: Point) -> bool {
        self.send(Command::NodeDragged { id: id.into(), position })
    }

    pub fn drag_ended(&self, id: impl Into<String>, position: Point) -> bool {
        self.send(Command::DragEnded { id: id.into(), position })
    }

    pub fn connect_handles(&self, endpoints: EdgeEndpoints) -> bool {
        self.send(Command::ConnectHandles(endpoints))
    }

    pub fn set_viewport(&self, viewport: Viewport) -> bool {
        self.send(Command::SetViewport(viewport))
    }

    pub fn pan_by(&self, dx: f64, dy: f64) -> bool {
        self.send(Command::PanBy { dx, dy })
    }

    pub fn zoom_at(&self, anchor: Point, factor: f64) -> bool {
        self.send(Command::ZoomAt { anchor, factor })
    }

    /// Attempt a fresh connection if the previous one is gone.
    pub fn reconnect(&self) -> bool {
        self.send(Command::Reconnect)
    }

    /// Close the connection and end the engine loop.
    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}
