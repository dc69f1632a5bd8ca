//! The single duplex connection to the session server.
//!
//! ```text
//!                 open / transmit / close
//! ChannelAdapter ─────────────────────────► Channel (transport)
//!       ▲                                        │
//!       │  on_event(ChannelEvent)                │ Opened / Frame / Failed / Closed
//!       └──────── engine ◄── mpsc ◄──────────────┘
//! ```
//!
//! Transports only move text frames and report lifecycle; the adapter owns
//! the connected/disconnected status, serializes intents, and drops sends
//! while not connected. Every `start` opens a new *generation*; events
//! tagged with an older generation belong to a connection that was already
//! given up and are ignored.

pub mod memory;
pub mod ws;

use tokio::sync::mpsc;

use crate::protocol::Intent;

pub use memory::{MemoryChannel, MemoryRemote};
pub use ws::WsChannel;

/// Connection status as seen by the rest of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What a transport reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEventKind {
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// Connect error or abrupt failure; the connection is gone.
    Failed(String),
    /// Orderly close by either side.
    Closed,
}

/// A transport report tagged with the connection generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub generation: u64,
    pub kind: ChannelEventKind,
}

impl ChannelEvent {
    pub fn new(generation: u64, kind: ChannelEventKind) -> Self {
        Self { generation, kind }
    }
}

/// Transport errors. Logged by the adapter, never returned to callers of `send`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("not connected")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Backpressure,
    #[error("failed to open connection: {0}")]
    Open(String),
}

/// A duplex text-frame transport.
///
/// `open` must not block: the outcome arrives later as an
/// [`ChannelEventKind::Opened`] or [`ChannelEventKind::Failed`] event.
pub trait Channel {
    fn open(
        &mut self,
        url: &str,
        generation: u64,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), ChannelError>;

    /// Queue one text frame on the open connection.
    fn transmit(&mut self, frame: String) -> Result<(), ChannelError>;

    /// Tear the connection down. Must be safe to call at any time.
    fn close(&mut self);
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_received: u64,
    pub connections_opened: u64,
}

/// Owns the transport and the connection status.
pub struct ChannelAdapter<C> {
    transport: C,
    url: String,
    state: ConnectionState,
    generation: u64,
    events_tx: mpsc::Sender<ChannelEvent>,
    stats: ChannelStats,
}

impl<C: Channel> ChannelAdapter<C> {
    pub fn new(transport: C, url: impl Into<String>, events_tx: mpsc::Sender<ChannelEvent>) -> Self {
        Self {
            transport,
            url: url.into(),
            state: ConnectionState::Disconnected,
            generation: 0,
            events_tx,
            stats: ChannelStats::default(),
        }
    }

    /// Begin a fresh connection attempt.
    ///
    /// Only one connection exists per adapter: returns `false` and does
    /// nothing unless currently disconnected.
    pub fn start(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            log::debug!("start ignored: connection already {:?}", self.state);
            return false;
        }

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        log::info!("Connecting to {} (connection #{})", self.url, self.generation);

        match self.transport.open(&self.url, self.generation, self.events_tx.clone()) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Connection #{} failed: {e}", self.generation);
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    /// Close the connection if one is open or opening.
    pub fn stop(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        log::info!("Closing connection #{}", self.generation);
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        // Anything still in flight from this connection is now stale.
        self.generation += 1;
        true
    }

    /// Serialize and transmit `intent`. Fire-and-forget: dropped silently
    /// while not connected, logged on transport failure.
    pub fn send(&mut self, intent: &Intent) -> bool {
        if self.state != ConnectionState::Connected {
            log::debug!("Dropping {} intent: not connected", intent.message_type().as_str());
            self.stats.frames_dropped += 1;
            return false;
        }

        let frame = match intent.encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to encode intent: {e}");
                self.stats.frames_dropped += 1;
                return false;
            }
        };

        log::trace!("-> {frame}");
        match self.transport.transmit(frame) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                true
            }
            Err(e) => {
                log::warn!("Dropping {} intent: {e}", intent.message_type().as_str());
                self.stats.frames_dropped += 1;
                false
            }
        }
    }

    /// Fold a transport event into the connection status.
    ///
    /// Returns the inbound frame text for [`ChannelEventKind::Frame`] events
    /// of the current connection.
    pub fn on_event(&mut self, event: ChannelEvent) -> Option<String> {
        if event.generation != self.generation {
            log::debug!(
                "Ignoring {:?} from stale connection #{} (current #{})",
                event.kind,
                event.generation,
                self.generation
            );
            return None;
        }

        match event.kind {
            ChannelEventKind::Opened => {
                log::info!("Connected to {} (connection #{})", self.url, self.generation);
                self.state = ConnectionState::Connected;
                self.stats.connections_opened += 1;
                None
            }
            ChannelEventKind::Frame(frame) => {
                log::trace!("<- {frame}");
                self.stats.frames_received += 1;
                Some(frame)
            }
            ChannelEventKind::Failed(reason) => {
                log::error!("Connection #{} error: {reason}", self.generation);
                self.disconnected();
                None
            }
            ChannelEventKind::Closed => {
                log::info!("Connection #{} closed", self.generation);
                self.disconnected();
                None
            }
        }
    }

    fn disconnected(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn transport(&self) -> &C {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsync_core::Point;

    fn adapter() -> (ChannelAdapter<MemoryChannel>, MemoryRemote, mpsc::Receiver<ChannelEvent>) {
        let (channel, remote) = MemoryChannel::pair();
        let (tx, rx) = mpsc::channel(16);
        (ChannelAdapter::new(channel, "ws://test/ws", tx), remote, rx)
    }

    fn mouse() -> Intent {
        Intent::UpdateMouse { position: Point::new(1.0, 2.0) }
    }

    #[test]
    fn test_initial_state() {
        let (adapter, _remote, _rx) = adapter();
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
        assert_eq!(adapter.generation(), 0);
        assert_eq!(adapter.url(), "ws://test/ws");
    }

    #[test]
    fn test_open_flips_to_connected() {
        let (mut adapter, remote, mut rx) = adapter();
        assert!(adapter.start());
        assert_eq!(adapter.state(), ConnectionState::Connecting);

        remote.accept();
        let event = rx.try_recv().unwrap();
        assert_eq!(adapter.on_event(event), None);
        assert!(adapter.is_connected());
        assert_eq!(adapter.stats().connections_opened, 1);
    }

    #[test]
    fn test_single_connection_per_adapter() {
        let (mut adapter, remote, _rx) = adapter();
        assert!(adapter.start());
        assert!(!adapter.start());
        assert_eq!(remote.opens(), 1);
    }

    #[test]
    fn test_send_dropped_while_disconnected() {
        let (mut adapter, remote, _rx) = adapter();
        assert!(!adapter.send(&mouse()));
        adapter.start();
        assert!(!adapter.send(&mouse())); // still connecting
        assert!(remote.sent().is_empty());
        assert_eq!(adapter.stats().frames_dropped, 2);
    }

    #[test]
    fn test_send_transmits_encoded_frame() {
        let (mut adapter, remote, mut rx) = adapter();
        adapter.start();
        remote.accept();
        adapter.on_event(rx.try_recv().unwrap());

        assert!(adapter.send(&mouse()));
        assert_eq!(remote.sent(), vec![mouse().encode().unwrap()]);
        assert_eq!(adapter.stats().frames_sent, 1);
    }

    #[test]
    fn test_close_permits_fresh_start() {
        let (mut adapter, remote, mut rx) = adapter();
        adapter.start();
        remote.accept();
        adapter.on_event(rx.try_recv().unwrap());

        remote.hang_up();
        adapter.on_event(rx.try_recv().unwrap());
        assert_eq!(adapter.state(), ConnectionState::Disconnected);

        assert!(adapter.start());
        assert_eq!(adapter.generation(), 2);
        assert_eq!(remote.opens(), 2);
    }

    #[test]
    fn test_failure_flips_to_disconnected() {
        let (mut adapter, remote, mut rx) = adapter();
        adapter.start();
        remote.refuse("connection refused");
        adapter.on_event(rx.try_recv().unwrap());
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stale_events_ignored() {
        let (mut adapter, remote, mut rx) = adapter();
        adapter.start();
        remote.accept();
        adapter.on_event(rx.try_recv().unwrap());

        // A late close from a superseded connection must not drop the current one.
        let stale = ChannelEvent::new(adapter.generation() - 1, ChannelEventKind::Closed);
        assert_eq!(adapter.on_event(stale), None);
        assert!(adapter.is_connected());

        let stale_frame = ChannelEvent::new(99, ChannelEventKind::Frame("{}".into()));
        assert_eq!(adapter.on_event(stale_frame), None);
    }

    #[test]
    fn test_stop_only_when_open() {
        let (mut adapter, remote, mut rx) = adapter();
        assert!(!adapter.stop());
        assert_eq!(remote.closes(), 0);

        adapter.start();
        remote.accept();
        adapter.on_event(rx.try_recv().unwrap());
        assert!(adapter.stop());
        assert_eq!(remote.closes(), 1);
        assert!(!remote.is_open());
    }

    #[test]
    fn test_events_after_stop_are_stale() {
        let (mut adapter, remote, mut rx) = adapter();
        adapter.start();
        remote.accept();
        adapter.on_event(rx.try_recv().unwrap());
        adapter.stop();

        // The transport may still report its own close after we gave up on it.
        remote.deliver_raw(ChannelEvent::new(1, ChannelEventKind::Frame("late".into())));
        assert_eq!(adapter.on_event(rx.try_recv().unwrap()), None);
        assert_eq!(adapter.stats().frames_received, 0);
    }

    #[test]
    fn test_frames_returned() {
        let (mut adapter, remote, mut rx) = adapter();
        adapter.start();
        remote.accept();
        adapter.on_event(rx.try_recv().unwrap());

        remote.deliver(r#"{"type":"disconnect","mouse_info":{"conn_id":"x"}}"#);
        let frame = adapter.on_event(rx.try_recv().unwrap());
        assert!(frame.unwrap().contains("disconnect"));
        assert_eq!(adapter.stats().frames_received, 1);
    }
}
