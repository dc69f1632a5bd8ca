//! In-process transport with a scriptable far end.
//!
//! [`MemoryChannel`] goes into the engine; the paired [`MemoryRemote`]
//! plays the server: it accepts or refuses connections, delivers frames,
//! hangs up, and records everything the engine transmitted. No socket, no
//! runtime required.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::{Channel, ChannelError, ChannelEvent, ChannelEventKind};

#[derive(Default)]
struct Shared {
    events: Option<mpsc::Sender<ChannelEvent>>,
    generation: u64,
    open: bool,
    sent: Vec<String>,
    opens: usize,
    closes: usize,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine-side half.
pub struct MemoryChannel {
    shared: Arc<Mutex<Shared>>,
}

/// Server-side half.
#[derive(Clone)]
pub struct MemoryRemote {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryChannel {
    pub fn pair() -> (MemoryChannel, MemoryRemote) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            MemoryChannel { shared: shared.clone() },
            MemoryRemote { shared },
        )
    }
}

impl Channel for MemoryChannel {
    fn open(
        &mut self,
        _url: &str,
        generation: u64,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), ChannelError> {
        let mut shared = lock(&self.shared);
        shared.events = Some(events);
        shared.generation = generation;
        shared.open = false;
        shared.opens += 1;
        Ok(())
    }

    fn transmit(&mut self, frame: String) -> Result<(), ChannelError> {
        let mut shared = lock(&self.shared);
        if !shared.open {
            return Err(ChannelError::NotConnected);
        }
        shared.sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        if shared.open {
            shared.closes += 1;
        }
        shared.open = false;
    }
}

impl MemoryRemote {
    fn emit(&self, kind: ChannelEventKind) -> bool {
        let shared = lock(&self.shared);
        let event = ChannelEvent::new(shared.generation, kind);
        match &shared.events {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Complete the pending connection attempt.
    pub fn accept(&self) -> bool {
        lock(&self.shared).open = true;
        self.emit(ChannelEventKind::Opened)
    }

    /// Fail the pending connection attempt.
    pub fn refuse(&self, reason: &str) -> bool {
        lock(&self.shared).open = false;
        self.emit(ChannelEventKind::Failed(reason.to_owned()))
    }

    /// Push one inbound text frame.
    pub fn deliver(&self, frame: impl Into<String>) -> bool {
        self.emit(ChannelEventKind::Frame(frame.into()))
    }

    /// Push an arbitrary event, generation included.
    pub fn deliver_raw(&self, event: ChannelEvent) -> bool {
        let shared = lock(&self.shared);
        match &shared.events {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Orderly close from the server side.
    pub fn hang_up(&self) -> bool {
        lock(&self.shared).open = false;
        self.emit(ChannelEventKind::Closed)
    }

    /// Abrupt transport failure.
    pub fn fail(&self, reason: &str) -> bool {
        lock(&self.shared).open = false;
        self.emit(ChannelEventKind::Failed(reason.to_owned()))
    }

    /// Frames transmitted so far.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.shared).sent.clone()
    }

    /// Frames transmitted so far, clearing the record.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.shared).sent)
    }

    /// Generation of the most recent connection attempt.
    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).open
    }

    pub fn opens(&self) -> usize {
        lock(&self.shared).opens
    }

    pub fn closes(&self) -> usize {
        lock(&self.shared).closes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_without_open_delivers_nothing() {
        let (_channel, remote) = MemoryChannel::pair();
        assert!(!remote.deliver("{}"));
        assert!(!remote.accept());
    }

    #[test]
    fn test_events_carry_generation() {
        let (mut channel, remote) = MemoryChannel::pair();
        let (tx, mut rx) = mpsc::channel(4);
        channel.open("ws://x", 7, tx).unwrap();

        remote.accept();
        remote.deliver("hello");

        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::new(7, ChannelEventKind::Opened));
        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelEvent::new(7, ChannelEventKind::Frame("hello".into()))
        );
        assert_eq!(remote.generation(), 7);
    }

    #[test]
    fn test_transmit_requires_open() {
        let (mut channel, remote) = MemoryChannel::pair();
        let (tx, _rx) = mpsc::channel(4);
        channel.open("ws://x", 1, tx).unwrap();

        assert_eq!(channel.transmit("a".into()), Err(ChannelError::NotConnected));
        remote.accept();
        channel.transmit("b".into()).unwrap();
        assert_eq!(remote.take_sent(), vec!["b".to_string()]);
        assert!(remote.sent().is_empty());
    }

    #[test]
    fn test_close_counts_only_open_connections() {
        let (mut channel, remote) = MemoryChannel::pair();
        channel.close();
        assert_eq!(remote.closes(), 0);

        let (tx, _rx) = mpsc::channel(4);
        channel.open("ws://x", 1, tx).unwrap();
        remote.accept();
        channel.close();
        channel.close();
        assert_eq!(remote.closes(), 1);
    }
}
