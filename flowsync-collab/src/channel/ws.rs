//! WebSocket transport over tokio-tungstenite.
//!
//! `open` spawns a connection task on the current tokio runtime. The task
//! connects, then forwards queued outbound frames to the socket from a
//! writer task while it reads inbound text frames and reports them on the
//! event channel. Dropping the outbound sender (on `close`) ends the writer,
//! which closes the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{Channel, ChannelError, ChannelEvent, ChannelEventKind};

/// Default bound on frames queued for the writer task.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// WebSocket client transport.
pub struct WsChannel {
    outbound_capacity: usize,
    outgoing_tx: Option<mpsc::Sender<String>>,
    task: Option<JoinHandle<()>>,
}

impl WsChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(outbound_capacity: usize) -> Self {
        Self {
            outbound_capacity: outbound_capacity.max(1),
            outgoing_tx: None,
            task: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.outgoing_tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl Default for WsChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for WsChannel {
    fn open(
        &mut self,
        url: &str,
        generation: u64,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), ChannelError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChannelError::Open(e.to_string()))?;

        self.close();

        let (out_tx, out_rx) = mpsc::channel::<String>(self.outbound_capacity);
        self.outgoing_tx = Some(out_tx);
        self.task = Some(runtime.spawn(run_connection(url.to_owned(), generation, events, out_rx)));
        Ok(())
    }

    fn transmit(&mut self, frame: String) -> Result<(), ChannelError> {
        let tx = self.outgoing_tx.as_ref().ok_or(ChannelError::NotConnected)?;
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    fn close(&mut self) {
        // Dropping the sender lets the writer flush and close the socket.
        self.outgoing_tx = None;
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                log::debug!("Detaching connection task");
            }
        }
    }
}

async fn run_connection(
    url: String,
    generation: u64,
    events: mpsc::Sender<ChannelEvent>,
    mut out_rx: mpsc::Receiver<String>,
) {
    let report = |kind| ChannelEvent::new(generation, kind);

    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            let _ = events.send(report(ChannelEventKind::Failed(e.to_string()))).await;
            return;
        }
    };

    let (mut ws_writer, mut ws_reader) = ws_stream.split();
    if events.send(report(ChannelEventKind::Opened)).await.is_err() {
        return;
    }

    // Writer task: forward outgoing channel to WebSocket
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = ws_writer.send(Message::Text(frame.into())).await {
                log::warn!("WebSocket write failed: {e}");
                return;
            }
        }
        let _ = ws_writer.close().await;
    });

    let outcome = loop {
        match ws_reader.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame = report(ChannelEventKind::Frame(text.as_str().to_owned()));
                if events.send(frame).await.is_err() {
                    // Nobody is listening any more.
                    writer.abort();
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                log::debug!("Server closed connection: {frame:?}");
                break ChannelEventKind::Closed;
            }
            Some(Ok(Message::Binary(data))) => {
                log::debug!("Ignoring {}-byte binary frame", data.len());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break ChannelEventKind::Failed(e.to_string()),
            None => break ChannelEventKind::Closed,
        }
    };

    writer.abort();
    let _ = events.send(report(outcome)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_outside_runtime_fails() {
        let mut channel = WsChannel::new();
        let (tx, _rx) = mpsc::channel(1);
        let err = channel.open("ws://127.0.0.1:9/ws", 1, tx).unwrap_err();
        assert!(matches!(err, ChannelError::Open(_)));
        assert!(!channel.is_open());
    }

    #[test]
    fn test_transmit_before_open() {
        let mut channel = WsChannel::new();
        assert_eq!(channel.transmit("{}".into()), Err(ChannelError::NotConnected));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut channel = WsChannel::new();
        let (tx, mut rx) = mpsc::channel(4);
        channel.open(&format!("ws://{addr}/ws"), 3, tx).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation, 3);
        assert!(matches!(event.kind, ChannelEventKind::Failed(_)));
    }

    #[tokio::test]
    async fn test_backpressure_when_writer_stalls() {
        // Accepts TCP but never answers the handshake, so the queue never drains.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut channel = WsChannel::with_capacity(1);
        let (tx, _rx) = mpsc::channel(1);
        channel.open(&format!("ws://{addr}/ws"), 1, tx).unwrap();

        channel.transmit("a".into()).unwrap();
        assert_eq!(channel.transmit("b".into()), Err(ChannelError::Backpressure));
        channel.close();
        assert!(!channel.is_open());
    }
}
