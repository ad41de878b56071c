//! Transport sockets to the relay.
//!
//! A socket runs as its own task and talks to the owner only through
//! channels: outbound frames go in via a [`TransportHandle`], lifecycle and
//! inbound frames come back as [`SocketEvent`]s on a shared event queue. The
//! owner therefore sees every socket event in arrival order on one queue.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Identifies one opened socket. Ids are never reused within a process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl SocketId {
    pub fn next(self) -> Self {
        SocketId(self.0 + 1)
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// Something that happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket finished opening
    Opened,
    /// One inbound text frame
    Frame(String),
    /// The socket was closed (by either side)
    Closed,
    /// The socket failed to open or broke
    Error(String),
}

/// A transport event tagged with the socket it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    pub socket: SocketId,
    pub event: TransportEvent,
}

impl SocketEvent {
    pub fn new(socket: SocketId, event: TransportEvent) -> Self {
        Self { socket, event }
    }
}

/// Sending half of the event queue shared by all sockets.
pub type EventSender = mpsc::UnboundedSender<SocketEvent>;

/// Receiving half of the event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<SocketEvent>;

/// Work queued for a socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one text frame
    Text(String),
    /// Close the socket
    Close,
}

/// Owner's handle to an open (or opening) socket.
#[derive(Debug)]
pub struct TransportHandle {
    id: SocketId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportHandle {
    /// Create a handle and the receiver its socket task drains.
    pub fn new(id: SocketId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { id, outbound }, rx)
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Queue a text frame. Fails only if the socket task is gone.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::SocketGone(self.id))
    }

    /// Ask the socket to close. Never fails; a dead socket is already closed.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Opens sockets on behalf of the connection manager.
pub trait Connector {
    /// Start opening a socket to `address`.
    ///
    /// Returns immediately. Completion is reported as [`TransportEvent::Opened`]
    /// or [`TransportEvent::Error`] on `events`, tagged with `id`.
    fn open(
        &mut self,
        id: SocketId,
        address: &str,
        events: EventSender,
    ) -> Result<TransportHandle, TransportError>;
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The socket task has already exited
    SocketGone(SocketId),
    /// The connector refused to open a socket
    Open(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::SocketGone(id) => write!(f, "{id} is no longer running"),
            TransportError::Open(e) => write!(f, "Could not open socket: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// WebSocket connector backed by `tokio-tungstenite`.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &mut self,
        id: SocketId,
        address: &str,
        events: EventSender,
    ) -> Result<TransportHandle, TransportError> {
        let (handle, outbound_rx) = TransportHandle::new(id);
        tokio::spawn(run_socket(id, address.to_string(), outbound_rx, events));
        Ok(handle)
    }
}

async fn run_socket(
    id: SocketId,
    address: String,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(SocketEvent::new(id, event));
    };

    let ws = match connect_async(address.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::warn!(%id, %address, "WebSocket connect failed: {e}");
            emit(TransportEvent::Error(e.to_string()));
            return;
        }
    };
    tracing::debug!(%id, %address, "WebSocket open");
    emit(TransportEvent::Opened);

    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            out = outbound_rx.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        emit(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
                // Handle dropped or explicit close
                Some(Outbound::Close) | None => {
                    let _ = ws_tx.close().await;
                    emit(TransportEvent::Closed);
                    return;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::Frame(text.as_str().to_owned()))
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => emit(TransportEvent::Frame(text)),
                    Err(_) => tracing::warn!(%id, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    emit(TransportEvent::Closed);
                    return;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEvent::Error(e.to_string()));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_queues_in_order() {
        let (handle, mut rx) = TransportHandle::new(SocketId(7));
        handle.send_text("a".to_string()).unwrap();
        handle.close();

        assert_eq!(rx.try_recv().unwrap(), Outbound::Text("a".to_string()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }

    #[test]
    fn test_send_to_dead_socket_fails() {
        let (handle, rx) = TransportHandle::new(SocketId(1));
        drop(rx);
        assert_eq!(
            handle.send_text("x".to_string()),
            Err(TransportError::SocketGone(SocketId(1)))
        );
        // close never panics
        handle.close();
    }

    #[tokio::test]
    async fn test_ws_connector_reports_open_failure() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector;
        let _handle = connector.open(SocketId(3), "not a url", events_tx).unwrap();

        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.socket, SocketId(3));
        assert!(matches!(event.event, TransportEvent::Error(_)));
    }
}
