//! Connection manager: the relay handshake and lifecycle state machine.
//!
//! ```text
//! Disconnected ──start──▶ ConnectingRelay ──opened──▶ RelayConnected
//!                                                          │ request target
//!                                                          ▼
//!                          Live ◀──status connected:true── ConnectingTarget
//! ```
//!
//! Any state other than `Disconnected` drops back to `Disconnected` on
//! `stop()`, a transport close, or a transport error. The manager owns at
//! most one socket at a time and ignores events from sockets it no longer
//! owns.

use crate::feed::{Comment, EventBuffer};
use crate::relay::protocol::{ClientMessage, ProtocolError, RelayMessage};
use crate::relay::transport::{
    Connector, EventSender, SocketEvent, SocketId, TransportError, TransportEvent, TransportHandle,
};
use crate::stats::SharedFeedStats;
use serde::{Deserialize, Serialize};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    ConnectingRelay,
    RelayConnected,
    ConnectingTarget,
    Live,
}

impl ConnectionState {
    /// Whether the relay socket is open (handshake with the relay done).
    pub fn is_relay_open(self) -> bool {
        matches!(
            self,
            ConnectionState::RelayConnected
                | ConnectionState::ConnectingTarget
                | ConnectionState::Live
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::ConnectingRelay => "connecting to relay",
            ConnectionState::RelayConnected => "relay connected",
            ConnectionState::ConnectingTarget => "connecting to target",
            ConnectionState::Live => "live",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What a socket event meant for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Event from a socket this manager no longer owns, or a repeat open
    Ignored,
    /// The relay socket finished opening
    RelayConnected,
    /// A comment was appended to the feed
    CommentIngested { comment: Comment, evicted: bool },
    /// The relay confirmed the bridge to the target is active
    BridgeLive { message: Option<String> },
    /// The relay reported the bridge has ended (informational)
    BridgeEnded { message: Option<String> },
    /// Any other relay status (informational)
    Status { message: Option<String> },
    /// A frame could not be parsed and was dropped
    FrameDiscarded { error: ProtocolError },
    /// The socket closed or failed without being asked to
    Dropped { reason: Option<String> },
}

/// Connection manager errors. None of these change state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Relay address was empty
    EmptyAddress,
    /// Target username was empty
    EmptyUsername,
    /// A socket is already owned; starting again would replace it
    AlreadyConnected(ConnectionState),
    /// The relay socket is not open yet
    NotReady(ConnectionState),
    /// The transport refused the request
    Transport(TransportError),
    /// A control message could not be encoded
    Protocol(ProtocolError),
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::EmptyAddress => write!(f, "Relay address is empty"),
            ConnectError::EmptyUsername => write!(f, "Target username is empty"),
            ConnectError::AlreadyConnected(state) => {
                write!(f, "A connection is already active ({state})")
            }
            ConnectError::NotReady(state) => write!(f, "Relay is not connected yet ({state})"),
            ConnectError::Transport(e) => write!(f, "{e}"),
            ConnectError::Protocol(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConnectError {}

impl From<TransportError> for ConnectError {
    fn from(e: TransportError) -> Self {
        ConnectError::Transport(e)
    }
}

impl From<ProtocolError> for ConnectError {
    fn from(e: ProtocolError) -> Self {
        ConnectError::Protocol(e)
    }
}

/// Owns the relay socket and drives the connection state machine.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    events: EventSender,
    stats: SharedFeedStats,
    state: ConnectionState,
    socket: Option<TransportHandle>,
    last_socket: SocketId,
    target: Option<String>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager whose sockets report on `events`.
    pub fn new(connector: C, events: EventSender, stats: SharedFeedStats) -> Self {
        Self {
            connector,
            events,
            stats,
            state: ConnectionState::Disconnected,
            socket: None,
            last_socket: SocketId(0),
            target: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id of the owned socket, if any.
    pub fn socket_id(&self) -> Option<SocketId> {
        self.socket.as_ref().map(TransportHandle::id)
    }

    /// Target most recently requested on the current socket.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Open a socket to the relay.
    ///
    /// Moves to `ConnectingRelay`; `RelayConnected` follows when the socket
    /// reports it has opened. Rejected if a socket is already owned.
    pub fn start_relay_connection(&mut self, address: &str) -> Result<(), ConnectError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ConnectError::EmptyAddress);
        }
        if self.state != ConnectionState::Disconnected || self.socket.is_some() {
            return Err(ConnectError::AlreadyConnected(self.state));
        }

        let id = self.last_socket.next();
        let handle = self.connector.open(id, address, self.events.clone())?;
        self.last_socket = id;
        self.socket = Some(handle);
        self.state = ConnectionState::ConnectingRelay;
        tracing::info!(socket = %id, %address, "Connecting to relay");
        Ok(())
    }

    /// Ask the relay to bridge to `username`.
    ///
    /// Requires an open relay socket. Moves to `ConnectingTarget`; `Live` is
    /// only reached when the relay confirms the bridge.
    pub fn request_target_connection(&mut self, username: &str) -> Result<(), ConnectError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ConnectError::EmptyUsername);
        }
        let socket = match &self.socket {
            Some(socket) if self.state.is_relay_open() => socket,
            _ => return Err(ConnectError::NotReady(self.state)),
        };

        let frame = ClientMessage::Connect {
            username: username.to_string(),
        }
        .encode()?;
        socket.send_text(frame)?;

        self.target = Some(username.to_string());
        self.state = ConnectionState::ConnectingTarget;
        tracing::info!(target_user = %username, "Requested target bridge");
        Ok(())
    }

    /// Tear down the connection. Safe to call in any state.
    ///
    /// Sends a `disconnect` control message if a socket is owned, then closes
    /// it without waiting for acknowledgment. Returns whether a socket was
    /// owned.
    pub fn stop(&mut self) -> bool {
        let had_socket = match self.socket.take() {
            Some(socket) => {
                if let Ok(frame) = ClientMessage::Disconnect.encode() {
                    if let Err(e) = socket.send_text(frame) {
                        tracing::debug!("Disconnect not sent: {e}");
                    }
                }
                socket.close();
                tracing::info!(socket = %socket.id(), "Connection stopped");
                true
            }
            None => false,
        };

        self.state = ConnectionState::Disconnected;
        self.target = None;
        had_socket
    }

    /// Apply one socket event.
    pub fn handle_event(
        &mut self,
        event: SocketEvent,
        buffer: &mut EventBuffer,
    ) -> ConnectionEvent {
        if self.socket_id() != Some(event.socket) {
            tracing::debug!(socket = %event.socket, "Ignoring event from stale socket");
            return ConnectionEvent::Ignored;
        }

        match event.event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::ConnectingRelay {
                    return ConnectionEvent::Ignored;
                }
                self.state = ConnectionState::RelayConnected;
                tracing::info!(socket = %event.socket, "Relay connected");
                ConnectionEvent::RelayConnected
            }
            TransportEvent::Frame(frame) => self.handle_frame(&frame, buffer),
            TransportEvent::Closed => self.drop_connection(None),
            TransportEvent::Error(e) => self.drop_connection(Some(e)),
        }
    }

    /// Parse and dispatch one inbound frame.
    ///
    /// Malformed frames are logged and dropped; they never affect the socket.
    pub fn handle_frame(&mut self, frame: &str, buffer: &mut EventBuffer) -> ConnectionEvent {
        self.stats.record_frame();

        let message = match RelayMessage::parse(frame) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!("Discarding frame: {error}");
                self.stats.record_discarded();
                return ConnectionEvent::FrameDiscarded { error };
            }
        };

        match message {
            RelayMessage::Comment {
                username,
                nickname,
                comment,
            } => {
                let comment = Comment::ingest(username, nickname, comment);
                tracing::debug!(id = %comment.id, user = %comment.username, "Comment ingested");
                let evicted = buffer.push(comment.clone()).is_some();
                self.stats.record_comment();
                if evicted {
                    self.stats.record_evicted();
                }
                ConnectionEvent::CommentIngested { comment, evicted }
            }
            status @ RelayMessage::Status { .. } => self.handle_status(status),
        }
    }

    fn handle_status(&mut self, status: RelayMessage) -> ConnectionEvent {
        let active = status.is_bridge_active();
        let ended = status.is_bridge_ended();
        let message = match status {
            RelayMessage::Status { message, .. } => message,
            RelayMessage::Comment { .. } => None,
        };

        if active && self.state == ConnectionState::ConnectingTarget {
            self.state = ConnectionState::Live;
            tracing::info!(target_user = ?self.target, "Bridge live");
            return ConnectionEvent::BridgeLive { message };
        }
        if active {
            // Repeats while live, or confirmations nobody asked for
            tracing::debug!(state = %self.state, "Bridge confirmation without effect");
        }
        if ended {
            tracing::info!(target_user = ?self.target, "Bridge ended");
            return ConnectionEvent::BridgeEnded { message };
        }
        ConnectionEvent::Status { message }
    }

    fn drop_connection(&mut self, reason: Option<String>) -> ConnectionEvent {
        match &reason {
            Some(e) => tracing::warn!(state = %self.state, "Relay connection failed: {e}"),
            None => tracing::warn!(state = %self.state, "Relay closed the connection"),
        }
        self.socket = None;
        self.target = None;
        self.state = ConnectionState::Disconnected;
        ConnectionEvent::Dropped { reason }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::relay::transport::Outbound;
    use crate::stats::create_shared_stats;
    use tokio::sync::mpsc;

    /// Connector that hands out in-memory sockets and keeps their outbound queues.
    #[derive(Default)]
    pub(crate) struct MockConnector {
        pub addresses: Vec<String>,
        pub outbound: Vec<mpsc::UnboundedReceiver<Outbound>>,
        pub refuse: bool,
    }

    impl Connector for MockConnector {
        fn open(
            &mut self,
            id: SocketId,
            address: &str,
            _events: EventSender,
        ) -> Result<TransportHandle, TransportError> {
            if self.refuse {
                return Err(TransportError::Open("refused".to_string()));
            }
            let (handle, rx) = TransportHandle::new(id);
            self.addresses.push(address.to_string());
            self.outbound.push(rx);
            Ok(handle)
        }
    }

    impl MockConnector {
        /// Drain everything queued on the most recent socket.
        pub fn drain_last(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            if let Some(rx) = self.outbound.last_mut() {
                while let Ok(item) = rx.try_recv() {
                    out.push(item);
                }
            }
            out
        }
    }

    fn manager() -> ConnectionManager<MockConnector> {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        ConnectionManager::new(MockConnector::default(), events_tx, create_shared_stats())
    }

    fn opened(mgr: &mut ConnectionManager<MockConnector>, buffer: &mut EventBuffer) {
        let id = mgr.socket_id().unwrap();
        assert_eq!(
            mgr.handle_event(SocketEvent::new(id, TransportEvent::Opened), buffer),
            ConnectionEvent::RelayConnected
        );
    }

    fn frame(
        mgr: &mut ConnectionManager<MockConnector>,
        buffer: &mut EventBuffer,
        text: &str,
    ) -> ConnectionEvent {
        let id = mgr.socket_id().unwrap();
        mgr.handle_event(
            SocketEvent::new(id, TransportEvent::Frame(text.to_string())),
            buffer,
        )
    }

    #[test]
    fn test_full_handshake_reaches_live() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();

        mgr.start_relay_connection("ws://localhost:8765").unwrap();
        assert_eq!(mgr.state(), ConnectionState::ConnectingRelay);
        opened(&mut mgr, &mut buffer);
        assert_eq!(mgr.state(), ConnectionState::RelayConnected);

        mgr.request_target_connection("alice").unwrap();
        assert_eq!(mgr.state(), ConnectionState::ConnectingTarget);
        assert_eq!(
            mgr.connector.drain_last(),
            vec![Outbound::Text(
                r#"{"action":"connect","username":"alice"}"#.to_string()
            )]
        );

        let event = frame(&mut mgr, &mut buffer, r#"{"type":"status","connected":true}"#);
        assert_eq!(event, ConnectionEvent::BridgeLive { message: None });
        assert_eq!(mgr.state(), ConnectionState::Live);
        assert_eq!(mgr.connector.addresses, vec!["ws://localhost:8765"]);
    }

    #[test]
    fn test_repeated_bridge_confirmation_is_noop() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();
        mgr.start_relay_connection("ws://relay").unwrap();
        opened(&mut mgr, &mut buffer);
        mgr.request_target_connection("alice").unwrap();
        frame(&mut mgr, &mut buffer, r#"{"type":"status","connected":true}"#);

        let again = frame(&mut mgr, &mut buffer, r#"{"type":"status","connected":true}"#);
        assert_eq!(again, ConnectionEvent::Status { message: None });
        assert_eq!(mgr.state(), ConnectionState::Live);
    }

    #[test]
    fn test_bridge_confirmation_before_target_request_does_not_go_live() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();

        // Disconnected: no socket, so the frame handler sees it directly.
        mgr.handle_frame(r#"{"type":"status","connected":true}"#, &mut buffer);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);

        mgr.start_relay_connection("ws://relay").unwrap();
        opened(&mut mgr, &mut buffer);
        frame(&mut mgr, &mut buffer, r#"{"type":"status","connected":true}"#);
        assert_eq!(mgr.state(), ConnectionState::RelayConnected);
    }

    #[test]
    fn test_empty_address_rejected_without_state_change() {
        let mut mgr = manager();
        assert_eq!(mgr.start_relay_connection("  "), Err(ConnectError::EmptyAddress));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.connector.addresses.is_empty());
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut mgr = manager();
        mgr.start_relay_connection("ws://one").unwrap();
        let first = mgr.socket_id();

        assert_eq!(
            mgr.start_relay_connection("ws://two"),
            Err(ConnectError::AlreadyConnected(ConnectionState::ConnectingRelay))
        );
        assert_eq!(mgr.socket_id(), first);
        assert_eq!(mgr.connector.addresses.len(), 1);
    }

    #[test]
    fn test_refused_open_leaves_disconnected() {
        let mut mgr = manager();
        mgr.connector.refuse = true;
        assert!(matches!(
            mgr.start_relay_connection("ws://relay"),
            Err(ConnectError::Transport(_))
        ));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.socket_id().is_none());
    }

    #[test]
    fn test_target_request_needs_open_relay() {
        let mut mgr = manager();
        assert_eq!(
            mgr.request_target_connection("alice"),
            Err(ConnectError::NotReady(ConnectionState::Disconnected))
        );

        mgr.start_relay_connection("ws://relay").unwrap();
        assert_eq!(
            mgr.request_target_connection("alice"),
            Err(ConnectError::NotReady(ConnectionState::ConnectingRelay))
        );

        let mut buffer = EventBuffer::new();
        opened(&mut mgr, &mut buffer);
        assert_eq!(mgr.request_target_connection(""), Err(ConnectError::EmptyUsername));
        assert_eq!(mgr.state(), ConnectionState::RelayConnected);
    }

    #[test]
    fn test_malformed_frame_is_discarded() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();
        mgr.start_relay_connection("ws://relay").unwrap();
        opened(&mut mgr, &mut buffer);

        let event = frame(&mut mgr, &mut buffer, "not-json");
        assert!(matches!(event, ConnectionEvent::FrameDiscarded { .. }));
        assert_eq!(buffer.len(), 0);
        assert_eq!(mgr.state(), ConnectionState::RelayConnected);
        assert!(mgr.socket_id().is_some());
        assert_eq!(mgr.stats.stats().frames_discarded, 1);
    }

    #[test]
    fn test_comment_frames_fill_buffer() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();
        mgr.start_relay_connection("ws://relay").unwrap();
        opened(&mut mgr, &mut buffer);

        frame(
            &mut mgr,
            &mut buffer,
            r#"{"type":"comment","username":"a","comment":"one"}"#,
        );
        let event = frame(&mut mgr, &mut buffer, r#"{"type":"comment"}"#);

        match event {
            ConnectionEvent::CommentIngested { comment, evicted } => {
                assert_eq!(comment.username, "unknown");
                assert_eq!(comment.nickname, "Anonymous");
                assert_eq!(comment.text, "");
                assert!(!evicted);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest().unwrap().username, "unknown");
    }

    #[test]
    fn test_bridge_ended_is_informational() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();
        mgr.start_relay_connection("ws://relay").unwrap();
        opened(&mut mgr, &mut buffer);
        mgr.request_target_connection("alice").unwrap();
        frame(&mut mgr, &mut buffer, r#"{"type":"status","connected":true}"#);

        let event = frame(
            &mut mgr,
            &mut buffer,
            r#"{"type":"status","message":"Livestream ended","connected":false}"#,
        );
        assert_eq!(
            event,
            ConnectionEvent::BridgeEnded {
                message: Some("Livestream ended".to_string())
            }
        );
        assert_eq!(mgr.state(), ConnectionState::Live);
    }

    #[test]
    fn test_transport_close_drops_to_disconnected() {
        for state_setup in 0..3 {
            let mut mgr = manager();
            let mut buffer = EventBuffer::new();
            mgr.start_relay_connection("ws://relay").unwrap();
            if state_setup >= 1 {
                opened(&mut mgr, &mut buffer);
            }
            if state_setup >= 2 {
                mgr.request_target_connection("alice").unwrap();
            }
            let id = mgr.socket_id().unwrap();

            let event = mgr.handle_event(
                SocketEvent::new(id, TransportEvent::Error("reset".to_string())),
                &mut buffer,
            );
            assert_eq!(
                event,
                ConnectionEvent::Dropped {
                    reason: Some("reset".to_string())
                }
            );
            assert_eq!(mgr.state(), ConnectionState::Disconnected);
            assert!(mgr.socket_id().is_none());
        }
    }

    #[test]
    fn test_stop_sends_disconnect_then_closes() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();
        mgr.start_relay_connection("ws://relay").unwrap();
        opened(&mut mgr, &mut buffer);

        assert!(mgr.stop());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(
            mgr.connector.drain_last(),
            vec![
                Outbound::Text(r#"{"action":"disconnect"}"#.to_string()),
                Outbound::Close
            ]
        );

        // Idempotent and safe without a socket
        assert!(!mgr.stop());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stale_socket_events_are_ignored() {
        let mut mgr = manager();
        let mut buffer = EventBuffer::new();
        mgr.start_relay_connection("ws://relay").unwrap();
        let old = mgr.socket_id().unwrap();
        mgr.stop();

        mgr.start_relay_connection("ws://relay").unwrap();
        opened(&mut mgr, &mut buffer);
        let new = mgr.socket_id().unwrap();
        assert_ne!(old, new);

        let late_close =
            mgr.handle_event(SocketEvent::new(old, TransportEvent::Closed), &mut buffer);
        assert_eq!(late_close, ConnectionEvent::Ignored);
        assert_eq!(mgr.state(), ConnectionState::RelayConnected);

        let late_frame = mgr.handle_event(
            SocketEvent::new(old, TransportEvent::Frame(r#"{"type":"comment"}"#.to_string())),
            &mut buffer,
        );
        assert_eq!(late_frame, ConnectionEvent::Ignored);
        assert!(buffer.is_empty());
    }
}
