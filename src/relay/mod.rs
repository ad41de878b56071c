//! Everything that talks to the relay: wire protocol, sockets, and the
//! connection state machine.

pub mod connection;
pub mod protocol;
pub mod transport;

#[cfg(feature = "simulator")]
pub mod simulator;

// Re-export commonly used types
pub use connection::{ConnectError, ConnectionEvent, ConnectionManager, ConnectionState};
pub use protocol::{ClientMessage, ProtocolError, RelayMessage};
pub use transport::{
    Connector, EventReceiver, EventSender, Outbound, SocketEvent, SocketId, TransportError,
    TransportEvent, TransportHandle, WsConnector,
};

#[cfg(feature = "simulator")]
pub use simulator::{SimulatedConnector, SimulatorConfig};
