// ticketwire-api: Async transport for the ticketwire realtime layer (WebSocket link + REST fallback)

pub mod error;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use rest::{AgentStatus, RestClient, StateSnapshot};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{
    LinkEvent, LinkHandle, LinkState, ReconnectConfig, WebSocketLink, WireCommand, WireEvent,
};
