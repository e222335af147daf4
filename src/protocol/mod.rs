//! VTube Studio plugin protocol: message codec, transports and the session client

pub mod client;
pub mod messages;
pub mod transport;
#[cfg(feature = "ws")]
pub mod ws;

pub use client::{
    ClientEvent, ConnectionState, MemoryTokenStore, Session, TokenStore, VtsClient,
};
pub use messages::{Inbound, InjectedValue, MessageType, PluginInfo};
pub use transport::{MemoryTransport, Transport, TransportEvent};
#[cfg(feature = "ws")]
pub use ws::WsTransport;
