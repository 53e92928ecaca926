// swidget-api: Async Rust client for Swidget devices (REST + WebSocket push + SSDP)

pub mod client;
pub mod error;
pub mod models;
pub mod ssdp;
pub mod transport;
pub mod websocket;

pub use client::DeviceClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{ChannelState, InboundMessage, MessageKind, ReconnectPolicy, StopReason, WebSocketChannel};
