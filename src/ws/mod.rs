//! Transport layer.
//!
//! The channel client depends only on the capability traits in [`traits`]; the
//! concrete socket is chosen by passing a [`Connector`] at construction time.
//!
//! # Adapters
//!
//! - [`WsConnector`]: `tokio-tungstenite` WebSocket, the default
//! - [`memory::MemoryConnector`]: in-process transport driven by a [`memory::MemoryPeer`]

pub mod connection;
pub mod error;
pub mod memory;
pub mod traits;

pub use connection::{WsConnector, WsTransport};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
