#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Error parsing an inbound frame, or the payload embedded in a `data` frame
    MessageParse(serde_json::Error),
    /// WebSocket connection was closed
    ConnectionClosed,
    /// Received an invalid or unexpected message
    InvalidMessage(String),
    /// Event stream lagged and missed events
    Lagged {
        /// Number of events that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::InvalidMessage(msg) => write!(f, "Invalid WebSocket message: {msg}"),
            Self::Lagged { count } => write!(f, "Event stream lagged, missed {count} events"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Kind};

    #[test]
    fn parse_error_converts_to_websocket_kind() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = WsError::MessageParse(parse).into();

        assert_eq!(error.kind(), Kind::WebSocket);
        assert!(matches!(
            error.downcast_ref::<WsError>(),
            Some(WsError::MessageParse(_))
        ));
    }

    #[test]
    fn lagged_display() {
        assert_eq!(
            WsError::Lagged { count: 3 }.to_string(),
            "Event stream lagged, missed 3 events"
        );
    }
}
