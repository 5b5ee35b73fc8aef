use std::fmt;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::types::Decimal;
use crate::ws::WsError;

/// `type` of frames whose `message.data` carries a JSON-encoded payload.
pub const DATA_FRAME_TYPE: &str = "data";

/// Returns the frame's `type` field, if it has a string one.
#[must_use]
pub fn frame_type(frame: &Value) -> Option<&str> {
    frame.get("type")?.as_str()
}

/// Decodes an inbound frame.
///
/// `data` frames have their `message.data` string decoded in place, so
/// `{"type":"data","message":{"data":"{\"x\":1}"}}` becomes
/// `{"type":"data","message":{"data":{"x":1}}}`. Other frames are returned as parsed.
///
/// # Errors
///
/// [`WsError::MessageParse`] if the frame or its embedded payload is not valid JSON,
/// [`WsError::InvalidMessage`] if a `data` frame has no string `message.data`.
pub fn parse_frame(text: &str) -> Result<Value> {
    let mut frame: Value = serde_json::from_str(text).map_err(WsError::MessageParse)?;

    if frame_type(&frame) == Some(DATA_FRAME_TYPE) {
        let slot = frame
            .pointer_mut("/message/data")
            .ok_or_else(|| WsError::InvalidMessage("data frame without message.data".to_owned()))?;
        let Value::String(raw) = &*slot else {
            return Err(WsError::InvalidMessage(
                "message.data is not a JSON-encoded string".to_owned(),
            )
            .into());
        };
        let data: Value = serde_json::from_str(raw.as_str()).map_err(WsError::MessageParse)?;
        *slot = data;
    }

    Ok(frame)
}

/// A single trade reported on a trade channel.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Builder)]
pub struct Trade {
    /// Unix timestamp in seconds, with fractional part
    pub timestamp: f64,
    pub exchange: String,
    pub market: String,
    /// Exchange-assigned trade identifier
    pub euid: String,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Aggressor side as reported by the exchange (e.g. `buy`, `sell`)
    pub direction: String,
}

impl Trade {
    /// Extracts the trade carried by a decoded `data` frame.
    ///
    /// Returns `None` for any other frame, or if the payload is not a trade.
    #[must_use]
    pub fn from_frame(frame: &Value) -> Option<Self> {
        if frame_type(frame) != Some(DATA_FRAME_TYPE) {
            return None;
        }
        serde_json::from_value(frame.pointer("/message/data")?.clone()).ok()
    }

    /// Identity of the trade across the feed: `exchange:market:euid`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.exchange, self.market, self.euid)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trade(id={})", self.key())
    }
}
