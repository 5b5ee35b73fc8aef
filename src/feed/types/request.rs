use serde::Serialize;
use strum_macros::Display;

/// Request verb sent to the feed.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestAction {
    Subscribe,
    Unsubscribe,
}

/// Outbound request for a single channel.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelRequest {
    pub request: RequestAction,
    /// Channel name, e.g. `trades/market/btc-usdt`
    pub channel: String,
}

impl ChannelRequest {
    #[must_use]
    pub fn subscribe(channel: String) -> Self {
        Self {
            request: RequestAction::Subscribe,
            channel,
        }
    }

    #[must_use]
    pub fn unsubscribe(channel: String) -> Self {
        Self {
            request: RequestAction::Unsubscribe,
            channel,
        }
    }
}
