#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use bon::Builder;

use crate::DEFAULT_URI;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for the channel client.
///
/// ```rust
/// use fenix_pipeline_sdk::feed::Config;
///
/// let config = Config::builder().uri("ws://localhost:8765").build();
/// assert_eq!(config.uri, "ws://localhost:8765");
/// assert_eq!(config.event_capacity, 1024);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Base URI; the API version and access key are appended as query parameters on connect
    #[builder(into, default = DEFAULT_URI.to_owned())]
    pub uri: String,
    /// Events buffered per [`events`](super::Client::events) stream before it lags
    #[builder(default = DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uri_is_production_endpoint() {
        let config = Config::default();
        assert_eq!(config.uri, "wss://api.fenixblockchain.com/ws");
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }
}
