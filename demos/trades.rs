//! Trade feed harness.
//!
//! Connects, subscribes to each configured channel, logs every frame for a while,
//! then unsubscribes and closes.
//!
//! Environment:
//! - `FENIX_API_KEY`: access key (empty if unset)
//! - `LOCAL_ONLY`: `true` (default) connects to `ws://localhost:8765`, `false` to production
//! - `DURATION`: seconds to stay subscribed, default 3
//! - `SUBSCRIPTIONS`: `/`-separated `kind:name` list, default `trades_by_market:btc-usdt`
//!
//! ```sh
//! RUST_LOG=info cargo run --example trades --features tracing
//! ```

use std::env;
use std::str::FromStr as _;
use std::time::Duration;

use fenix_pipeline_sdk::feed::{Client, ClientEvent, Subscription, Trade};
use fenix_pipeline_sdk::{API_KEY_VAR, DEFAULT_URI};
use futures::StreamExt as _;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

const LOCAL_URI: &str = "ws://localhost:8765";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let api_key = env::var(API_KEY_VAR).unwrap_or_default();
    let local_only = env::var("LOCAL_ONLY").map_or(true, |v| !v.eq_ignore_ascii_case("false"));
    let duration = env::var("DURATION")
        .ok()
        .map(|v| v.parse::<u64>())
        .transpose()?
        .unwrap_or(3);
    let subscriptions = env::var("SUBSCRIPTIONS")
        .unwrap_or_else(|_| "trades_by_market:btc-usdt".to_owned())
        .split('/')
        .filter(|s| !s.is_empty())
        .map(Subscription::from_str)
        .collect::<Result<Vec<_>, _>>()?;

    let client = Client::new(&api_key);
    client.set_uri(if local_only { LOCAL_URI } else { DEFAULT_URI });
    info!(uri = %client.uri(), subscriptions = subscriptions.len(), "starting");

    let mut events = Box::pin(client.events());
    client.connect()?;
    for subscription in &subscriptions {
        client.subscribe_to(subscription)?;
        info!(channel = %subscription, "subscribe queued");
    }

    let deadline = Instant::now() + Duration::from_secs(duration);
    while let Ok(Some(event)) = timeout_at(deadline, events.next()).await {
        match event {
            Ok(ClientEvent::Connect) => info!("connected"),
            Ok(ClientEvent::Message(frame)) => match Trade::from_frame(&frame) {
                Some(trade) => info!(
                    %trade,
                    price = %trade.price,
                    quantity = %trade.quantity,
                    direction = %trade.direction
                ),
                None => debug!(%frame, "frame"),
            },
            Ok(ClientEvent::Error(e)) => warn!(error = %e),
            Ok(ClientEvent::Close) => {
                info!("connection closed");
                break;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "event stream ended"),
        }
    }

    if client.is_connected() {
        for subscription in &subscriptions {
            client.unsubscribe_from(subscription)?;
        }
        client.close();
        if let Ok(Some(Ok(ClientEvent::Close))) =
            tokio::time::timeout(Duration::from_secs(2), events.next()).await
        {
            info!("closed");
        }
    }

    Ok(())
}
