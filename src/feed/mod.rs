#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Channel client for the Fenix trade pipeline.
//!
//! The feed exposes three kinds of trade channel:
//!
//! - **Trades by market** (`trades/market/<market>`)
//! - **Trades by exchange** (`trades/exchange/<exchange>`)
//! - **All trades** (`trades/all`)
//!
//! # Example
//!
//! ```rust, no_run
//! use std::time::Duration;
//!
//! use fenix_pipeline_sdk::feed::{Client, SubscriptionKind, Trade};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new("my-api-key");
//!
//!     client.on_message(|frame| {
//!         if let Some(trade) = Trade::from_frame(frame) {
//!             println!("{trade}: {} @ {}", trade.quantity, trade.price);
//!         }
//!     });
//!     client.on_error(|error| eprintln!("feed error: {error}"));
//!
//!     client.connect()?;
//!     // Queued until the socket opens
//!     client.subscribe(SubscriptionKind::AllTrades, None)?;
//!
//!     tokio::time::sleep(Duration::from_secs(30)).await;
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod events;
pub mod subscription;
pub mod types;

// Re-export commonly used types
pub use client::Client;
pub use config::Config;
pub use events::ClientEvent;
pub use subscription::{Subscription, SubscriptionKind, channel_name};
pub use types::request::{ChannelRequest, RequestAction};
pub use types::response::{Trade, frame_type, parse_frame};
