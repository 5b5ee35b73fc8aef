#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod feed;
pub mod types;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Production endpoint of the trade pipeline
pub const DEFAULT_URI: &str = "wss://api.fenixblockchain.com/ws";

/// Protocol version sent as the `api-version` query parameter
pub const API_VERSION: &str = "beta";

/// Environment variable conventionally holding the access key
pub const API_KEY_VAR: &str = "FENIX_API_KEY";
