//! Re-exported types from external crates for convenience.
//!
//! These types are commonly used in this SDK and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Arbitrary precision decimal type for trade prices and quantities.
pub use rust_decimal::Decimal;
/// Macro for creating [`Decimal`] literals at compile time.
///
/// # Example
/// ```
/// use fenix_pipeline_sdk::types::dec;
/// let price = dec!(3650.5);
/// ```
pub use rust_decimal_macros::dec;
/// Secret string type that redacts the access key in debug output.
pub use secrecy::SecretString;
/// Decoded JSON frame as delivered to `message` listeners.
pub use serde_json::Value;
