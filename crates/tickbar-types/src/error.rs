//! Error types for tickbar core types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons a tick message is rejected as malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickError {
    /// A required field is absent from the message.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// The symbol is empty or whitespace.
    #[error("Empty symbol")]
    EmptySymbol,

    /// The price is zero or negative.
    #[error("Non-positive price {price} for {symbol}")]
    NonPositivePrice {
        /// Symbol the tick was reported for.
        symbol: String,
        /// The offending price.
        price: Decimal,
    },

    /// The volume is negative.
    #[error("Negative volume {volume} for {symbol}")]
    NegativeVolume {
        /// Symbol the tick was reported for.
        symbol: String,
        /// The offending volume.
        volume: i64,
    },

    /// Epoch timestamp outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// The message could not be decoded at all.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Error for invalid interval configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// Interval size is zero or negative.
    #[error("Interval size must be positive, got {0}s")]
    NonPositive(i64),

    /// Interval size is positive but not one of the supported sizes.
    #[error("Unsupported interval size {0}s, expected one of: 1, 60, 300, 900, 1800, 3600, 14400, 86400")]
    Unsupported(i64),

    /// Interval string could not be parsed.
    #[error("invalid interval '{0}', expected one of: s1, m1, m5, m15, m30, h1, h4, d1")]
    Parse(String),
}
