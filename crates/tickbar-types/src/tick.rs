//! Tick data representation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::TickError;

/// A single trade tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument symbol (e.g., "AAPL").
    pub symbol: String,
    /// Trade price, always positive.
    pub price: Decimal,
    /// Traded volume.
    pub volume: u64,
    /// Time of the trade (UTC).
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// Creates a new tick.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        volume: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
        }
    }

    /// Checks the tick against the field constraints of the feed contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is blank or the price is not positive.
    pub fn validate(&self) -> Result<(), TickError> {
        if self.symbol.trim().is_empty() {
            return Err(TickError::EmptySymbol);
        }
        if self.price <= Decimal::ZERO {
            return Err(TickError::NonPositivePrice {
                symbol: self.symbol.clone(),
                price: self.price,
            });
        }
        Ok(())
    }

    /// Decodes and validates a single JSON tick message.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not valid JSON or the message is malformed.
    pub fn from_json(line: &str) -> Result<Self, TickError> {
        let message: TickMessage =
            serde_json::from_str(line).map_err(|e| TickError::Decode(e.to_string()))?;
        message.validate()
    }
}

/// Timestamp as it may appear in a feed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TickTimestamp {
    /// RFC 3339 timestamp string.
    Rfc3339(DateTime<Utc>),
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
}

impl TickTimestamp {
    /// Converts to a UTC timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if epoch milliseconds are out of range.
    pub fn to_datetime(self) -> Result<DateTime<Utc>, TickError> {
        match self {
            Self::Rfc3339(dt) => Ok(dt),
            Self::EpochMillis(ms) => {
                DateTime::from_timestamp_millis(ms).ok_or(TickError::InvalidTimestamp(ms))
            }
        }
    }
}

/// Raw tick message as delivered by an ingestion feed, before validation.
///
/// Every field is optional so that absent fields surface as
/// [`TickError::MissingField`] instead of an opaque decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMessage {
    /// Instrument symbol.
    pub symbol: Option<String>,
    /// Trade price.
    pub price: Option<Decimal>,
    /// Traded volume (signed so negative values can be rejected explicitly).
    pub volume: Option<i64>,
    /// Trade time.
    pub timestamp: Option<TickTimestamp>,
}

impl TickMessage {
    /// Validates the message and converts it into a [`Tick`].
    ///
    /// # Errors
    ///
    /// Returns an error describing the first constraint the message violates.
    pub fn validate(self) -> Result<Tick, TickError> {
        let symbol = self.symbol.ok_or(TickError::MissingField("symbol"))?;
        let price = self.price.ok_or(TickError::MissingField("price"))?;
        let volume = self.volume.ok_or(TickError::MissingField("volume"))?;
        let timestamp = self
            .timestamp
            .ok_or(TickError::MissingField("timestamp"))?
            .to_datetime()?;

        let symbol = symbol.trim().to_string();
        let volume = u64::try_from(volume).map_err(|_| TickError::NegativeVolume {
            symbol: symbol.clone(),
            volume,
        })?;

        let tick = Tick::new(symbol, price, volume, timestamp);
        tick.validate()?;
        Ok(tick)
    }
}

impl TryFrom<TickMessage> for Tick {
    type Error = TickError;

    fn try_from(message: TickMessage) -> Result<Self, Self::Error> {
        message.validate()
    }
}
