//! Store records for Things, Colonies and trade counters.
//!
//! Metadata hashes hold one JSON-encoded value per field. Strings written
//! by other tools may be stored unquoted, so decoding tries JSON first and
//! falls back to the raw text.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::{BmvVotes, Colony, Thing, TradeHistory};
use crate::error::{MarketError, Result};

/// Decodes a metadata hash into a record type.
///
/// # Errors
///
/// Returns [`MarketError::Json`] if a required field is missing or has the
/// wrong type.
pub fn decode_fields<T: DeserializeOwned>(fields: &HashMap<String, String>) -> Result<T> {
    let object: Map<String, Value> = fields
        .iter()
        .map(|(name, raw)| {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            (name.clone(), value)
        })
        .collect();
    Ok(serde_json::from_value(Value::Object(object))?)
}

/// Encodes a record as `(field, value)` pairs for a metadata hash.
///
/// # Errors
///
/// Returns [`MarketError::Store`] if the record does not serialize to an
/// object.
pub fn encode_fields<T: Serialize>(record: &T) -> Result<Vec<(String, String)>> {
    match serde_json::to_value(record)? {
        Value::Object(object) => object
            .into_iter()
            .map(|(name, value)| Ok((name, serde_json::to_string(&value)?)))
            .collect(),
        other => Err(MarketError::Store(format!(
            "record encodes to {other}, expected an object"
        ))),
    }
}

/// Accepts integers stored as JSON floats (`12.0`).
fn lenient_integer<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value.trunc() as i64)
}

/// Persisted Thing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThingRecord {
    /// Canonical full name.
    #[serde(rename = "FullName")]
    pub name: String,
    /// Base market value.
    #[serde(default)]
    pub base_market_value: f64,
    /// Server pricing flag.
    #[serde(default)]
    pub use_server_price: bool,
    /// Buy quote.
    #[serde(default)]
    pub current_buy_price: f64,
    /// Sell quote.
    #[serde(default)]
    pub current_sell_price: f64,
    /// Sale buy quote.
    #[serde(default)]
    pub buy_price_override: f64,
    /// Sale sell quote.
    #[serde(default)]
    pub sell_price_override: f64,
    /// Units in stock.
    #[serde(default, deserialize_with = "lenient_integer")]
    pub quantity: i64,
}

impl ThingRecord {
    /// Combines the record with its votes and trade counters.
    #[must_use]
    pub fn into_thing(self, hash: &str, votes: BmvVotes, trades: TradeHistory) -> Thing {
        Thing {
            hash: hash.to_string(),
            name: self.name,
            base_market_value: self.base_market_value,
            use_server_price: self.use_server_price,
            current_buy_price: self.current_buy_price,
            current_sell_price: self.current_sell_price,
            buy_price_override: self.buy_price_override,
            sell_price_override: self.sell_price_override,
            quantity: self.quantity,
            bmv_votes: votes,
            trade_history: trades,
        }
    }
}

impl From<&Thing> for ThingRecord {
    fn from(thing: &Thing) -> Self {
        Self {
            name: thing.name.clone(),
            base_market_value: thing.base_market_value,
            use_server_price: thing.use_server_price,
            current_buy_price: thing.current_buy_price,
            current_sell_price: thing.current_sell_price,
            buy_price_override: thing.buy_price_override,
            sell_price_override: thing.sell_price_override,
            quantity: thing.quantity,
        }
    }
}

/// One day of trade counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TradeRecord {
    /// Units sold to players.
    #[serde(default, deserialize_with = "lenient_integer")]
    pub to_player: i64,
    /// Units bought from players.
    #[serde(default, deserialize_with = "lenient_integer")]
    pub to_trading_post: i64,
}

impl From<TradeRecord> for TradeHistory {
    fn from(record: TradeRecord) -> Self {
        Self {
            to_player: record.to_player,
            to_trading_post: record.to_trading_post,
        }
    }
}

/// Decodes a Colony metadata hash.
///
/// # Errors
///
/// Returns [`MarketError::Json`] if a name field is missing.
pub fn decode_colony(hash: &str, fields: &HashMap<String, String>) -> Result<Colony> {
    let mut colony: Colony = decode_fields(fields)?;
    colony.hash = hash.to_string();
    Ok(colony)
}
