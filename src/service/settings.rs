//! Per-market runtime settings.
//!
//! Settings live in the market's [`keys::SETTINGS`] hash so operators can
//! tune a running market. [`bootstrap`] seeds missing fields with defaults
//! and never overwrites a value that is already present; [`MarketSettings::load`]
//! re-reads them at the start of every pass.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use crate::domain::BracketTable;
use crate::error::{MarketError, Result};
use crate::persistence::{Batch, Store, keys};
use crate::service::pricing::PricingSettings;

/// Settings hash field names.
pub mod fields {
    /// UTC hour the maintenance window opens.
    pub const START_HOUR: &str = "StartHour";
    /// Window length in seconds.
    pub const WINDOW_LENGTH: &str = "WindowLength";
    /// How long before the window it is announced, in seconds.
    pub const PREAMBLE: &str = "Preamble";
    /// Epoch second of the next cycle.
    pub const NEXT_RUN_AT: &str = "NextRunAt";
    /// Whether the upcoming window is already announced.
    pub const WINDOW_SCHEDULED: &str = "WindowScheduled";
    /// Initial buy markup on BMV.
    pub const BUY_MARKUP: &str = "BuyMarkup";
    /// Initial sell price as a fraction of the buy price.
    pub const SELL_MARKUP_FRACTION: &str = "SellMarkupFraction";
    /// Sell price floor as a multiple of BMV.
    pub const MIN_SELL_MULTIPLIER: &str = "MinSellMultiplier";
    /// JSON list of Thing hashes the engine never touches.
    pub const EXCLUDED_THINGS: &str = "ExcludedThings";
    /// JSON bracket table.
    pub const PRICE_BRACKETS: &str = "PriceBrackets";
}

/// Things excluded from every pass on a fresh market.
pub const DEFAULT_EXCLUDED_THINGS: [&str; 2] = [
    "8697f432058b914ba2b20c5bd6f0678548126e21",
    "cdf9187a28bcb1b219a3a4aeaf3c99a65e7eb882",
];

/// Language every market knows.
pub const DEFAULT_LANGUAGE: &str = "english";

/// Runtime settings of one market.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSettings {
    /// UTC hour the maintenance window opens.
    pub start_hour: u32,
    /// Window length in seconds.
    pub window_length_secs: i64,
    /// Announcement lead time in seconds.
    pub preamble_secs: i64,
    /// Epoch second of the next cycle.
    pub next_run_at: i64,
    /// Whether the upcoming window is already announced.
    pub window_already_scheduled: bool,
    /// Pricing knobs.
    pub pricing: PricingSettings,
    /// Things the engine never touches.
    pub excluded_things: BTreeSet<String>,
    /// Price/stock brackets.
    pub brackets: BracketTable,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            start_hour: 23,
            window_length_secs: 3600,
            preamble_secs: 7200,
            next_run_at: 0,
            window_already_scheduled: false,
            pricing: PricingSettings::default(),
            excluded_things: DEFAULT_EXCLUDED_THINGS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            brackets: BracketTable::default(),
        }
    }
}

fn invalid(field: &str, value: Option<&String>) -> MarketError {
    MarketError::InvalidSetting {
        field: field.to_string(),
        value: value.cloned(),
    }
}

fn parse_field<T: FromStr>(raw: &HashMap<String, String>, field: &str) -> Result<T> {
    let value = raw.get(field);
    value
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| invalid(field, value))
}

fn parse_flag(raw: &HashMap<String, String>, field: &str) -> Result<bool> {
    let value = raw.get(field);
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        _ => Err(invalid(field, value)),
    }
}

impl MarketSettings {
    /// Reads and validates the settings hash.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidSetting`] for a missing or unparsable
    /// field, [`MarketError::InvalidBrackets`] if the bracket table fails
    /// validation, or a store error if the read fails.
    pub async fn load<S: Store>(store: &S) -> Result<Self> {
        let raw = store.hash_get_all(keys::SETTINGS).await?;
        Self::from_fields(&raw)
    }

    /// Parses settings from raw hash fields.
    ///
    /// # Errors
    ///
    /// See [`MarketSettings::load`].
    pub fn from_fields(raw: &HashMap<String, String>) -> Result<Self> {
        let start_hour: u32 = parse_field(raw, fields::START_HOUR)?;
        if start_hour > 23 {
            return Err(invalid(fields::START_HOUR, raw.get(fields::START_HOUR)));
        }
        let window_length_secs: i64 = parse_field(raw, fields::WINDOW_LENGTH)?;
        if window_length_secs <= 0 {
            return Err(invalid(fields::WINDOW_LENGTH, raw.get(fields::WINDOW_LENGTH)));
        }
        let excluded_raw = raw.get(fields::EXCLUDED_THINGS);
        let excluded_things: BTreeSet<String> = excluded_raw
            .and_then(|v| serde_json::from_str(v).ok())
            .ok_or_else(|| invalid(fields::EXCLUDED_THINGS, excluded_raw))?;
        let brackets = BracketTable::from_json(
            raw.get(fields::PRICE_BRACKETS)
                .ok_or_else(|| invalid(fields::PRICE_BRACKETS, None))?,
        )?;

        Ok(Self {
            start_hour,
            window_length_secs,
            preamble_secs: parse_field(raw, fields::PREAMBLE)?,
            next_run_at: parse_field(raw, fields::NEXT_RUN_AT)?,
            window_already_scheduled: parse_flag(raw, fields::WINDOW_SCHEDULED)?,
            pricing: PricingSettings {
                buy_markup: parse_field(raw, fields::BUY_MARKUP)?,
                sell_markup_fraction: parse_field(raw, fields::SELL_MARKUP_FRACTION)?,
                min_sell_multiplier: parse_field(raw, fields::MIN_SELL_MULTIPLIER)?,
            },
            excluded_things,
            brackets,
        })
    }
}

/// Seeds every missing setting, the known-language set and the run-lock.
///
/// Existing values are left untouched.
///
/// # Errors
///
/// Returns an encoding error if the defaults cannot be serialized, or a
/// store error if the write fails.
pub async fn bootstrap<S: Store>(store: &S) -> Result<()> {
    let defaults = MarketSettings::default();
    let excluded: Vec<&String> = defaults.excluded_things.iter().collect();
    let seed = [
        (fields::START_HOUR, defaults.start_hour.to_string()),
        (fields::WINDOW_LENGTH, defaults.window_length_secs.to_string()),
        (fields::PREAMBLE, defaults.preamble_secs.to_string()),
        (fields::NEXT_RUN_AT, defaults.next_run_at.to_string()),
        (fields::WINDOW_SCHEDULED, "false".to_string()),
        (fields::BUY_MARKUP, "0.20".to_string()),
        (fields::SELL_MARKUP_FRACTION, "0.75".to_string()),
        (fields::MIN_SELL_MULTIPLIER, "0.2".to_string()),
        (fields::EXCLUDED_THINGS, serde_json::to_string(&excluded)?),
        (fields::PRICE_BRACKETS, defaults.brackets.to_json()?),
    ];

    let mut batch = Batch::new();
    for (field, value) in seed {
        batch.hash_set_if_absent(keys::SETTINGS, field, value);
    }
    batch
        .set_add(keys::KNOWN_LANGUAGES, vec![DEFAULT_LANGUAGE.to_string()])
        .set_if_absent(keys::MAINTENANCE_MODE, "false");
    store.execute(batch).await?;
    tracing::debug!(market = %store.market(), "settings verified");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[tokio::test]
    async fn bootstrap_seeds_defaults() {
        let store = MemoryStore::new("test");
        let Ok(()) = bootstrap(&store).await else {
            panic!("bootstrap");
        };
        let Ok(settings) = MarketSettings::load(&store).await else {
            panic!("defaults must load");
        };
        assert_eq!(settings, MarketSettings::default());
        assert_eq!(
            store.get(keys::MAINTENANCE_MODE).await.ok().flatten().as_deref(),
            Some("false")
        );
        assert_eq!(
            store.set_members(keys::KNOWN_LANGUAGES).await.ok().map(|s| s.len()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn bootstrap_keeps_operator_values() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch
            .hash_set(keys::SETTINGS, fields::START_HOUR, "4")
            .hash_set(keys::SETTINGS, fields::EXCLUDED_THINGS, "[\"x\"]")
            .set(keys::MAINTENANCE_MODE, "true");
        let Ok(()) = store.execute(batch).await else {
            panic!("seed");
        };
        let Ok(()) = bootstrap(&store).await else {
            panic!("bootstrap");
        };
        let Ok(settings) = MarketSettings::load(&store).await else {
            panic!("load");
        };
        assert_eq!(settings.start_hour, 4);
        assert_eq!(settings.excluded_things.len(), 1);
        assert_eq!(
            store.get(keys::MAINTENANCE_MODE).await.ok().flatten().as_deref(),
            Some("true")
        );
    }

    #[test]
    fn bad_values_name_the_field() {
        let mut raw: HashMap<String, String> = HashMap::new();
        raw.insert(fields::START_HOUR.to_string(), "noon".to_string());
        let Err(MarketError::InvalidSetting { field, value }) = MarketSettings::from_fields(&raw)
        else {
            panic!("expected invalid setting");
        };
        assert_eq!(field, fields::START_HOUR);
        assert_eq!(value.as_deref(), Some("noon"));
    }

    #[test]
    fn out_of_range_hour_is_rejected() {
        let mut raw: HashMap<String, String> = HashMap::new();
        raw.insert(fields::START_HOUR.to_string(), "24".to_string());
        assert!(matches!(
            MarketSettings::from_fields(&raw),
            Err(MarketError::InvalidSetting { .. })
        ));
    }
}
