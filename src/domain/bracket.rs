//! Price/stock brackets.
//!
//! A [`BracketTable`] partitions the base-market-value axis into ranges,
//! each with its own stocking limits and buy price cap. Tables are
//! validated on construction so lookups never have to deal with an empty
//! or inconsistent table.

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

/// One row of the bracket table. Bounds are inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PriceBracket {
    /// Lowest base market value covered.
    pub price_start: f64,
    /// Highest base market value covered.
    pub price_stop: f64,
    /// Restock threshold.
    pub stock_min: i64,
    /// Overstock threshold.
    pub stock_max: i64,
    /// Buy price cap as a multiple of the base market value.
    pub cap_buy_price: f64,
}

impl PriceBracket {
    /// Returns `true` if `bmv` lies inside this bracket.
    #[must_use]
    pub fn contains(&self, bmv: f64) -> bool {
        self.price_start <= bmv && bmv <= self.price_stop
    }
}

/// Result of a bracket lookup that may fall back to the highest bracket.
#[derive(Debug, Clone, Copy)]
pub struct BracketMatch<'a> {
    /// The bracket to apply.
    pub bracket: &'a PriceBracket,
    /// `true` if no bracket contained the value and the highest one was used.
    pub fallback: bool,
}

/// Validated, non-empty bracket table.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketTable {
    rows: Vec<PriceBracket>,
    highest: PriceBracket,
}

impl BracketTable {
    /// Validates and wraps a list of brackets.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidBrackets`] if the list is empty, a row
    /// is inverted, has a non-positive `StockMax` or a cap below 1, or the
    /// rows do not tile the price axis without gaps or overlaps.
    pub fn new(mut rows: Vec<PriceBracket>) -> Result<Self> {
        rows.sort_by(|a, b| a.price_start.total_cmp(&b.price_start));

        for row in &rows {
            if row.price_start > row.price_stop {
                return Err(MarketError::InvalidBrackets(format!(
                    "bracket {}..{} is inverted",
                    row.price_start, row.price_stop
                )));
            }
            if row.stock_min < 0 || row.stock_max <= 0 || row.stock_min > row.stock_max {
                return Err(MarketError::InvalidBrackets(format!(
                    "bracket {}..{} has stock limits {}..{}",
                    row.price_start, row.price_stop, row.stock_min, row.stock_max
                )));
            }
            if row.cap_buy_price < 1.0 {
                return Err(MarketError::InvalidBrackets(format!(
                    "bracket {}..{} caps buy price below base value",
                    row.price_start, row.price_stop
                )));
            }
        }

        for pair in rows.windows(2) {
            if let [prev, next] = pair
                && (next.price_start - prev.price_stop).abs() > f64::EPSILON
            {
                return Err(MarketError::InvalidBrackets(format!(
                    "brackets {}..{} and {}..{} are not contiguous",
                    prev.price_start, prev.price_stop, next.price_start, next.price_stop
                )));
            }
        }

        let highest = rows
            .iter()
            .copied()
            .max_by(|a, b| a.price_stop.total_cmp(&b.price_stop))
            .ok_or_else(|| MarketError::InvalidBrackets("table is empty".to_string()))?;

        Ok(Self { rows, highest })
    }

    /// Parses and validates a JSON bracket list.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Json`] on malformed JSON and
    /// [`MarketError::InvalidBrackets`] if validation fails.
    pub fn from_json(raw: &str) -> Result<Self> {
        let rows: Vec<PriceBracket> = serde_json::from_str(raw)?;
        Self::new(rows)
    }

    /// Serializes the rows back to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.rows)?)
    }

    /// The bracket table shipped with a fresh market.
    #[must_use]
    pub fn default_rows() -> Vec<PriceBracket> {
        vec![
            bracket(0.0, 5.0, 1000, 100_000, 2.5),
            bracket(5.0, 25.0, 200, 250, 2.75),
            bracket(25.0, 50.0, 100, 150, 3.0),
            bracket(50.0, 100.0, 10, 15, 3.5),
            bracket(100.0, 100_000.0, 1, 15, 4.0),
            bracket(100_000.0, 200_000.0, 1, 5, 4.5),
        ]
    }

    /// Finds the first bracket containing `bmv`.
    #[must_use]
    pub fn find(&self, bmv: f64) -> Option<&PriceBracket> {
        self.rows.iter().find(|b| b.contains(bmv))
    }

    /// Finds the bracket containing `bmv`, falling back to the highest
    /// priced bracket.
    #[must_use]
    pub fn find_or_highest(&self, bmv: f64) -> BracketMatch<'_> {
        match self.find(bmv) {
            Some(bracket) => BracketMatch {
                bracket,
                fallback: false,
            },
            None => BracketMatch {
                bracket: &self.highest,
                fallback: true,
            },
        }
    }

    /// The bracket with the greatest upper bound.
    #[must_use]
    pub fn highest(&self) -> &PriceBracket {
        &self.highest
    }
}

impl Default for BracketTable {
    /// The table shipped with a fresh market; see [`BracketTable::default_rows`].
    fn default() -> Self {
        Self {
            rows: Self::default_rows(),
            highest: bracket(100_000.0, 200_000.0, 1, 5, 4.5),
        }
    }
}

const fn bracket(
    price_start: f64,
    price_stop: f64,
    stock_min: i64,
    stock_max: i64,
    cap_buy_price: f64,
) -> PriceBracket {
    PriceBracket {
        price_start,
        price_stop,
        stock_min,
        stock_max,
        cap_buy_price,
    }
}
