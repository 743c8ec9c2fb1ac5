//! Per-cycle market data report.
//!
//! One CSV row per server-priced Thing with its price movement and the
//! day's trade volume, written to `{date}-{market}-market-data.csv`.
//!
//! Fields are written unquoted. A Thing whose hash contains a comma, a
//! double quote or a line break is left out of the report.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::domain::Thing;
use crate::domain::money::round2;
use crate::error::Result;

const HEADER: &str = "thing_hash,bmv,buy_price_new,buy_price_old,buy_price_delta,\
                      sell_price_new,sell_price_old,sell_price_delta,qty_sold,qty_bought";

/// One report line.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Thing hash.
    pub thing_hash: String,
    /// Base market value after the cycle.
    pub bmv: f64,
    /// Buy price after the cycle.
    pub buy_price_new: f64,
    /// Buy price before the cycle.
    pub buy_price_old: f64,
    /// Sell price after the cycle.
    pub sell_price_new: f64,
    /// Sell price before the cycle.
    pub sell_price_old: f64,
    /// Units sold to players today.
    pub qty_sold: i64,
    /// Units bought from players today.
    pub qty_bought: i64,
}

impl ReportRow {
    /// Buy price change.
    #[must_use]
    pub fn buy_price_delta(&self) -> f64 {
        round2(self.buy_price_new - self.buy_price_old)
    }

    /// Sell price change.
    #[must_use]
    pub fn sell_price_delta(&self) -> f64 {
        round2(self.sell_price_new - self.sell_price_old)
    }

    fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            self.thing_hash,
            self.bmv,
            self.buy_price_new,
            self.buy_price_old,
            self.buy_price_delta(),
            self.sell_price_new,
            self.sell_price_old,
            self.sell_price_delta(),
            self.qty_sold,
            self.qty_bought
        )
    }
}

/// Returns `true` if `field` can be written as a bare CSV field.
fn is_plain_field(field: &str) -> bool {
    !field.contains([',', '"', '\n', '\r'])
}

/// Builds report rows for every server-priced Thing in `after`.
///
/// Prices of Things absent from `before` count as unchanged. Things whose
/// hash is not a plain CSV field are skipped with a warning.
#[must_use]
pub fn build_rows(before: &[Thing], after: &[Thing]) -> Vec<ReportRow> {
    let previous: HashMap<&str, &Thing> = before.iter().map(|t| (t.hash.as_str(), t)).collect();
    after
        .iter()
        .filter(|t| t.use_server_price)
        .filter(|t| {
            let plain = is_plain_field(&t.hash);
            if !plain {
                tracing::warn!(
                    thing = %t.hash,
                    "thing hash is not a plain csv field, left out of report"
                );
            }
            plain
        })
        .map(|t| {
            let old = previous.get(t.hash.as_str()).copied().unwrap_or(t);
            ReportRow {
                thing_hash: t.hash.clone(),
                bmv: t.base_market_value,
                buy_price_new: round2(t.current_buy_price),
                buy_price_old: round2(old.current_buy_price),
                sell_price_new: round2(t.current_sell_price),
                sell_price_old: round2(old.current_sell_price),
                qty_sold: t.trade_history.to_player,
                qty_bought: t.trade_history.to_trading_post,
            }
        })
        .collect()
}

/// Report file name for a market and day.
#[must_use]
pub fn file_name(date: NaiveDate, market: &str) -> String {
    format!("{}-{market}-market-data.csv", date.format("%Y-%m-%d"))
}

/// Writes the report into `dir`, replacing any report of the same day.
///
/// # Errors
///
/// Returns [`crate::error::MarketError::Io`] if the file cannot be written.
pub fn write_csv(
    dir: &Path,
    date: NaiveDate,
    market: &str,
    rows: &[ReportRow],
) -> Result<PathBuf> {
    let path = dir.join(file_name(date, market));
    let mut out = BufWriter::new(File::create(&path)?);
    writeln!(out, "{HEADER}")?;
    for row in rows {
        row.write_to(&mut out)?;
    }
    out.flush()?;
    tracing::info!(path = %path.display(), rows = rows.len(), "market report written");
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn priced(hash: &str, buy: f64, sell: f64) -> Thing {
        let mut thing = Thing::new(hash, "Thing");
        thing.use_server_price = true;
        thing.base_market_value = 10.0;
        thing.current_buy_price = buy;
        thing.current_sell_price = sell;
        thing
    }

    #[test]
    fn rows_cover_server_priced_things_only() {
        let before = vec![priced("a", 12.0, 9.0), Thing::new("b", "Voted")];
        let mut after = before.clone();
        if let Some(a) = after.first_mut() {
            a.current_buy_price = 13.0;
            a.trade_history.to_player = 4;
        }
        let rows = build_rows(&before, &after);
        assert_eq!(rows.len(), 1);
        let Some(row) = rows.first() else {
            panic!("one row");
        };
        assert!((row.buy_price_delta() - 1.0).abs() < 1e-9);
        assert!(row.sell_price_delta().abs() < 1e-9);
        assert_eq!(row.qty_sold, 4);
    }

    #[test]
    fn newly_priced_thing_has_zero_delta() {
        let after = vec![priced("n", 6.0, 4.5)];
        let rows = build_rows(&[], &after);
        assert!(rows.first().is_some_and(|r| r.buy_price_delta().abs() < 1e-9));
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("market-report-{}", uuid::Uuid::new_v4()));
        let Ok(()) = std::fs::create_dir_all(&dir) else {
            panic!("temp dir");
        };
        let Some(date) = NaiveDate::from_ymd_opt(2026, 3, 7) else {
            panic!("date");
        };
        let rows = build_rows(&[], &[priced("a", 12.0, 9.0)]);
        let Ok(path) = write_csv(&dir, date, "live", &rows) else {
            panic!("write");
        };
        assert!(path.ends_with("2026-03-07-live-market-data.csv"));
        let Ok(text) = std::fs::read_to_string(&path) else {
            panic!("read");
        };
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.first().is_some_and(|l| l.starts_with("thing_hash,bmv")));
        assert_eq!(lines.get(1).copied(), Some("a,10,12,12,0,9,9,0,0,0"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn hashes_with_delimiters_are_left_out() {
        let after = vec![
            priced("a,b", 12.0, 9.0),
            priced("q\"x", 12.0, 9.0),
            priced("line\nbreak", 12.0, 9.0),
            priced("ok", 12.0, 9.0),
        ];
        let rows = build_rows(&[], &after);
        let hashes: Vec<&str> = rows.iter().map(|r| r.thing_hash.as_str()).collect();
        assert_eq!(hashes, vec!["ok"]);
    }
}
