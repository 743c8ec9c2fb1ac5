//! Trading post inventory normalization.
//!
//! Every cycle the shelves are pulled back inside the bracket limits:
//! empty or short shelves are restocked to a random level in the lower
//! half of the bracket, overfull shelves lose a random 5–25% of their
//! units. Both rules depend only on BMV and quantity, so vote-priced
//! Things are normalized too.

use rand::Rng;

use crate::domain::{BracketTable, PriceBracket, Thing};

/// What normalization did to one Thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Quantity already inside the bracket limits.
    Unchanged,
    /// Quantity was raised to the bracket minimum range.
    Restocked {
        /// Quantity before.
        from: i64,
        /// Quantity after.
        to: i64,
    },
    /// Quantity was reduced because of overstock.
    Trimmed {
        /// Quantity before.
        from: i64,
        /// Quantity after.
        to: i64,
    },
}

/// Raises a negative or short stock into
/// `[stock_min, stock_max - (stock_max - stock_min) / 2]`.
pub fn ensure_minimum_stock<R: Rng>(
    thing: &mut Thing,
    bracket: &PriceBracket,
    rng: &mut R,
) -> StockChange {
    let from = thing.quantity;
    if thing.quantity < 0 {
        thing.quantity = 0;
    }
    if thing.quantity < bracket.stock_min {
        let span = (bracket.stock_max - bracket.stock_min) as f64;
        let upper = (bracket.stock_max as f64 - span / 2.0).trunc() as i64;
        thing.quantity = rng.random_range(bracket.stock_min..=upper.max(bracket.stock_min));
    }
    if thing.quantity == from {
        return StockChange::Unchanged;
    }
    tracing::debug!(thing = %thing, from, to = thing.quantity, "restocked");
    StockChange::Restocked {
        from,
        to: thing.quantity,
    }
}

/// Removes 5–25% of an overfull stock, never going below `stock_min`.
pub fn trim_stock<R: Rng>(
    thing: &mut Thing,
    bracket: &PriceBracket,
    rng: &mut R,
) -> StockChange {
    let from = thing.quantity;
    if from <= bracket.stock_max {
        return StockChange::Unchanged;
    }
    let lower = (from as f64 * 0.05).trunc() as i64;
    let upper = (from as f64 * 0.25).trunc() as i64;
    let amount = rng.random_range(lower..=upper.max(lower));
    thing.quantity = (from - amount).max(bracket.stock_min);
    if thing.quantity == from {
        return StockChange::Unchanged;
    }
    tracing::debug!(
        thing = %thing,
        from,
        to = thing.quantity,
        stock_max = bracket.stock_max,
        "reduced overstock"
    );
    StockChange::Trimmed {
        from,
        to: thing.quantity,
    }
}

/// Summary of one stock pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockOutcome {
    /// Things restocked.
    pub restocked: usize,
    /// Things trimmed.
    pub trimmed: usize,
    /// Things skipped because no bracket matched their BMV.
    pub skipped: usize,
}

/// Normalizes the stock of every Thing.
///
/// Things whose BMV lies outside every bracket are left alone.
pub fn normalize<R: Rng>(
    things: &mut [Thing],
    brackets: &BracketTable,
    rng: &mut R,
) -> StockOutcome {
    let mut outcome = StockOutcome::default();
    for thing in things.iter_mut() {
        let Some(bracket) = brackets.find(thing.base_market_value) else {
            tracing::warn!(
                thing = %thing,
                bmv = thing.base_market_value,
                "no price bracket matched, stock left as is"
            );
            outcome.skipped += 1;
            continue;
        };
        if let StockChange::Restocked { .. } = ensure_minimum_stock(thing, bracket, rng) {
            outcome.restocked += 1;
        }
        if let StockChange::Trimmed { .. } = trim_stock(thing, bracket, rng) {
            outcome.trimmed += 1;
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn bracket(stock_min: i64, stock_max: i64) -> PriceBracket {
        PriceBracket {
            price_start: 0.0,
            price_stop: 100.0,
            stock_min,
            stock_max,
            cap_buy_price: 2.5,
        }
    }

    fn thing(quantity: i64) -> Thing {
        let mut thing = Thing::new("t", "Plasteel");
        thing.base_market_value = 10.0;
        thing.quantity = quantity;
        thing
    }

    #[test]
    fn negative_quantity_is_never_kept() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = thing(-40);
        ensure_minimum_stock(&mut t, &bracket(0, 10), &mut rng);
        assert_eq!(t.quantity, 0);

        let mut t = thing(-40);
        ensure_minimum_stock(&mut t, &bracket(200, 250), &mut rng);
        assert!(t.quantity >= 0);
    }

    #[test]
    fn restock_lands_in_lower_half() {
        let mut rng = StdRng::seed_from_u64(11);
        let b = bracket(200, 250);
        for start in [-5, 0, 10, 199] {
            let mut t = thing(start);
            let change = ensure_minimum_stock(&mut t, &b, &mut rng);
            assert!(matches!(change, StockChange::Restocked { .. }));
            assert!((200..=225).contains(&t.quantity), "got {}", t.quantity);
        }
    }

    #[test]
    fn stock_inside_limits_is_untouched() {
        let mut rng = StdRng::seed_from_u64(3);
        let b = bracket(200, 250);
        let mut t = thing(230);
        assert_eq!(ensure_minimum_stock(&mut t, &b, &mut rng), StockChange::Unchanged);
        assert_eq!(trim_stock(&mut t, &b, &mut rng), StockChange::Unchanged);
        assert_eq!(t.quantity, 230);
    }

    #[test]
    fn trim_removes_five_to_twenty_five_percent() {
        let mut rng = StdRng::seed_from_u64(5);
        let b = bracket(10, 100);
        for _ in 0..50 {
            let mut t = thing(1000);
            trim_stock(&mut t, &b, &mut rng);
            assert!((750..=950).contains(&t.quantity), "got {}", t.quantity);
        }
    }

    #[test]
    fn repeated_trim_never_drops_below_minimum() {
        let mut rng = StdRng::seed_from_u64(9);
        let b = bracket(90, 100);
        let mut t = thing(120);
        for _ in 0..20 {
            trim_stock(&mut t, &b, &mut rng);
            assert!(t.quantity >= b.stock_min);
        }
    }

    #[test]
    fn unmatched_bmv_is_skipped() {
        let mut rng = StdRng::seed_from_u64(1);
        let brackets = BracketTable::default();
        let mut things = vec![thing(-3)];
        if let Some(t) = things.first_mut() {
            t.base_market_value = 500_000.0;
        }
        let outcome = normalize(&mut things, &brackets, &mut rng);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(things.first().map(|t| t.quantity), Some(-3));
    }

    #[test]
    fn normalize_counts_changes() {
        let mut rng = StdRng::seed_from_u64(2);
        let brackets = BracketTable::default();
        let mut short = thing(0);
        short.base_market_value = 10.0;
        let mut full = thing(10_000);
        full.base_market_value = 10.0;
        let mut things = vec![short, full];
        let outcome = normalize(&mut things, &brackets, &mut rng);
        assert_eq!(outcome.restocked, 1);
        assert_eq!(outcome.trimmed, 1);
        assert_eq!(outcome.skipped, 0);
    }
}
