//! Tradable item types and their economic state.
//!
//! A [`Thing`] is an item *type* (not an in-game instance) as seen by the
//! trading post. It is either vote-priced (`use_server_price == false`,
//! price fields unused) or server-priced, and the transition between the
//! two only ever goes one way.

use std::fmt;

use super::money::{round2, same_price};

/// Counts of units moved through the trading post during the current day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeHistory {
    /// Units the trading post sold to players.
    pub to_player: i64,
    /// Units players sold to the trading post.
    pub to_trading_post: i64,
}

/// One proposed base market value and how many samples voted for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteTally {
    /// Proposed price.
    pub price: f64,
    /// Number of votes for this price.
    pub votes: u32,
}

/// Multiset of proposed base market values.
///
/// Prices equal at two decimal places are the same proposal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BmvVotes {
    tallies: Vec<VoteTally>,
}

impl BmvVotes {
    /// Creates an empty vote set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a vote set from `(price, votes)` pairs, merging duplicates.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, u32)>,
    {
        let mut votes = Self::new();
        for (price, count) in pairs {
            votes.record(price, count);
        }
        votes
    }

    /// Adds `count` votes for `price`.
    pub fn record(&mut self, price: f64, count: u32) {
        if count == 0 {
            return;
        }
        match self.tallies.iter_mut().find(|t| same_price(t.price, price)) {
            Some(tally) => tally.votes = tally.votes.saturating_add(count),
            None => self.tallies.push(VoteTally {
                price: round2(price),
                votes: count,
            }),
        }
    }

    /// Number of distinct proposed prices.
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.tallies.len()
    }

    /// Returns `true` if nobody has voted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    /// Iterates the tallies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &VoteTally> {
        self.tallies.iter()
    }

    /// The `n` most voted proposals, highest tally first.
    ///
    /// Equal tallies are ordered by ascending price so the result does not
    /// depend on load order.
    #[must_use]
    pub fn most_common(&self, n: usize) -> Vec<VoteTally> {
        let mut sorted = self.tallies.clone();
        sorted.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.price.total_cmp(&b.price)));
        sorted.truncate(n);
        sorted
    }

    /// Drops every proposal with at most `max_votes` votes and returns the
    /// prices that were removed.
    pub fn discard_weak(&mut self, max_votes: u32) -> Vec<f64> {
        let (kept, dropped): (Vec<VoteTally>, Vec<VoteTally>) = std::mem::take(&mut self.tallies)
            .into_iter()
            .partition(|t| t.votes > max_votes);
        self.tallies = kept;
        dropped.into_iter().map(|t| t.price).collect()
    }
}

/// A tradable item type with server-managed economic state.
#[derive(Debug, Clone, PartialEq)]
pub struct Thing {
    /// Stable content-derived identifier.
    pub hash: String,
    /// Canonical full display name.
    pub name: String,
    /// Consensus base market value (BMV).
    pub base_market_value: f64,
    /// Whether prices are managed by the engine. Never reverts to `false`.
    pub use_server_price: bool,
    /// Price players pay the trading post.
    pub current_buy_price: f64,
    /// Price the trading post pays players.
    pub current_sell_price: f64,
    /// Discounted buy quote while on sale, `0` otherwise.
    pub buy_price_override: f64,
    /// Discounted sell quote while on sale, `0` otherwise.
    pub sell_price_override: f64,
    /// Units in stock.
    pub quantity: i64,
    /// Proposed base market values.
    pub bmv_votes: BmvVotes,
    /// Today's trade counters.
    pub trade_history: TradeHistory,
}

impl Thing {
    /// Creates a vote-priced thing with no stock, votes or trades.
    #[must_use]
    pub fn new(hash: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            name: name.into(),
            base_market_value: 0.0,
            use_server_price: false,
            current_buy_price: 0.0,
            current_sell_price: 0.0,
            buy_price_override: 0.0,
            sell_price_override: 0.0,
            quantity: 0,
            bmv_votes: BmvVotes::new(),
            trade_history: TradeHistory::default(),
        }
    }

    /// Returns `true` while a sale discount is applied.
    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.buy_price_override > 0.0 || self.sell_price_override > 0.0
    }

    /// Removes any sale discount.
    pub fn clear_overrides(&mut self) {
        self.buy_price_override = 0.0;
        self.sell_price_override = 0.0;
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_merges_equal_prices() {
        let mut votes = BmvVotes::new();
        votes.record(5.0, 3);
        votes.record(5.001, 2);
        votes.record(7.0, 1);
        assert_eq!(votes.distinct(), 2);
        let top = votes.most_common(1);
        assert_eq!(top.first().map(|t| t.votes), Some(5));
    }

    #[test]
    fn most_common_breaks_ties_by_price() {
        let votes = BmvVotes::from_pairs([(7.0, 12), (5.0, 12), (9.0, 3)]);
        let top = votes.most_common(2);
        let prices: Vec<f64> = top.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![5.0, 7.0]);
    }

    #[test]
    fn discard_weak_removes_low_tallies() {
        let mut votes = BmvVotes::from_pairs([(1.0, 1), (2.0, 2), (3.0, 3), (4.0, 12)]);
        let removed = votes.discard_weak(2);
        assert_eq!(removed, vec![1.0, 2.0]);
        assert_eq!(votes.distinct(), 2);
    }

    #[test]
    fn zero_count_votes_are_ignored() {
        let votes = BmvVotes::from_pairs([(1.0, 0)]);
        assert!(votes.is_empty());
    }

    #[test]
    fn new_thing_is_vote_priced_and_not_on_sale() {
        let mut thing = Thing::new("abc", "Plasteel");
        assert!(!thing.use_server_price);
        assert!(!thing.is_on_sale());
        thing.buy_price_override = 4.0;
        assert!(thing.is_on_sale());
        thing.clear_overrides();
        assert!(!thing.is_on_sale());
        assert_eq!(thing.to_string(), "Plasteel (abc)");
    }
}
