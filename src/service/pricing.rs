//! Price discovery and adjustment.
//!
//! Vote-priced Things graduate to server pricing once their base market
//! value votes reach a clear, confident plurality. Server-priced Things
//! then have their buy price driven by demand (units sold today against
//! stock) and their sell price driven by how full the shelves are.
//!
//! All functions here are pure: they take the Thing by mutable reference,
//! apply the rule and report what happened. Persistence is the caller's
//! job.

use crate::domain::money::{direction_marker, round2, same_price};
use crate::domain::{BracketTable, PriceBracket, Thing};

/// Votes the winning proposal needs before server pricing is enabled.
pub const MIN_CONFIDENT_VOTES: u32 = 10;
/// Distinct proposals at which weak votes start being discarded.
pub const TRIM_DISTINCT_THRESHOLD: usize = 5;
/// Proposals with at most this many votes are discarded when trimming.
pub const WEAK_VOTE_MAX: u32 = 2;

/// Sold fraction at or below which demand counts as low.
const LOW_DEMAND_FRACTION: f64 = 0.10;
/// Price step in percent of BMV.
const PRICE_STEP_PERCENT: f64 = 10.0;
/// Sell price never rises above this multiple of BMV.
const MAX_SELL_BMV_MULTIPLIER: f64 = 1.5;
/// Stock ratio at or below which shelves count as low.
const LOW_STOCK_RATIO: f64 = 0.50;
/// Lowest buy price after a demand-driven increase.
const MIN_BUY_PRICE: f64 = 1.0;

/// Market-wide pricing knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingSettings {
    /// Markup on BMV for the initial buy price (`0.20` = +20%).
    pub buy_markup: f64,
    /// Initial sell price as a fraction of the initial buy price.
    pub sell_markup_fraction: f64,
    /// Sell price floor as a multiple of BMV.
    pub min_sell_multiplier: f64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            buy_markup: 0.20,
            sell_markup_fraction: 0.75,
            min_sell_multiplier: 0.2,
        }
    }
}

/// Result of trying to enable server pricing for a vote-priced Thing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitialPricing {
    /// Nobody has voted.
    NoVotes,
    /// The two leading proposals have the same tally.
    Stalemate,
    /// The leading proposal has fewer than [`MIN_CONFIDENT_VOTES`] votes.
    LowConfidence {
        /// Votes of the leading proposal.
        votes: u32,
    },
    /// Server pricing was enabled at this BMV.
    Priced {
        /// New base market value.
        base_market_value: f64,
    },
}

/// Enables server pricing if the votes allow it.
pub fn apply_initial_price(thing: &mut Thing, settings: &PricingSettings) -> InitialPricing {
    let top = thing.bmv_votes.most_common(2);
    let Some(leader) = top.first().copied() else {
        tracing::debug!(thing = %thing, "no price samples");
        return InitialPricing::NoVotes;
    };
    if let Some(runner_up) = top.get(1)
        && runner_up.votes == leader.votes
    {
        tracing::debug!(thing = %thing, votes = leader.votes, "vote stalemate");
        return InitialPricing::Stalemate;
    }
    if leader.votes < MIN_CONFIDENT_VOTES {
        tracing::debug!(
            thing = %thing,
            votes = leader.votes,
            price = leader.price,
            "not enough votes to set base market value"
        );
        return InitialPricing::LowConfidence {
            votes: leader.votes,
        };
    }

    let bmv = round2(leader.price);
    let buy = round2(bmv + bmv * settings.buy_markup);
    thing.use_server_price = true;
    thing.base_market_value = bmv;
    thing.current_buy_price = buy;
    thing.current_sell_price = round2(buy * settings.sell_markup_fraction);
    tracing::info!(
        thing = %thing,
        bmv,
        buy = thing.current_buy_price,
        sell = thing.current_sell_price,
        "server pricing enabled"
    );
    InitialPricing::Priced {
        base_market_value: bmv,
    }
}

/// Discards weak proposals once votes are spread over many prices.
///
/// Returns `true` if the Thing's stored votes need the same trim.
pub fn trim_votes(thing: &mut Thing) -> bool {
    if thing.bmv_votes.distinct() < TRIM_DISTINCT_THRESHOLD {
        return false;
    }
    let removed = thing.bmv_votes.discard_weak(WEAK_VOTE_MAX);
    if !removed.is_empty() {
        tracing::debug!(thing = %thing, removed = ?removed, "discarded weak votes");
    }
    true
}

/// Moves the buy price with today's demand.
///
/// Returns `true` if the price changed.
pub fn adjust_buy_price(thing: &mut Thing, bracket: &PriceBracket) -> bool {
    let bmv = thing.base_market_value;
    let unit = bmv / 100.0;
    let cap = bmv * bracket.cap_buy_price;
    let before = thing.current_buy_price;

    let mut price = before;
    if price > cap {
        tracing::info!(thing = %thing, current = price, cap, "buy price above cap, resetting");
        price = cap;
    }

    let sold = thing.trade_history.to_player;
    let total = thing.quantity.saturating_add(sold);
    let sold_fraction = if total <= 0 {
        0.0
    } else {
        sold as f64 / total as f64
    };

    let calculated = if sold_fraction <= LOW_DEMAND_FRACTION {
        let lowered = price - unit * PRICE_STEP_PERCENT;
        if lowered < bmv {
            tracing::debug!(thing = %thing, floor = bmv, "buy price floored at base market value");
            bmv
        } else {
            lowered
        }
    } else {
        let steps = PRICE_STEP_PERCENT.max((sold_fraction - 1.10) * 100.0);
        let raised = price + unit * steps;
        if raised > cap {
            tracing::debug!(thing = %thing, cap, "buy price capped");
        }
        raised.min(cap).max(MIN_BUY_PRICE)
    };

    let after = round2(calculated);
    thing.current_buy_price = after;
    if same_price(before, after) {
        return false;
    }
    tracing::info!(
        thing = %thing,
        from = before,
        to = after,
        sold_fraction = round2(sold_fraction),
        "{} buy price adjusted",
        direction_marker(before, after)
    );
    true
}

/// Moves the sell price with stock level, never above the buy price.
///
/// Returns `true` if the price changed.
pub fn adjust_sell_price(
    thing: &mut Thing,
    bracket: &PriceBracket,
    settings: &PricingSettings,
) -> bool {
    let bmv = thing.base_market_value;
    let unit = bmv * 0.01;
    let before = thing.current_sell_price;
    let stock_ratio = if bracket.stock_max > 0 {
        (thing.quantity as f64 / bracket.stock_max as f64).round_ties_even()
    } else {
        0.0
    };

    let mut price = if stock_ratio <= LOW_STOCK_RATIO {
        let ceiling = MAX_SELL_BMV_MULTIPLIER * bmv;
        (before + unit * PRICE_STEP_PERCENT).min(ceiling)
    } else if stock_ratio > 1.0 {
        let floor = bmv * settings.min_sell_multiplier;
        let steps = PRICE_STEP_PERCENT.min((stock_ratio - 1.0) * 100.0);
        (before - unit * steps).max(floor)
    } else {
        before
    };

    if price > thing.current_buy_price {
        tracing::debug!(
            thing = %thing,
            buy = thing.current_buy_price,
            "sell price clamped to buy price"
        );
        price = thing.current_buy_price;
    }

    let after = round2(price);
    thing.current_sell_price = after;
    if same_price(before, after) {
        return false;
    }
    tracing::info!(
        thing = %thing,
        from = before,
        to = after,
        stock_ratio,
        "{} sell price adjusted",
        direction_marker(before, after)
    );
    true
}

/// Summary of one pricing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricingOutcome {
    /// Things whose stored votes must be trimmed too.
    pub vote_trimmed: Vec<String>,
    /// Things that switched to server pricing this pass.
    pub newly_priced: usize,
    /// Things whose buy price changed.
    pub buy_changes: usize,
    /// Things whose sell price changed.
    pub sell_changes: usize,
}

/// Runs the whole pricing pass: vote trim, initial pricing, then buy and
/// sell adjustment of every server-priced Thing.
pub fn reprice(
    things: &mut [Thing],
    brackets: &BracketTable,
    settings: &PricingSettings,
) -> PricingOutcome {
    let mut outcome = PricingOutcome::default();

    for thing in things.iter_mut() {
        if trim_votes(thing) {
            outcome.vote_trimmed.push(thing.hash.clone());
        }
    }

    for thing in things.iter_mut().filter(|t| !t.use_server_price) {
        if matches!(
            apply_initial_price(thing, settings),
            InitialPricing::Priced { .. }
        ) {
            outcome.newly_priced += 1;
        }
    }

    for thing in things.iter_mut().filter(|t| t.use_server_price) {
        let found = brackets.find_or_highest(thing.base_market_value);
        if found.fallback {
            tracing::warn!(
                thing = %thing,
                bmv = thing.base_market_value,
                "no price bracket matched, using highest"
            );
        }
        if adjust_buy_price(thing, found.bracket) {
            outcome.buy_changes += 1;
        }
        if adjust_sell_price(thing, found.bracket, settings) {
            outcome.sell_changes += 1;
        }
    }

    outcome
}
