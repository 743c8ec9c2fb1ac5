//! Rotating discount sale.
//!
//! Each cycle the previous batch comes off sale and into a 30-day
//! cool-down, then up to 30 eligible Things are drawn at random and
//! discounted by a random 5–70%.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use uuid::Uuid;

use crate::domain::money::round2;
use crate::domain::{MarketEvent, SaleItem, Thing};
use crate::error::Result;
use crate::persistence::{Batch, Store, keys, stage_event};

/// Things put on sale per cycle.
pub const SALE_SIZE: usize = 30;
/// Days a Thing waits after a sale before it can be drawn again.
pub const COOL_DOWN_DAYS: i64 = 30;
/// Possible discounts in percent.
pub const DISCOUNTS: [u32; 14] = [5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70];

/// Persisted sale bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleState {
    /// Things currently discounted.
    pub on_sale_now: BTreeSet<String>,
    /// Things in cool-down, with the epoch second the cool-down ends.
    pub recently_on_sale: BTreeMap<String, i64>,
}

impl SaleState {
    /// Reads the sale sets from the store.
    ///
    /// # Errors
    ///
    /// Returns a store error if a read fails.
    pub async fn load<S: Store>(store: &S) -> Result<Self> {
        let on_sale_now = store.set_members(keys::ON_SALE_NOW).await?;
        let recently_on_sale = store
            .sorted_range_by_score(keys::RECENTLY_ON_SALE, f64::NEG_INFINITY, f64::INFINITY)
            .await?
            .into_iter()
            .map(|(hash, expiry)| (hash, expiry as i64))
            .collect();
        Ok(Self {
            on_sale_now,
            recently_on_sale,
        })
    }
}

/// Result of one sale draw.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleOutcome {
    /// Things coming off sale, with their cool-down expiry.
    pub delayed: Vec<(String, i64)>,
    /// Cool-down entries that expired this cycle.
    pub expired: usize,
    /// The new sale batch.
    pub items: Vec<SaleItem>,
    /// Sale bookkeeping after this cycle.
    pub next_state: SaleState,
}

/// Ends the current sale, draws a new batch and applies its discounts to
/// `things`.
pub fn run_sale<R: Rng>(
    things: &mut [Thing],
    state: &SaleState,
    now: DateTime<Utc>,
    rng: &mut R,
) -> SaleOutcome {
    let now_epoch = now.timestamp();
    let delay_until = (now + Duration::days(COOL_DOWN_DAYS)).timestamp();
    let positions: HashMap<String, usize> = things
        .iter()
        .enumerate()
        .map(|(i, t)| (t.hash.clone(), i))
        .collect();

    let mut delayed = Vec::with_capacity(state.on_sale_now.len());
    for hash in &state.on_sale_now {
        match positions.get(hash).and_then(|&i| things.get_mut(i)) {
            Some(thing) => thing.clear_overrides(),
            None => tracing::warn!(thing = %hash, "on-sale thing not loaded, delaying anyway"),
        }
        delayed.push((hash.clone(), delay_until));
    }

    let mut cooling: BTreeMap<String, i64> = state
        .recently_on_sale
        .iter()
        .filter(|&(_, &expiry)| expiry > now_epoch)
        .map(|(hash, &expiry)| (hash.clone(), expiry))
        .collect();
    let expired = state.recently_on_sale.len() - cooling.len();
    cooling.extend(delayed.iter().cloned());

    let mut eligible: Vec<String> = things
        .iter()
        .filter(|t| t.use_server_price && t.quantity > 0 && !cooling.contains_key(&t.hash))
        .map(|t| t.hash.clone())
        .collect();
    eligible.sort();
    eligible.shuffle(rng);
    eligible.truncate(SALE_SIZE);

    let mut items = Vec::with_capacity(eligible.len());
    for hash in &eligible {
        let Some(thing) = positions.get(hash).and_then(|&i| things.get_mut(i)) else {
            continue;
        };
        let Some(&discount) = DISCOUNTS.choose(rng) else {
            continue;
        };
        let factor = f64::from(discount);
        thing.buy_price_override =
            round2(thing.current_buy_price - thing.current_buy_price / 100.0 * factor);
        thing.sell_price_override =
            round2(thing.current_sell_price - thing.current_sell_price / 100.0 * factor);
        tracing::debug!(thing = %thing, discount, "discounted");
        items.push(SaleItem {
            thing: thing.hash.clone(),
            name: thing.name.clone(),
            discount,
            buy_price: thing.buy_price_override,
            sell_price: thing.sell_price_override,
        });
    }

    SaleOutcome {
        delayed,
        expired,
        items,
        next_state: SaleState {
            on_sale_now: eligible.into_iter().collect(),
            recently_on_sale: cooling,
        },
    }
}

/// Stages the sale sets and the announcement.
///
/// # Errors
///
/// Returns an encoding error if the announcement cannot be serialized.
pub fn stage_sale(
    outcome: &SaleOutcome,
    market: &str,
    run_id: Uuid,
    now: DateTime<Utc>,
    batch: &mut Batch,
) -> Result<()> {
    batch.sorted_remove_range_by_score(
        keys::RECENTLY_ON_SALE,
        f64::NEG_INFINITY,
        now.timestamp() as f64,
    );
    for (hash, expiry) in &outcome.delayed {
        batch.sorted_add(keys::RECENTLY_ON_SALE, hash.clone(), *expiry as f64);
    }
    batch
        .delete(vec![keys::ON_SALE_NOW.to_string()])
        .set_add(
            keys::ON_SALE_NOW,
            outcome.items.iter().map(|i| i.thing.clone()).collect(),
        );
    stage_event(
        &MarketEvent::SaleAnnounced {
            market: market.to_string(),
            run_id,
            items: outcome.items.clone(),
            timestamp: now,
        },
        batch,
    )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::persistence::MemoryStore;

    fn stocked(i: usize) -> Thing {
        let mut thing = Thing::new(format!("t{i:02}"), format!("Thing {i}"));
        thing.use_server_price = true;
        thing.base_market_value = 10.0;
        thing.current_buy_price = 12.0;
        thing.current_sell_price = 9.0;
        thing.quantity = 100;
        thing
    }

    fn start() -> DateTime<Utc> {
        let Some(at) = DateTime::from_timestamp(1_780_000_000, 0) else {
            panic!("valid timestamp");
        };
        at
    }

    #[test]
    fn only_stocked_server_priced_things_are_eligible() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut empty = stocked(1);
        empty.quantity = 0;
        let mut voted = stocked(2);
        voted.use_server_price = false;
        let mut things = vec![stocked(0), empty, voted];
        let outcome = run_sale(&mut things, &SaleState::default(), start(), &mut rng);
        let picked: Vec<&str> = outcome.items.iter().map(|i| i.thing.as_str()).collect();
        assert_eq!(picked, vec!["t00"]);
    }

    #[test]
    fn discounts_are_applied_to_both_quotes() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut things = vec![stocked(0)];
        let outcome = run_sale(&mut things, &SaleState::default(), start(), &mut rng);
        let Some(item) = outcome.items.first() else {
            panic!("one item on sale");
        };
        assert!(DISCOUNTS.contains(&item.discount));
        let factor = f64::from(item.discount);
        let Some(thing) = things.first() else {
            panic!("thing");
        };
        assert!((thing.buy_price_override - round2(12.0 - 0.12 * factor)).abs() < 1e-9);
        assert!((thing.sell_price_override - round2(9.0 - 0.09 * factor)).abs() < 1e-9);
        assert!(thing.is_on_sale());
    }

    #[test]
    fn at_most_thirty_items_go_on_sale() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut things: Vec<Thing> = (0..80).map(stocked).collect();
        let outcome = run_sale(&mut things, &SaleState::default(), start(), &mut rng);
        assert_eq!(outcome.items.len(), SALE_SIZE);
        assert_eq!(things.iter().filter(|t| t.is_on_sale()).count(), SALE_SIZE);
    }

    #[test]
    fn previous_batch_comes_off_sale() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut things: Vec<Thing> = (0..2).map(stocked).collect();
        for thing in &mut things {
            thing.buy_price_override = 1.0;
        }
        let state = SaleState {
            on_sale_now: ["t00".to_string(), "gone".to_string()].into(),
            recently_on_sale: BTreeMap::new(),
        };
        let outcome = run_sale(&mut things, &state, start(), &mut rng);
        assert_eq!(outcome.delayed.len(), 2);
        let picked: Vec<&str> = outcome.items.iter().map(|i| i.thing.as_str()).collect();
        assert_eq!(picked, vec!["t01"]);
        assert!(things.first().is_some_and(|t| !t.is_on_sale()));
    }

    #[test]
    fn cool_down_lasts_thirty_days() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut things: Vec<Thing> = (0..45).map(stocked).collect();
        let mut state = SaleState::default();
        let mut last_drawn: HashMap<String, i64> = HashMap::new();

        for day in 0..120 {
            let now = start() + Duration::days(day);
            let outcome = run_sale(&mut things, &state, now, &mut rng);
            for item in &outcome.items {
                if let Some(previous) = last_drawn.get(&item.thing) {
                    assert!(
                        day - previous > COOL_DOWN_DAYS,
                        "{} drawn on day {previous} and again on day {day}",
                        item.thing
                    );
                }
                last_drawn.insert(item.thing.clone(), day);
            }
            state = outcome.next_state;
        }
        assert_eq!(last_drawn.len(), 45);
    }

    #[tokio::test]
    async fn staged_sale_round_trips_through_store() {
        let store = MemoryStore::new("test");
        let mut rng = StdRng::seed_from_u64(6);
        let mut things: Vec<Thing> = (0..3).map(stocked).collect();
        let now = start();
        let mut seed = Batch::new();
        seed.set_add(keys::ON_SALE_NOW, vec!["t00".to_string()])
            .sorted_add(keys::RECENTLY_ON_SALE, "old", (now.timestamp() - 1) as f64);
        let Ok(()) = store.execute(seed).await else {
            panic!("seed");
        };

        let Ok(state) = SaleState::load(&store).await else {
            panic!("load");
        };
        let outcome = run_sale(&mut things, &state, now, &mut rng);
        assert_eq!(outcome.expired, 1);

        let mut batch = Batch::new();
        let Ok(()) = stage_sale(&outcome, "test", Uuid::new_v4(), now, &mut batch) else {
            panic!("stage");
        };
        let Ok(()) = store.execute(batch).await else {
            panic!("execute");
        };

        let Ok(reloaded) = SaleState::load(&store).await else {
            panic!("reload");
        };
        assert_eq!(reloaded, outcome.next_state);
        let Ok(outbox) = store.list_range(keys::EVENT_OUTBOX).await else {
            panic!("outbox");
        };
        assert_eq!(outbox.len(), 1);
    }
}
