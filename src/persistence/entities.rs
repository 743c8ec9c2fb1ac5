//! Loading and staging of Thing and Colony snapshots.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use super::keys;
use super::models::{ThingRecord, TradeRecord, decode_colony, decode_fields, encode_fields};
use super::store::{Batch, Store};
use crate::domain::{BmvVotes, Colony, Thing, TradeHistory};
use crate::error::Result;

/// Reads and stages entity snapshots for one market.
///
/// Snapshots that are missing or fail to decode load as `None` and are
/// logged; they never abort a load.
#[derive(Debug)]
pub struct EntityRepository<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> EntityRepository<'a, S> {
    /// Wraps a store.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Every hash in the Thing index.
    ///
    /// # Errors
    ///
    /// Returns a store error if the index cannot be read.
    pub async fn thing_ids(&self) -> Result<BTreeSet<String>> {
        self.store.set_members(keys::THING_INDEX).await
    }

    /// Loads full snapshots, with votes and the trade counters of `date`.
    ///
    /// Metadata, votes and trade counters are each fetched with one bulk
    /// read for the whole id set.
    ///
    /// # Errors
    ///
    /// Returns a store error if a read fails.
    pub async fn load_things<'i, I>(
        &self,
        ids: I,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, Option<Thing>>>
    where
        I: IntoIterator<Item = &'i String>,
    {
        let ids: Vec<&String> = ids.into_iter().collect();
        let metadata_keys: Vec<String> = ids.iter().map(|id| keys::thing_metadata(id)).collect();
        let vote_keys: Vec<String> = ids.iter().map(|id| keys::thing_votes(id)).collect();
        let trade_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::thing_trade_history(date, id))
            .collect();

        let mut metadata = self.store.hash_get_all_many(&metadata_keys).await?;
        let mut votes = self
            .store
            .sorted_range_many(&vote_keys, f64::NEG_INFINITY, f64::INFINITY)
            .await?;
        let mut trades = self.store.hash_get_all_many(&trade_keys).await?;

        let mut things = BTreeMap::new();
        for (((id, metadata_key), vote_key), trade_key) in
            ids.into_iter().zip(&metadata_keys).zip(&vote_keys).zip(&trade_keys)
        {
            let Some(fields) = metadata.remove(metadata_key) else {
                tracing::error!(thing = %id, "thing metadata missing");
                things.insert(id.clone(), None);
                continue;
            };
            let thing = decode_thing(id, &fields).map(|record| {
                let votes = decode_votes(id, votes.remove(vote_key).unwrap_or_default());
                let trades = decode_trades(id, trades.remove(trade_key));
                record.into_thing(id, votes, trades)
            });
            things.insert(id.clone(), thing);
        }
        Ok(things)
    }

    /// Canonical names of every indexed Thing that has metadata.
    ///
    /// # Errors
    ///
    /// Returns a store error if a read fails.
    pub async fn load_thing_names(&self) -> Result<BTreeMap<String, String>> {
        let ids = self.thing_ids().await?;
        let metadata_keys: Vec<String> = ids.iter().map(|id| keys::thing_metadata(id)).collect();
        let mut metadata = self.store.hash_get_all_many(&metadata_keys).await?;

        let mut names = BTreeMap::new();
        for (id, key) in ids.into_iter().zip(&metadata_keys) {
            match metadata.remove(key) {
                Some(fields) => {
                    if let Some(record) = decode_thing(&id, &fields) {
                        names.insert(id, record.name);
                    }
                }
                None => tracing::error!(thing = %id, "thing metadata missing"),
            }
        }
        Ok(names)
    }

    /// Every hash in the Colony index, in index order.
    ///
    /// # Errors
    ///
    /// Returns a store error if the index cannot be read.
    pub async fn colony_ids(&self) -> Result<Vec<String>> {
        self.store.list_range(keys::COLONY_INDEX).await
    }

    /// Loads every indexed Colony.
    ///
    /// # Errors
    ///
    /// Returns a store error if a read fails.
    pub async fn load_colonies(&self) -> Result<BTreeMap<String, Option<Colony>>> {
        let ids = self.colony_ids().await?;
        let metadata_keys: Vec<String> = ids.iter().map(|id| keys::colony_metadata(id)).collect();
        let mut metadata = self.store.hash_get_all_many(&metadata_keys).await?;

        let mut colonies = BTreeMap::new();
        for (id, key) in ids.into_iter().zip(&metadata_keys) {
            let colony = match metadata.remove(key) {
                None => {
                    tracing::error!(colony = %id, "colony metadata missing");
                    None
                }
                Some(fields) => match decode_colony(&id, &fields) {
                    Ok(colony) => Some(colony),
                    Err(e) => {
                        tracing::error!(colony = %id, error = %e, "colony metadata incomplete");
                        None
                    }
                },
            };
            colonies.insert(id, colony);
        }
        Ok(colonies)
    }
}

fn decode_thing(hash: &str, fields: &HashMap<String, String>) -> Option<ThingRecord> {
    match decode_fields::<ThingRecord>(fields) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::error!(thing = %hash, error = %e, "thing metadata unreadable");
            None
        }
    }
}

fn decode_votes(hash: &str, members: Vec<(String, f64)>) -> BmvVotes {
    let mut votes = BmvVotes::new();
    for (member, tally) in members {
        match member.parse::<f64>() {
            Ok(price) if price.is_finite() => votes.record(price, tally.max(0.0) as u32),
            _ => tracing::warn!(thing = %hash, vote = %member, "ignoring unparsable vote"),
        }
    }
    votes
}

fn decode_trades(hash: &str, fields: Option<HashMap<String, String>>) -> TradeHistory {
    let Some(fields) = fields else {
        return TradeHistory::default();
    };
    match decode_fields::<TradeRecord>(&fields) {
        Ok(record) => record.into(),
        Err(e) => {
            tracing::warn!(thing = %hash, error = %e, "trade history unreadable, assuming none");
            TradeHistory::default()
        }
    }
}

/// Stages the metadata of `thing` into `batch`.
///
/// Votes and trade counters are owned by the game API and are not written
/// back here.
///
/// # Errors
///
/// Returns an encoding error if the record cannot be serialized.
pub fn stage_thing(thing: &Thing, batch: &mut Batch) -> Result<()> {
    let key = keys::thing_metadata(&thing.hash);
    for (field, value) in encode_fields(&ThingRecord::from(thing))? {
        batch.hash_set(key.clone(), field, value);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn day() -> NaiveDate {
        let Some(date) = NaiveDate::from_ymd_opt(2026, 5, 1) else {
            panic!("valid date");
        };
        date
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch
            .set_add(keys::THING_INDEX, vec!["t1".to_string(), "t2".to_string()])
            .hash_set(keys::thing_metadata("t1"), "FullName", "Plasteel")
            .hash_set(keys::thing_metadata("t1"), "BaseMarketValue", "10")
            .hash_set(keys::thing_metadata("t1"), "Quantity", "7")
            .sorted_add(keys::thing_votes("t1"), "5.0", 12.0)
            .sorted_add(keys::thing_votes("t1"), "cheap", 3.0)
            .hash_set(keys::thing_trade_history(day(), "t1"), "ToPlayer", "4")
            .list_push(keys::COLONY_INDEX, "c1")
            .list_push(keys::COLONY_INDEX, "c2")
            .hash_set(keys::colony_metadata("c1"), "BaseName", "Haven")
            .hash_set(keys::colony_metadata("c1"), "Planet", "Kepler")
            .hash_set(keys::colony_metadata("c1"), "FactionName", "Free Traders")
            .hash_set(keys::colony_metadata("c2"), "BaseName", "Orphan");
        let Ok(()) = store.execute(batch).await else {
            panic!("seed");
        };
        store
    }

    #[tokio::test]
    async fn loads_things_with_votes_and_trades() {
        let store = seeded().await;
        let repo = EntityRepository::new(&store);
        let Ok(ids) = repo.thing_ids().await else {
            panic!("ids");
        };
        let Ok(things) = repo.load_things(&ids, day()).await else {
            panic!("load");
        };
        let Some(Some(thing)) = things.get("t1") else {
            panic!("t1 should load");
        };
        assert_eq!(thing.quantity, 7);
        assert_eq!(thing.bmv_votes.distinct(), 1);
        assert_eq!(thing.trade_history.to_player, 4);
        assert_eq!(thing.trade_history.to_trading_post, 0);
        assert_eq!(things.get("t2"), Some(&None));
    }

    #[tokio::test]
    async fn staged_thing_reloads_identically() {
        let store = seeded().await;
        let repo = EntityRepository::new(&store);
        let mut thing = Thing::new("t2", "Ice");
        thing.use_server_price = true;
        thing.current_buy_price = 3.5;
        let mut batch = Batch::new();
        let Ok(()) = stage_thing(&thing, &mut batch) else {
            panic!("stage");
        };
        let Ok(()) = store.execute(batch).await else {
            panic!("execute");
        };
        let ids = vec!["t2".to_string()];
        let Ok(things) = repo.load_things(&ids, day()).await else {
            panic!("load");
        };
        assert_eq!(things.get("t2"), Some(&Some(thing)));
    }

    #[tokio::test]
    async fn incomplete_colony_loads_as_none() {
        let store = seeded().await;
        let repo = EntityRepository::new(&store);
        let Ok(colonies) = repo.load_colonies().await else {
            panic!("load");
        };
        assert!(matches!(colonies.get("c1"), Some(Some(c)) if c.planet == "Kepler"));
        assert_eq!(colonies.get("c2"), Some(&None));
    }

    #[tokio::test]
    async fn names_skip_missing_metadata() {
        let store = seeded().await;
        let repo = EntityRepository::new(&store);
        let Ok(names) = repo.load_thing_names().await else {
            panic!("names");
        };
        assert_eq!(names.len(), 1);
        assert_eq!(names.get("t1").map(String::as_str), Some("Plasteel"));
    }
}
