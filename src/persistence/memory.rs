//! In-memory [`Store`] implementation.
//!
//! Used by the test suite and for rehearsing cycles without a database.
//! All data sits behind a single [`tokio::sync::RwLock`], which makes
//! [`Store::execute`] trivially atomic.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::store::{Batch, Command, Store};
use crate::error::Result;

#[derive(Debug, Clone)]
struct StringValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StringValue {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    strings: HashMap<String, StringValue>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    sorted: HashMap<String, BTreeMap<String, f64>>,
    lists: HashMap<String, Vec<String>>,
}

impl Keyspace {
    fn live_string(&self, key: &str, now: DateTime<Utc>) -> Option<&StringValue> {
        self.strings.get(key).filter(|v| v.live(now))
    }

    fn contains(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.live_string(key, now).is_some()
            || self.hashes.contains_key(key)
            || self.sets.contains_key(key)
            || self.sorted.contains_key(key)
            || self.lists.contains_key(key)
    }

    fn sorted_range(&self, key: &str, min: f64, max: f64) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = self
            .sorted
            .get(key)
            .map(|zset| {
                zset.iter()
                    .filter(|(_, score)| **score >= min && **score <= max)
                    .map(|(member, score)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }

    fn apply(&mut self, command: Command, now: DateTime<Utc>) {
        match command {
            Command::Set {
                key,
                value,
                ttl_secs,
            } => {
                let expires_at = ttl_secs
                    .and_then(|secs| i64::try_from(secs).ok())
                    .map(|secs| now + Duration::seconds(secs));
                self.strings.insert(key, StringValue { value, expires_at });
            }
            Command::SetIfAbsent { key, value } => {
                if self.live_string(&key, now).is_none() {
                    self.strings.insert(
                        key,
                        StringValue {
                            value,
                            expires_at: None,
                        },
                    );
                }
            }
            Command::Delete { keys } => {
                for key in keys {
                    self.strings.remove(&key);
                    self.hashes.remove(&key);
                    self.sets.remove(&key);
                    self.sorted.remove(&key);
                    self.lists.remove(&key);
                }
            }
            Command::HashSet { key, field, value } => {
                self.hashes.entry(key).or_default().insert(field, value);
            }
            Command::HashSetIfAbsent { key, field, value } => {
                self.hashes
                    .entry(key)
                    .or_default()
                    .entry(field)
                    .or_insert(value);
            }
            Command::SetAdd { key, members } => {
                self.sets.entry(key).or_default().extend(members);
            }
            Command::SetRemove { key, members } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    for member in &members {
                        set.remove(member);
                    }
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                }
            }
            Command::SortedAdd { key, member, score } => {
                self.sorted.entry(key).or_default().insert(member, score);
            }
            Command::SortedIncrBy { key, member, delta } => {
                *self
                    .sorted
                    .entry(key)
                    .or_default()
                    .entry(member)
                    .or_insert(0.0) += delta;
            }
            Command::SortedRemoveRangeByScore { key, min, max } => {
                if let Some(zset) = self.sorted.get_mut(&key) {
                    zset.retain(|_, score| *score < min || *score > max);
                    if zset.is_empty() {
                        self.sorted.remove(&key);
                    }
                }
            }
            Command::ListPush { key, value } => {
                self.lists.entry(key).or_default().push(value);
            }
        }
    }
}

/// Market-scoped store kept entirely in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    market: String,
    data: RwLock<Keyspace>,
}

impl MemoryStore {
    /// Creates an empty store for `market`.
    #[must_use]
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            data: RwLock::new(Keyspace::default()),
        }
    }
}

impl Store for MemoryStore {
    fn market(&self) -> &str {
        &self.market
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.read().await;
        Ok(data.live_string(key, Utc::now()).map(|v| v.value.clone()))
    }

    async fn get_set(&self, key: &str, value: &str) -> Result<Option<String>> {
        let mut data = self.data.write().await;
        let now = Utc::now();
        let previous = data.live_string(key, now).map(|v| v.value.clone());
        data.strings.insert(
            key.to_string(),
            StringValue {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(previous)
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let data = self.data.read().await;
        let now = Utc::now();
        Ok(keys
            .iter()
            .filter_map(|key| {
                data.live_string(key, now)
                    .map(|v| (key.clone(), v.value.clone()))
            })
            .collect())
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<BTreeSet<String>> {
        let data = self.data.read().await;
        let now = Utc::now();
        Ok(keys
            .iter()
            .filter(|key| data.contains(key, now))
            .cloned()
            .collect())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let data = self.data.read().await;
        Ok(data.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, HashMap<String, String>>> {
        let data = self.data.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| data.hashes.get(key).map(|h| (key.clone(), h.clone())))
            .collect())
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>> {
        let data = self.data.read().await;
        Ok(data.sets.get(key).cloned().unwrap_or_default())
    }

    async fn sorted_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>> {
        let data = self.data.read().await;
        Ok(data.sorted_range(key, min, max))
    }

    async fn sorted_range_many(
        &self,
        keys: &[String],
        min: f64,
        max: f64,
    ) -> Result<HashMap<String, Vec<(String, f64)>>> {
        let data = self.data.read().await;
        Ok(keys
            .iter()
            .map(|key| (key.clone(), data.sorted_range(key, min, max)))
            .filter(|(_, members)| !members.is_empty())
            .collect())
    }

    async fn sorted_top_many(&self, keys: &[String]) -> Result<HashMap<String, (String, f64)>> {
        let data = self.data.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let zset = data.sorted.get(key)?;
                zset.iter()
                    .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)))
                    .map(|(member, score)| (key.clone(), (member.clone(), *score)))
            })
            .collect())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let data = self.data.read().await;
        Ok(data.lists.get(key).cloned().unwrap_or_default())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read().await;
        let now = Utc::now();
        let mut keys: BTreeSet<String> = BTreeSet::new();
        keys.extend(
            data.strings
                .iter()
                .filter(|(_, v)| v.live(now))
                .map(|(k, _)| k.clone()),
        );
        keys.extend(data.hashes.keys().cloned());
        keys.extend(data.sets.keys().cloned());
        keys.extend(data.sorted.keys().cloned());
        keys.extend(data.lists.keys().cloned());
        Ok(keys.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }

    async fn execute(&self, batch: Batch) -> Result<()> {
        let mut data = self.data.write().await;
        let now = Utc::now();
        for command in batch.into_commands() {
            data.apply(command, now);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    async fn run(store: &MemoryStore, batch: Batch) {
        let Ok(()) = store.execute(batch).await else {
            panic!("memory batch cannot fail");
        };
    }

    #[tokio::test]
    async fn set_if_absent_keeps_existing_value() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch.set("k", "first").set_if_absent("k", "second");
        run(&store, batch).await;
        assert_eq!(store.get("k").await.ok().flatten().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn get_set_returns_previous_value() {
        let store = MemoryStore::new("test");
        assert_eq!(store.get_set("lock", "true").await.ok(), Some(None));
        assert_eq!(
            store.get_set("lock", "true").await.ok().flatten().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn zero_ttl_value_is_already_expired() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch.set_with_ttl("k", "v", 0);
        run(&store, batch).await;
        assert_eq!(store.get("k").await.ok(), Some(None));
        assert_eq!(
            store.existing_keys(&["k".to_string()]).await.ok(),
            Some(BTreeSet::new())
        );
    }

    #[tokio::test]
    async fn incr_by_accumulates_and_orders() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch
            .sorted_incr_by("z", "a", 2.0)
            .sorted_incr_by("z", "b", 1.0)
            .sorted_incr_by("z", "a", 3.0)
            .sorted_incr_by("z", "c", 1.0);
        run(&store, batch).await;

        let Ok(top) = store.sorted_top_many(&["z".to_string(), "none".to_string()]).await else {
            panic!("read");
        };
        assert_eq!(top.len(), 1);
        assert_eq!(top.get("z"), Some(&("a".to_string(), 5.0)));

        let Ok(range) = store.sorted_range_by_score("z", f64::NEG_INFINITY, 1.0).await else {
            panic!("read");
        };
        assert_eq!(range, vec![("b".to_string(), 1.0), ("c".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn remove_range_by_score_is_inclusive() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch
            .sorted_add("z", "old", 10.0)
            .sorted_add("z", "edge", 20.0)
            .sorted_add("z", "new", 30.0)
            .sorted_remove_range_by_score("z", f64::NEG_INFINITY, 20.0);
        run(&store, batch).await;
        let Ok(left) = store.sorted_range_by_score("z", f64::NEG_INFINITY, f64::INFINITY).await
        else {
            panic!("read");
        };
        assert_eq!(left, vec![("new".to_string(), 30.0)]);
    }

    #[tokio::test]
    async fn delete_and_prefix_scan_cover_all_types() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch
            .set("Idx:a", "1")
            .hash_set("Idx:b", "f", "v")
            .set_add("Idx:c", vec!["m".to_string()])
            .sorted_add("Idx:d", "m", 1.0)
            .list_push("Other", "x");
        run(&store, batch).await;

        let Ok(keys) = store.keys_with_prefix("Idx:").await else {
            panic!("read");
        };
        assert_eq!(keys, vec!["Idx:a", "Idx:b", "Idx:c", "Idx:d"]);

        let mut batch = Batch::new();
        batch.delete(keys);
        run(&store, batch).await;
        assert_eq!(store.keys_with_prefix("Idx:").await.ok(), Some(Vec::new()));
        assert_eq!(store.list_range("Other").await.ok(), Some(vec!["x".to_string()]));
    }

    #[tokio::test]
    async fn removing_last_set_member_drops_key() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch
            .set_add("s", vec!["a".to_string()])
            .set_remove("s", vec!["a".to_string()]);
        run(&store, batch).await;
        assert_eq!(
            store.existing_keys(&["s".to_string()]).await.ok(),
            Some(BTreeSet::new())
        );
    }

    #[tokio::test]
    async fn bulk_reads_skip_absent_keys() {
        let store = MemoryStore::new("test");
        let mut batch = Batch::new();
        batch
            .set("s1", "one")
            .hash_set("h1", "f", "v")
            .sorted_add("z1", "low", 1.0)
            .sorted_add("z1", "high", 9.0)
            .sorted_add("z2", "tie-a", 2.0)
            .sorted_add("z2", "tie-b", 2.0);
        run(&store, batch).await;
        let keys: Vec<String> = ["s1", "h1", "z1", "z2", "missing"]
            .iter()
            .map(|k| (*k).to_string())
            .collect();

        let Ok(strings) = store.get_many(&keys).await else {
            panic!("get_many");
        };
        assert_eq!(strings.len(), 1);
        assert_eq!(strings.get("s1").map(String::as_str), Some("one"));

        let Ok(existing) = store.existing_keys(&keys).await else {
            panic!("existing");
        };
        assert_eq!(existing.len(), 4);
        assert!(!existing.contains("missing"));

        let Ok(hashes) = store.hash_get_all_many(&keys).await else {
            panic!("hashes");
        };
        assert_eq!(hashes.keys().collect::<Vec<_>>(), vec!["h1"]);

        let Ok(ranges) = store.sorted_range_many(&keys, 0.0, 5.0).await else {
            panic!("ranges");
        };
        assert_eq!(ranges.get("z1"), Some(&vec![("low".to_string(), 1.0)]));
        assert_eq!(ranges.get("z2").map(Vec::len), Some(2));

        let Ok(top) = store.sorted_top_many(&keys).await else {
            panic!("top");
        };
        assert_eq!(top.get("z2"), Some(&("tie-b".to_string(), 2.0)));
    }
}
