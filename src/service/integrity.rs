//! Thing index integrity check.

use crate::error::Result;
use crate::persistence::{Batch, Store, keys};

/// Finds Thing index entries without metadata and stages their removal.
///
/// Returns the batch (empty if the index is consistent) and the orphaned
/// hashes.
///
/// # Errors
///
/// Returns a store error if a read fails.
pub async fn check_thing_index<S: Store>(store: &S) -> Result<(Batch, Vec<String>)> {
    let ids = store.set_members(keys::THING_INDEX).await?;
    tracing::info!(things = ids.len(), "checking thing index integrity");

    let metadata_keys: Vec<String> = ids.iter().map(|id| keys::thing_metadata(id)).collect();
    let present = store.existing_keys(&metadata_keys).await?;
    let mut orphans = Vec::new();
    for (id, key) in ids.into_iter().zip(&metadata_keys) {
        if !present.contains(key) {
            tracing::warn!(thing = %id, "removing index entry without metadata");
            orphans.push(id);
        }
    }

    let mut batch = Batch::new();
    batch.set_remove(keys::THING_INDEX, orphans.clone());
    Ok((batch, orphans))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[tokio::test]
    async fn orphaned_ids_are_removed() {
        let store = MemoryStore::new("test");
        let mut seed = Batch::new();
        seed.set_add(keys::THING_INDEX, vec!["a".to_string(), "b".to_string()])
            .hash_set(keys::thing_metadata("a"), "FullName", "\"Alpha\"");
        let Ok(()) = store.execute(seed).await else {
            panic!("seed");
        };

        let Ok((batch, orphans)) = check_thing_index(&store).await else {
            panic!("check");
        };
        assert_eq!(orphans, vec!["b".to_string()]);
        let Ok(()) = store.execute(batch).await else {
            panic!("execute");
        };
        let Ok(ids) = store.set_members(keys::THING_INDEX).await else {
            panic!("read");
        };
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn consistent_index_stages_nothing() {
        let store = MemoryStore::new("test");
        let Ok((batch, orphans)) = check_thing_index(&store).await else {
            panic!("check");
        };
        assert!(batch.is_empty());
        assert!(orphans.is_empty());
    }
}
