//! Letter-frequency name search.
//!
//! Names are reduced to a bag of lower-cased alphanumeric characters. For
//! every character the index keeps a sorted set of entity ids scored by how
//! often the character occurs in the entity's names. A query is answered by
//! summing, per entity, the scores of the query's distinct characters.
//!
//! This ranking ignores letter order, so anagrams score identically.

use std::collections::{BTreeMap, HashMap};

use crate::domain::Colony;
use crate::error::Result;
use crate::persistence::{Batch, EntityRepository, Store, keys};

/// Votes a proposed localized name needs before it becomes canonical.
pub const MIN_NAME_VOTES: f64 = 2.0;

/// Which entity family an index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Tradable item types.
    Things,
    /// Player settlements.
    Colonies,
}

impl IndexKind {
    /// Key prefix of the per-character sorted sets.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Things => keys::THING_NAME_INDEX_PREFIX,
            Self::Colonies => keys::COLONY_NAME_INDEX_PREFIX,
        }
    }

    fn letter_key(self, letter: char) -> String {
        format!("{}{letter}", self.prefix())
    }
}

/// Counts each lower-cased alphanumeric character of `text`.
#[must_use]
pub fn letter_counts(text: &str) -> BTreeMap<char, u32> {
    let mut counts = BTreeMap::new();
    for letter in text
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
    {
        *counts.entry(letter).or_insert(0) += 1;
    }
    counts
}

/// Counters for one index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Entities that contributed at least one name.
    pub entities: usize,
    /// Names indexed.
    pub names: usize,
    /// Localized names promoted to canonical this rebuild.
    pub promoted: usize,
    /// Entities skipped for missing metadata.
    pub skipped: usize,
}

fn stage_name(kind: IndexKind, id: &str, name: &str, batch: &mut Batch) {
    for (letter, count) in letter_counts(name) {
        batch.sorted_incr_by(kind.letter_key(letter), id, f64::from(count));
    }
}

async fn stage_clear<S: Store>(store: &S, kind: IndexKind, batch: &mut Batch) -> Result<()> {
    let existing = store.keys_with_prefix(kind.prefix()).await?;
    tracing::debug!(index = ?kind, keys = existing.len(), "clearing name index");
    batch.delete(existing);
    Ok(())
}

/// Stages a full rebuild of the Thing name index.
///
/// Every indexed Thing contributes its canonical name plus, per known
/// language, its localized name. A localized proposal with at least
/// [`MIN_NAME_VOTES`] votes that differs from the stored name is promoted
/// and stored first.
///
/// # Errors
///
/// Returns a store error if a read fails.
pub async fn stage_thing_index<S: Store>(store: &S) -> Result<(Batch, IndexStats)> {
    let repo = EntityRepository::new(store);
    let mut batch = Batch::new();
    let mut stats = IndexStats::default();
    stage_clear(store, IndexKind::Things, &mut batch).await?;

    let ids = repo.thing_ids().await?;
    let names = repo.load_thing_names().await?;
    stats.skipped = ids.len().saturating_sub(names.len());
    for (id, name) in &names {
        stage_name(IndexKind::Things, id, name, &mut batch);
        stats.names += 1;
    }
    stats.entities = names.len();

    let languages = store.set_members(keys::KNOWN_LANGUAGES).await?;
    for language in &languages {
        tracing::debug!(language = %language, "indexing localized thing names");
        let name_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::thing_localized_name(language, id))
            .collect();
        let proposal_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::thing_name_proposals(language, id))
            .collect();
        let mut current = store.get_many(&name_keys).await?;
        let mut proposals = store.sorted_top_many(&proposal_keys).await?;

        for ((id, key), proposal_key) in ids.iter().zip(name_keys).zip(&proposal_keys) {
            let mut name = current.remove(&key);
            if let Some((proposed, votes)) = proposals.remove(proposal_key) {
                if votes < MIN_NAME_VOTES {
                    tracing::debug!(thing = %id, language = %language, votes, "name proposal rejected");
                } else if name.as_deref() != Some(proposed.as_str()) {
                    tracing::debug!(
                        thing = %id,
                        language = %language,
                        name = %proposed,
                        votes,
                        "name proposal accepted"
                    );
                    batch.set(key, proposed.clone());
                    stats.promoted += 1;
                    name = Some(proposed);
                }
            }
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                stage_name(IndexKind::Things, id, &name, &mut batch);
                stats.names += 1;
            }
        }
    }

    Ok((batch, stats))
}

/// Stages a full rebuild of the Colony name index from `colonies`.
///
/// Colonies without complete metadata are skipped.
///
/// # Errors
///
/// Returns a store error if the existing index cannot be listed.
pub async fn stage_colony_index<S: Store>(
    store: &S,
    colonies: &BTreeMap<String, Option<Colony>>,
) -> Result<(Batch, IndexStats)> {
    let mut batch = Batch::new();
    let mut stats = IndexStats::default();
    stage_clear(store, IndexKind::Colonies, &mut batch).await?;

    for (id, colony) in colonies {
        let Some(colony) = colony else {
            stats.skipped += 1;
            continue;
        };
        for name in colony.searchable_names() {
            stage_name(IndexKind::Colonies, id, name, &mut batch);
            stats.names += 1;
        }
        stats.entities += 1;
    }

    Ok((batch, stats))
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Entity hash.
    pub id: String,
    /// Summed letter score.
    pub score: f64,
}

/// Ranks entities by how many of the query's letters their names contain.
///
/// Results are ordered by score, highest first, then by id.
///
/// # Errors
///
/// Returns a store error if a read fails.
pub async fn search<S: Store>(
    store: &S,
    kind: IndexKind,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchHit>> {
    let letter_keys: Vec<String> = letter_counts(query)
        .into_keys()
        .map(|letter| kind.letter_key(letter))
        .collect();
    let letter_sets = store
        .sorted_range_many(&letter_keys, f64::NEG_INFINITY, f64::INFINITY)
        .await?;
    let mut scores: HashMap<String, f64> = HashMap::new();
    for (id, score) in letter_sets.into_values().flatten() {
        *scores.entry(id).or_insert(0.0) += score;
    }

    let mut hits: Vec<SearchHit> = scores
        .into_iter()
        .map(|(id, score)| SearchHit { id, score })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    if let Some(limit) = limit {
        hits.truncate(limit);
    }
    Ok(hits)
}
