//! Key-value store contract.
//!
//! The engine talks to its backing store through [`Store`]: a small set of
//! reads over strings, hashes, sets, sorted sets and lists, plus
//! [`Store::execute`] which applies a staged [`Batch`] of writes
//! atomically. Every store instance is scoped to one market.

use std::collections::{BTreeSet, HashMap};

use crate::error::Result;

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set a string value, optionally expiring after `ttl_secs`.
    Set {
        /// Key.
        key: String,
        /// Value.
        value: String,
        /// Seconds until the value expires.
        ttl_secs: Option<u64>,
    },
    /// Set a string value only if the key holds none.
    SetIfAbsent {
        /// Key.
        key: String,
        /// Value.
        value: String,
    },
    /// Delete keys of any type.
    Delete {
        /// Keys to delete.
        keys: Vec<String>,
    },
    /// Set one hash field.
    HashSet {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
        /// Field value.
        value: String,
    },
    /// Set one hash field only if it is not present.
    HashSetIfAbsent {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
        /// Field value.
        value: String,
    },
    /// Add members to a set.
    SetAdd {
        /// Set key.
        key: String,
        /// Members to add.
        members: Vec<String>,
    },
    /// Remove members from a set.
    SetRemove {
        /// Set key.
        key: String,
        /// Members to remove.
        members: Vec<String>,
    },
    /// Insert or overwrite a sorted-set member.
    SortedAdd {
        /// Sorted set key.
        key: String,
        /// Member.
        member: String,
        /// Score.
        score: f64,
    },
    /// Increase a sorted-set member's score, creating it at `delta`.
    SortedIncrBy {
        /// Sorted set key.
        key: String,
        /// Member.
        member: String,
        /// Amount added to the score.
        delta: f64,
    },
    /// Remove sorted-set members whose score lies in `[min, max]`.
    SortedRemoveRangeByScore {
        /// Sorted set key.
        key: String,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// Append to a list.
    ListPush {
        /// List key.
        key: String,
        /// Value appended at the tail.
        value: String,
    },
}

/// Writes staged in memory and applied as one atomic unit.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an arbitrary command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Stages a string write.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
            ttl_secs: None,
        })
    }

    /// Stages a string write that expires after `ttl_secs`.
    pub fn set_with_ttl(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl_secs: u64,
    ) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
            ttl_secs: Some(ttl_secs),
        })
    }

    /// Stages a string write that only happens if the key is absent.
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::SetIfAbsent {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Stages deletion of `keys`. Empty input stages nothing.
    pub fn delete(&mut self, keys: Vec<String>) -> &mut Self {
        if keys.is_empty() {
            return self;
        }
        self.push(Command::Delete { keys })
    }

    /// Stages a hash field write.
    pub fn hash_set(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Command::HashSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    /// Stages a hash field write that keeps any existing value.
    pub fn hash_set_if_absent(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Command::HashSetIfAbsent {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
    }

    /// Stages set additions. Empty input stages nothing.
    pub fn set_add(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        if members.is_empty() {
            return self;
        }
        self.push(Command::SetAdd {
            key: key.into(),
            members,
        })
    }

    /// Stages set removals. Empty input stages nothing.
    pub fn set_remove(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        if members.is_empty() {
            return self;
        }
        self.push(Command::SetRemove {
            key: key.into(),
            members,
        })
    }

    /// Stages a sorted-set insert.
    pub fn sorted_add(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> &mut Self {
        self.push(Command::SortedAdd {
            key: key.into(),
            member: member.into(),
            score,
        })
    }

    /// Stages a sorted-set increment.
    pub fn sorted_incr_by(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        delta: f64,
    ) -> &mut Self {
        self.push(Command::SortedIncrBy {
            key: key.into(),
            member: member.into(),
            delta,
        })
    }

    /// Stages removal of sorted-set members scored within `[min, max]`.
    pub fn sorted_remove_range_by_score(
        &mut self,
        key: impl Into<String>,
        min: f64,
        max: f64,
    ) -> &mut Self {
        self.push(Command::SortedRemoveRangeByScore {
            key: key.into(),
            min,
            max,
        })
    }

    /// Stages a list append.
    pub fn list_push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::ListPush {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Number of staged commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Staged commands in order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Consumes the batch, returning its commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Market-scoped key-value store.
///
/// Sorted-set reads order equal scores by member name, ascending for
/// range reads; [`Store::sorted_top_many`] breaks score ties by the
/// greatest member name.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Name of the market this store is scoped to.
    fn market(&self) -> &str;

    /// Reads a string value. Expired values read as absent.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomically replaces a string value and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    async fn get_set(&self, key: &str, value: &str) -> Result<Option<String>>;

    /// Reads several string values in one round trip. Absent or expired
    /// keys are left out.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>>;

    /// Returns the subset of `keys` that hold a value of any type.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn existing_keys(&self, keys: &[String]) -> Result<BTreeSet<String>>;

    /// Reads every field of a hash (empty if absent).
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Reads several whole hashes in one round trip. Absent hashes are left
    /// out.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, HashMap<String, String>>>;

    /// Reads every member of a set (empty if absent).
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>>;

    /// Reads sorted-set members scored within `[min, max]`, lowest first.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn sorted_range_by_score(&self, key: &str, min: f64, max: f64)
    -> Result<Vec<(String, f64)>>;

    /// Reads the members scored within `[min, max]` of several sorted sets
    /// in one round trip, lowest first per set. Sets with no such member
    /// are left out.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn sorted_range_many(
        &self,
        keys: &[String],
        min: f64,
        max: f64,
    ) -> Result<HashMap<String, Vec<(String, f64)>>>;

    /// Reads the highest scored member of each of several sorted sets in
    /// one round trip. Empty sets are left out.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn sorted_top_many(&self, keys: &[String]) -> Result<HashMap<String, (String, f64)>>;

    /// Reads a whole list, head first.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;

    /// Lists every key starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Applies every command of `batch` atomically, in order.
    ///
    /// # Errors
    ///
    /// Returns a backend error if any command fails; no command of the
    /// batch is applied in that case.
    async fn execute(&self, batch: Batch) -> Result<()>;
}
