//! PostgreSQL implementation of the market store.
//!
//! Each value type lives in its own table keyed by `(market, key)`, so one
//! database serves every market. Batches run inside a single transaction.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};

use super::store::{Batch, Command, Store};
use crate::config::KeeperConfig;
use crate::error::Result;

/// Opens the connection pool and applies pending migrations.
///
/// # Errors
///
/// Returns [`crate::error::MarketError::Database`] if the database cannot
/// be reached and [`crate::error::MarketError::Migration`] if the schema
/// cannot be brought up to date.
pub async fn connect(config: &KeeperConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "database ready"
    );
    Ok(pool)
}

/// Postgres-backed store scoped to one market.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    market: String,
}

impl PostgresStore {
    /// Creates a store for `market` over a shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool, market: impl Into<String>) -> Self {
        Self {
            pool,
            market: market.into(),
        }
    }

    async fn apply(&self, conn: &mut PgConnection, command: Command) -> Result<()> {
        let market = self.market.as_str();
        match command {
            Command::Set {
                key,
                value,
                ttl_secs,
            } => {
                let expires_at = ttl_secs
                    .and_then(|secs| i64::try_from(secs).ok())
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
                sqlx::query(
                    "INSERT INTO kv_strings (market, key, value, expires_at) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (market, key) DO UPDATE \
                     SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
                )
                .bind(market)
                .bind(key)
                .bind(value)
                .bind(expires_at)
                .execute(&mut *conn)
                .await?;
            }
            Command::SetIfAbsent { key, value } => {
                sqlx::query(
                    "INSERT INTO kv_strings (market, key, value, expires_at) VALUES ($1, $2, $3, NULL) \
                     ON CONFLICT (market, key) DO UPDATE \
                     SET value = EXCLUDED.value, expires_at = NULL \
                     WHERE kv_strings.expires_at IS NOT NULL AND kv_strings.expires_at <= now()",
                )
                .bind(market)
                .bind(key)
                .bind(value)
                .execute(&mut *conn)
                .await?;
            }
            Command::Delete { keys } => {
                for table in ["kv_strings", "kv_hashes", "kv_sets", "kv_sorted", "kv_lists"] {
                    sqlx::query(&format!(
                        "DELETE FROM {table} WHERE market = $1 AND key = ANY($2)"
                    ))
                    .bind(market)
                    .bind(&keys)
                    .execute(&mut *conn)
                    .await?;
                }
            }
            Command::HashSet { key, field, value } => {
                sqlx::query(
                    "INSERT INTO kv_hashes (market, key, field, value) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (market, key, field) DO UPDATE SET value = EXCLUDED.value",
                )
                .bind(market)
                .bind(key)
                .bind(field)
                .bind(value)
                .execute(&mut *conn)
                .await?;
            }
            Command::HashSetIfAbsent { key, field, value } => {
                sqlx::query(
                    "INSERT INTO kv_hashes (market, key, field, value) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (market, key, field) DO NOTHING",
                )
                .bind(market)
                .bind(key)
                .bind(field)
                .bind(value)
                .execute(&mut *conn)
                .await?;
            }
            Command::SetAdd { key, members } => {
                sqlx::query(
                    "INSERT INTO kv_sets (market, key, member) \
                     SELECT $1, $2, UNNEST($3::TEXT[]) \
                     ON CONFLICT (market, key, member) DO NOTHING",
                )
                .bind(market)
                .bind(key)
                .bind(&members)
                .execute(&mut *conn)
                .await?;
            }
            Command::SetRemove { key, members } => {
                sqlx::query("DELETE FROM kv_sets WHERE market = $1 AND key = $2 AND member = ANY($3)")
                    .bind(market)
                    .bind(key)
                    .bind(&members)
                    .execute(&mut *conn)
                    .await?;
            }
            Command::SortedAdd { key, member, score } => {
                sqlx::query(
                    "INSERT INTO kv_sorted (market, key, member, score) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (market, key, member) DO UPDATE SET score = EXCLUDED.score",
                )
                .bind(market)
                .bind(key)
                .bind(member)
                .bind(score)
                .execute(&mut *conn)
                .await?;
            }
            Command::SortedIncrBy { key, member, delta } => {
                sqlx::query(
                    "INSERT INTO kv_sorted (market, key, member, score) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (market, key, member) DO UPDATE \
                     SET score = kv_sorted.score + EXCLUDED.score",
                )
                .bind(market)
                .bind(key)
                .bind(member)
                .bind(delta)
                .execute(&mut *conn)
                .await?;
            }
            Command::SortedRemoveRangeByScore { key, min, max } => {
                sqlx::query(
                    "DELETE FROM kv_sorted WHERE market = $1 AND key = $2 AND score >= $3 AND score <= $4",
                )
                .bind(market)
                .bind(key)
                .bind(min)
                .bind(max)
                .execute(&mut *conn)
                .await?;
            }
            Command::ListPush { key, value } => {
                sqlx::query("INSERT INTO kv_lists (market, key, value) VALUES ($1, $2, $3)")
                    .bind(market)
                    .bind(key)
                    .bind(value)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }
}

impl Store for PostgresStore {
    fn market(&self) -> &str {
        &self.market
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_strings WHERE market = $1 AND key = $2 \
             AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(&self.market)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn get_set(&self, key: &str, value: &str) -> Result<Option<String>> {
        let previous = sqlx::query_scalar::<_, Option<String>>(
            "WITH previous AS ( \
                 SELECT value, expires_at FROM kv_strings \
                 WHERE market = $1 AND key = $2 FOR UPDATE \
             ) \
             INSERT INTO kv_strings (market, key, value, expires_at) VALUES ($1, $2, $3, NULL) \
             ON CONFLICT (market, key) DO UPDATE SET value = EXCLUDED.value, expires_at = NULL \
             RETURNING (SELECT value FROM previous \
                        WHERE expires_at IS NULL OR expires_at > now())",
        )
        .bind(&self.market)
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;
        Ok(previous)
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM kv_strings WHERE market = $1 AND key = ANY($2) \
             AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(&self.market)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<BTreeSet<String>> {
        if keys.is_empty() {
            return Ok(BTreeSet::new());
        }
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT key FROM kv_strings WHERE market = $1 AND key = ANY($2) \
                 AND (expires_at IS NULL OR expires_at > now()) \
             UNION SELECT key FROM kv_hashes WHERE market = $1 AND key = ANY($2) \
             UNION SELECT key FROM kv_sets WHERE market = $1 AND key = ANY($2) \
             UNION SELECT key FROM kv_sorted WHERE market = $1 AND key = ANY($2) \
             UNION SELECT key FROM kv_lists WHERE market = $1 AND key = ANY($2)",
        )
        .bind(&self.market)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT field, value FROM kv_hashes WHERE market = $1 AND key = $2",
        )
        .bind(&self.market)
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, HashMap<String, String>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT key, field, value FROM kv_hashes WHERE market = $1 AND key = ANY($2)",
        )
        .bind(&self.market)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        let mut hashes: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (key, field, value) in rows {
            hashes.entry(key).or_default().insert(field, value);
        }
        Ok(hashes)
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT member FROM kv_sets WHERE market = $1 AND key = $2",
        )
        .bind(&self.market)
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn sorted_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query_as::<_, (String, f64)>(
            "SELECT member, score FROM kv_sorted \
             WHERE market = $1 AND key = $2 AND score >= $3 AND score <= $4 \
             ORDER BY score ASC, member ASC",
        )
        .bind(&self.market)
        .bind(key)
        .bind(min)
        .bind(max)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn sorted_range_many(
        &self,
        keys: &[String],
        min: f64,
        max: f64,
    ) -> Result<HashMap<String, Vec<(String, f64)>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, String, f64)>(
            "SELECT key, member, score FROM kv_sorted \
             WHERE market = $1 AND key = ANY($2) AND score >= $3 AND score <= $4 \
             ORDER BY key, score ASC, member ASC",
        )
        .bind(&self.market)
        .bind(keys)
        .bind(min)
        .bind(max)
        .fetch_all(&self.pool)
        .await?;
        let mut ranges: HashMap<String, Vec<(String, f64)>> = HashMap::new();
        for (key, member, score) in rows {
            ranges.entry(key).or_default().push((member, score));
        }
        Ok(ranges)
    }

    async fn sorted_top_many(&self, keys: &[String]) -> Result<HashMap<String, (String, f64)>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (String, String, f64)>(
            "SELECT DISTINCT ON (key) key, member, score FROM kv_sorted \
             WHERE market = $1 AND key = ANY($2) \
             ORDER BY key, score DESC, member DESC",
        )
        .bind(&self.market)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(key, member, score)| (key, (member, score)))
            .collect())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_lists WHERE market = $1 AND key = $2 ORDER BY position ASC",
        )
        .bind(&self.market)
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT key FROM kv_strings WHERE market = $1 AND left(key, length($2)) = $2 \
                 AND (expires_at IS NULL OR expires_at > now()) \
             UNION SELECT key FROM kv_hashes WHERE market = $1 AND left(key, length($2)) = $2 \
             UNION SELECT key FROM kv_sets WHERE market = $1 AND left(key, length($2)) = $2 \
             UNION SELECT key FROM kv_sorted WHERE market = $1 AND left(key, length($2)) = $2 \
             UNION SELECT key FROM kv_lists WHERE market = $1 AND left(key, length($2)) = $2 \
             ORDER BY key",
        )
        .bind(&self.market)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn execute(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let staged = batch.len();
        let mut tx = self.pool.begin().await?;
        for command in batch.into_commands() {
            self.apply(&mut tx, command).await?;
        }
        tx.commit().await?;
        tracing::debug!(market = %self.market, commands = staged, "batch committed");
        Ok(())
    }
}
