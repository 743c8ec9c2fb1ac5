//! Engine error types.
//!
//! [`MarketError`] is the central error type for the maintenance engine.
//! Most anomalies the engine meets during a cycle (bracket misses, missing
//! snapshots, vote stalemates) are handled locally and only logged; the
//! variants below are the ones that abort a cycle or a start-up step.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Error enum for the maintenance engine.
///
/// # Recovery classes
///
/// | Variant              | Recoverable | Typical origin                     |
/// |----------------------|-------------|------------------------------------|
/// | `MaintenanceLocked`  | yes         | another runner holds the run-lock  |
/// | `InvalidSetting`     | no          | corrupt settings hash in the store |
/// | `InvalidBrackets`    | no          | bracket table fails validation     |
/// | `Database`/`Store`   | no          | backend failure mid-cycle          |
/// | `Config`             | no          | bad process environment            |
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// The run-lock for the market is already held.
    #[error("market {0} is already in maintenance mode")]
    MaintenanceLocked(String),

    /// A runtime setting stored for the market could not be parsed.
    #[error("invalid setting {field}: {value:?}")]
    InvalidSetting {
        /// Settings field name.
        field: String,
        /// Raw stored value (`None` if missing).
        value: Option<String>,
    },

    /// The price bracket table is empty, inverted or overlapping.
    #[error("invalid price brackets: {0}")]
    InvalidBrackets(String),

    /// Process configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Store-level failure that is not a driver error.
    #[error("store error: {0}")]
    Store(String),

    /// Error returned by the Postgres driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure (market report).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketError {
    /// Returns `true` if the runner may simply skip the market this pass
    /// and try again later without operator intervention.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MaintenanceLocked(_))
    }
}
