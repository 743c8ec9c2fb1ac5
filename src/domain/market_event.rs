//! Notifications handed to downstream consumers.
//!
//! Events are serialized to JSON and appended to the market's outbox list
//! in the same atomic batch as the state change they describe, so a
//! consumer never sees an announcement for a sale that was not persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One discounted Thing in a sale batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleItem {
    /// Thing hash.
    pub thing: String,
    /// Display name at the time of the sale.
    pub name: String,
    /// Discount in percent.
    pub discount: u32,
    /// Discounted buy quote.
    pub buy_price: f64,
    /// Discounted sell quote.
    pub sell_price: f64,
}

/// Event emitted by the maintenance engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// A maintenance window was pre-announced.
    MaintenanceWindowScheduled {
        /// Market name.
        market: String,
        /// Window opening time.
        start: DateTime<Utc>,
        /// Window closing time.
        stop: DateTime<Utc>,
        /// When the window was scheduled.
        timestamp: DateTime<Utc>,
    },

    /// A new batch of Things went on sale.
    SaleAnnounced {
        /// Market name.
        market: String,
        /// Maintenance cycle that selected the batch.
        run_id: Uuid,
        /// Discounted Things.
        items: Vec<SaleItem>,
        /// Selection time.
        timestamp: DateTime<Utc>,
    },
}

impl MarketEvent {
    /// Short discriminator used in log lines.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MaintenanceWindowScheduled { .. } => "maintenance_window_scheduled",
            Self::SaleAnnounced { .. } => "sale_announced",
        }
    }
}
