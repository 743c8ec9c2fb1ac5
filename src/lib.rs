//! # market-keeper
//!
//! Unattended maintenance engine for the market of a multiplayer trading
//! post.
//!
//! Once a day, inside an announced maintenance window, the keeper locks
//! each market, reprices every Thing from player votes and trade volume,
//! normalizes stock, draws a discounted sale and rebuilds the
//! letter-frequency name search indexes. All state lives in a per-market
//! key-value store shared with the game API.
//!
//! ## Architecture
//!
//! ```text
//! main (poll loop, one keeper per market)
//!     │
//!     ├── MarketKeeper (service/)
//!     │     ├── MaintenanceScheduler: window, run-lock
//!     │     └── MaintenanceCycle: pricing, stock, sale, report, name index
//!     │
//!     ├── Thing, Colony, BracketTable (domain/)
//!     │
//!     └── Store (persistence/)
//!           ├── PostgresStore (sqlx)
//!           └── MemoryStore
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
