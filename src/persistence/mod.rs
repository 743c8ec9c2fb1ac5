//! Persistence layer: market key-value store and entity snapshots.
//!
//! [`Store`] is the contract the engine works against. [`PostgresStore`]
//! backs it with `sqlx::PgPool` for production; [`MemoryStore`] keeps
//! everything in process for tests and rehearsals. [`EntityRepository`]
//! maps Thing and Colony snapshots onto the key layout in [`keys`].

pub mod entities;
pub mod keys;
pub mod memory;
pub mod models;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use entities::{EntityRepository, stage_thing};
pub use memory::MemoryStore;
pub use outbox::stage_event;
pub use postgres::{PostgresStore, connect};
pub use store::{Batch, Command, Store};
