//! Service layer: market maintenance logic.
//!
//! [`MarketKeeper`] drives one market per poll. It asks the
//! [`scheduler`] whether a cycle is due and runs a [`MaintenanceCycle`],
//! which chains the [`pricing`], [`stock`] and [`sale`] passes before
//! rebuilding the [`name_index`].

pub mod cycle;
pub mod integrity;
pub mod market_keeper;
pub mod name_index;
pub mod pricing;
pub mod report;
pub mod sale;
pub mod scheduler;
pub mod settings;
pub mod stock;

pub use cycle::{CycleReport, MaintenanceCycle};
pub use market_keeper::{MarketKeeper, TickOutcome};
pub use name_index::{IndexKind, SearchHit, search};
pub use scheduler::{MaintenanceScheduler, MaintenanceWindow, SchedulerPhase};
pub use settings::MarketSettings;
