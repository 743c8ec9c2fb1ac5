//! Per-market driver: one [`MarketKeeper::tick`] per poll.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::Result;
use crate::persistence::Store;
use crate::service::cycle::{CycleReport, MaintenanceCycle};
use crate::service::scheduler::{MaintenanceScheduler, MaintenanceWindow};
use crate::service::settings::{self, MarketSettings};

/// What a tick did.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// The cycle is not due.
    Waiting {
        /// Window announced during this tick, if any.
        window: Option<MaintenanceWindow>,
    },
    /// A cycle ran and the run-lock was released.
    Completed(Box<CycleReport>),
}

/// Wall-clock end of a cycle that started at `start` and ran for `elapsed`.
pub(crate) fn cycle_end(start: DateTime<Utc>, elapsed: std::time::Duration) -> DateTime<Utc> {
    start + Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero())
}

/// Keeps one market: schedules its window and runs its cycle.
#[derive(Debug)]
pub struct MarketKeeper<S> {
    store: S,
    dry_run: bool,
    report_dir: Option<PathBuf>,
}

impl<S: Store> MarketKeeper<S> {
    /// Creates a keeper over `store`.
    #[must_use]
    pub const fn new(store: S, dry_run: bool, report_dir: Option<PathBuf>) -> Self {
        Self {
            store,
            dry_run,
            report_dir,
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Seeds missing settings.
    ///
    /// # Errors
    ///
    /// Returns a store or encoding error if seeding fails.
    pub async fn bootstrap(&self) -> Result<()> {
        settings::bootstrap(&self.store).await
    }

    /// Advances the market at `now`.
    ///
    /// Announces the window when it is near, and runs the cycle when it is
    /// due or `force` is set. The next run is anchored on the day the cycle
    /// ends. A failed cycle leaves the run-lock held.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::MarketError::MaintenanceLocked`] if another
    /// runner holds the lock, or any settings, store, encoding or I/O
    /// error of the pass.
    pub async fn tick<R: Rng>(
        &self,
        now: DateTime<Utc>,
        force: bool,
        rng: &mut R,
    ) -> Result<TickOutcome> {
        let settings = MarketSettings::load(&self.store).await?;
        let mut scheduler = MaintenanceScheduler::new(&self.store, &settings, !self.dry_run);

        let window = scheduler.update_maintenance_window(now).await?;
        if !force && !scheduler.should_run(now).await? {
            return Ok(TickOutcome::Waiting { window });
        }
        if force {
            tracing::info!(market = %self.store.market(), "forced run");
        }

        scheduler.enable_maintenance_mode().await?;
        let started = Instant::now();
        let cycle = MaintenanceCycle::new(
            &self.store,
            &settings,
            self.dry_run,
            self.report_dir.as_deref(),
        );
        let report = match cycle.run(now, rng).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(
                    market = %self.store.market(),
                    error = %e,
                    "maintenance cycle failed, market stays locked"
                );
                return Err(e);
            }
        };
        scheduler
            .exit_maintenance_mode(cycle_end(now, started.elapsed()))
            .await?;
        Ok(TickOutcome::Completed(Box::new(report)))
    }
}
