//! Maintenance window scheduling and the run-lock.
//!
//! A market moves through three phases:
//!
//! ```text
//! Idle ──(preamble reached)──▶ WindowPending ──(lock taken)──▶ InMaintenance
//!   ▲                                                               │
//!   └──────────────────────(cycle finished)─────────────────────────┘
//! ```
//!
//! The run-lock is the [`keys::MAINTENANCE_MODE`] flag the game API also
//! reads to refuse trades during maintenance. It has no lease: a runner
//! that dies mid-cycle leaves the market locked until an operator clears
//! the flag.

use chrono::{DateTime, Duration, Utc};

use crate::domain::MarketEvent;
use crate::error::{MarketError, Result};
use crate::persistence::{Batch, Store, keys, stage_event};
use crate::service::settings::{MarketSettings, fields};

/// Scheduler phase derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// No window announced.
    Idle,
    /// A window is announced and the cycle has not started.
    WindowPending,
    /// The run-lock is held.
    InMaintenance,
}

/// An announced maintenance window, `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceWindow {
    /// Opening time.
    pub start: DateTime<Utc>,
    /// Closing time.
    pub stop: DateTime<Utc>,
}

fn anchored(now: DateTime<Utc>, start_hour: u32) -> Option<DateTime<Utc>> {
    Some(now.date_naive().and_hms_opt(start_hour, 0, 0)?.and_utc())
}

/// The window to announce at `now`: today's at `start_hour` UTC, or
/// tomorrow's if today's has already closed.
#[must_use]
pub fn window_for(
    now: DateTime<Utc>,
    start_hour: u32,
    length_secs: i64,
) -> Option<MaintenanceWindow> {
    let length = Duration::seconds(length_secs);
    let mut start = anchored(now, start_hour)?;
    if start + length <= now {
        start += Duration::days(1);
    }
    Some(MaintenanceWindow {
        start,
        stop: start + length,
    })
}

/// When the next cycle is due after one finishing at `now`.
#[must_use]
pub fn next_run_after_cycle(now: DateTime<Utc>, start_hour: u32) -> Option<DateTime<Utc>> {
    Some(anchored(now, start_hour)? + Duration::days(1))
}

/// Scheduler of one market, working from the settings read this pass.
#[derive(Debug)]
pub struct MaintenanceScheduler<'a, S> {
    store: &'a S,
    start_hour: u32,
    window_length_secs: i64,
    preamble_secs: i64,
    next_run_at: i64,
    window_already_scheduled: bool,
    announce: bool,
}

impl<'a, S: Store> MaintenanceScheduler<'a, S> {
    /// Creates a scheduler. With `announce` unset no window event is
    /// queued for players.
    #[must_use]
    pub fn new(store: &'a S, settings: &MarketSettings, announce: bool) -> Self {
        Self {
            store,
            start_hour: settings.start_hour,
            window_length_secs: settings.window_length_secs,
            preamble_secs: settings.preamble_secs,
            next_run_at: settings.next_run_at,
            window_already_scheduled: settings.window_already_scheduled,
            announce,
        }
    }

    fn bad_hour(&self) -> MarketError {
        MarketError::InvalidSetting {
            field: fields::START_HOUR.to_string(),
            value: Some(self.start_hour.to_string()),
        }
    }

    /// Returns `true` while the run-lock is held.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn maintenance_mode_active(&self) -> Result<bool> {
        Ok(self.store.get(keys::MAINTENANCE_MODE).await?.as_deref() == Some("true"))
    }

    /// Current phase.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn phase(&self) -> Result<SchedulerPhase> {
        if self.maintenance_mode_active().await? {
            Ok(SchedulerPhase::InMaintenance)
        } else if self.window_already_scheduled {
            Ok(SchedulerPhase::WindowPending)
        } else {
            Ok(SchedulerPhase::Idle)
        }
    }

    /// Returns `true` if the cycle is due and nobody holds the run-lock.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn should_run(&self, now: DateTime<Utc>) -> Result<bool> {
        let remaining = self.next_run_at - now.timestamp();
        tracing::debug!(
            market = %self.store.market(),
            remaining_secs = remaining,
            next_run_at = %DateTime::from_timestamp(self.next_run_at, 0).unwrap_or_default(),
            "time until next run"
        );
        Ok(remaining <= 0 && !self.maintenance_mode_active().await?)
    }

    /// Announces the next window once it is less than the preamble away.
    ///
    /// Returns the window if one was announced. The window hash, the next
    /// run time, the scheduled flag and the announcement are written as
    /// one batch.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidSetting`] if the start hour cannot be
    /// anchored, or a store error if a read or the write fails.
    pub async fn update_maintenance_window(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<MaintenanceWindow>> {
        if self.window_already_scheduled || self.maintenance_mode_active().await? {
            tracing::debug!(
                market = %self.store.market(),
                "already in maintenance mode or window already set"
            );
            return Ok(None);
        }
        if self.next_run_at - now.timestamp() >= self.preamble_secs {
            return Ok(None);
        }

        let window = window_for(now, self.start_hour, self.window_length_secs)
            .ok_or_else(|| self.bad_hour())?;
        let mut batch = Batch::new();
        batch
            .hash_set(
                keys::MAINTENANCE_WINDOW,
                "Start",
                window.start.timestamp().to_string(),
            )
            .hash_set(
                keys::MAINTENANCE_WINDOW,
                "Stop",
                window.stop.timestamp().to_string(),
            )
            .hash_set(
                keys::SETTINGS,
                fields::NEXT_RUN_AT,
                window.start.timestamp().to_string(),
            )
            .hash_set(keys::SETTINGS, fields::WINDOW_SCHEDULED, "true");
        if self.announce {
            stage_event(
                &MarketEvent::MaintenanceWindowScheduled {
                    market: self.store.market().to_string(),
                    start: window.start,
                    stop: window.stop,
                    timestamp: now,
                },
                &mut batch,
            )?;
        }
        self.store.execute(batch).await?;

        self.next_run_at = window.start.timestamp();
        self.window_already_scheduled = true;
        tracing::info!(
            market = %self.store.market(),
            start = %window.start,
            stop = %window.stop,
            "maintenance window scheduled"
        );
        Ok(Some(window))
    }

    /// Takes the run-lock.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::MaintenanceLocked`] if the lock was already
    /// held, or a store error if the write fails.
    pub async fn enable_maintenance_mode(&self) -> Result<()> {
        let previous = self.store.get_set(keys::MAINTENANCE_MODE, "true").await?;
        if previous.as_deref() == Some("true") {
            return Err(MarketError::MaintenanceLocked(
                self.store.market().to_string(),
            ));
        }
        tracing::info!(market = %self.store.market(), "maintenance mode enabled");
        Ok(())
    }

    /// Schedules the next cycle, clears the window flag and releases the
    /// run-lock in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidSetting`] if the start hour cannot be
    /// anchored, or a store error if the write fails.
    pub async fn exit_maintenance_mode(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = next_run_after_cycle(now, self.start_hour).ok_or_else(|| self.bad_hour())?;
        let mut batch = Batch::new();
        batch
            .hash_set(
                keys::SETTINGS,
                fields::NEXT_RUN_AT,
                next.timestamp().to_string(),
            )
            .hash_set(keys::SETTINGS, fields::WINDOW_SCHEDULED, "false")
            .set(keys::MAINTENANCE_MODE, "false");
        self.store.execute(batch).await?;

        self.next_run_at = next.timestamp();
        self.window_already_scheduled = false;
        tracing::info!(market = %self.store.market(), next_run_at = %next, "maintenance mode exited");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::persistence::MemoryStore;
    use crate::service::settings::bootstrap;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        let Some(t) = Utc.with_ymd_and_hms(2026, 5, day, hour, minute, 0).single() else {
            panic!("valid time");
        };
        t
    }

    async fn fresh() -> (MemoryStore, MarketSettings) {
        let store = MemoryStore::new("live");
        let Ok(()) = bootstrap(&store).await else {
            panic!("bootstrap");
        };
        let Ok(settings) = MarketSettings::load(&store).await else {
            panic!("load");
        };
        (store, settings)
    }

    #[test]
    fn window_anchors_today_until_it_closes() {
        let w = window_for(at(10, 21, 30), 23, 3600);
        assert_eq!(w.map(|w| w.start), Some(at(10, 23, 0)));
        assert_eq!(w.map(|w| w.stop), Some(at(11, 0, 0)));

        // Midnight window already over: the next one is tomorrow's.
        let w = window_for(at(10, 22, 30), 0, 3600);
        assert_eq!(w.map(|w| w.start), Some(at(11, 0, 0)));

        // Inside today's window: run now.
        let w = window_for(at(10, 23, 15), 23, 3600);
        assert_eq!(w.map(|w| w.start), Some(at(10, 23, 0)));
    }

    #[test]
    fn next_run_is_tomorrow_at_start_hour() {
        assert_eq!(next_run_after_cycle(at(10, 23, 40), 23), Some(at(11, 23, 0)));
        assert_eq!(next_run_after_cycle(at(10, 0, 10), 0), Some(at(11, 0, 0)));
        assert_eq!(next_run_after_cycle(at(10, 0, 10), 24), None);
    }

    #[tokio::test]
    async fn full_phase_cycle() {
        let (store, settings) = fresh().await;
        let mut scheduler = MaintenanceScheduler::new(&store, &settings, true);
        assert_eq!(scheduler.phase().await.ok(), Some(SchedulerPhase::Idle));

        // Far from the window: nothing to announce yet after the first one.
        let Ok(Some(window)) = scheduler.update_maintenance_window(at(10, 12, 0)).await else {
            panic!("first pass announces a window");
        };
        assert_eq!(window.start, at(10, 23, 0));
        assert_eq!(
            scheduler.phase().await.ok(),
            Some(SchedulerPhase::WindowPending)
        );
        assert_eq!(scheduler.should_run(at(10, 22, 59)).await.ok(), Some(false));
        assert_eq!(scheduler.should_run(at(10, 23, 0)).await.ok(), Some(true));

        let Ok(()) = scheduler.enable_maintenance_mode().await else {
            panic!("lock");
        };
        assert_eq!(
            scheduler.phase().await.ok(),
            Some(SchedulerPhase::InMaintenance)
        );
        assert_eq!(scheduler.should_run(at(10, 23, 1)).await.ok(), Some(false));

        let Ok(()) = scheduler.exit_maintenance_mode(at(10, 23, 20)).await else {
            panic!("exit");
        };
        assert_eq!(scheduler.phase().await.ok(), Some(SchedulerPhase::Idle));

        let Ok(reloaded) = MarketSettings::load(&store).await else {
            panic!("reload");
        };
        assert_eq!(reloaded.next_run_at, at(11, 23, 0).timestamp());
        assert!(!reloaded.window_already_scheduled);
        let Ok(outbox) = store.list_range(keys::EVENT_OUTBOX).await else {
            panic!("outbox");
        };
        assert_eq!(outbox.len(), 1);
    }

    #[tokio::test]
    async fn window_waits_for_preamble() {
        let (store, mut settings) = fresh().await;
        settings.next_run_at = at(11, 23, 0).timestamp();
        let mut scheduler = MaintenanceScheduler::new(&store, &settings, false);
        assert_eq!(
            scheduler.update_maintenance_window(at(11, 20, 0)).await.ok(),
            Some(None)
        );
        let Ok(Some(window)) = scheduler.update_maintenance_window(at(11, 21, 30)).await else {
            panic!("inside preamble");
        };
        assert_eq!(window.start, at(11, 23, 0));
        assert_eq!(
            scheduler.update_maintenance_window(at(11, 21, 31)).await.ok(),
            Some(None)
        );
        let Ok(published) = store.hash_get_all(keys::MAINTENANCE_WINDOW).await else {
            panic!("window hash");
        };
        assert_eq!(
            published.get("Stop").map(String::as_str),
            Some(at(12, 0, 0).timestamp().to_string().as_str())
        );
        assert_eq!(store.list_range(keys::EVENT_OUTBOX).await.ok(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn second_lock_attempt_fails_without_changes() {
        let (store, settings) = fresh().await;
        let mut scheduler = MaintenanceScheduler::new(&store, &settings, true);
        let Ok(()) = scheduler.enable_maintenance_mode().await else {
            panic!("first lock");
        };
        let Err(err) = scheduler.enable_maintenance_mode().await else {
            panic!("second lock must fail");
        };
        assert!(matches!(err, MarketError::MaintenanceLocked(ref m) if m == "live"));
        assert!(err.is_recoverable());
        // A held lock suppresses window announcements.
        assert_eq!(
            scheduler.update_maintenance_window(at(10, 22, 0)).await.ok(),
            Some(None)
        );
    }
}
