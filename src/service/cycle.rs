//! One maintenance cycle of a market.
//!
//! ```text
//! integrity ─▶ load ─▶ reprice ─▶ normalize stock ─▶ sale lottery
//!                                                        │
//!            name indexes ◀── report ◀── one write batch ◀┘
//! ```
//!
//! Every Thing change of a cycle (snapshots, vote trims, sale sets and the
//! sale announcement) is committed in a single batch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::Thing;
use crate::error::Result;
use crate::persistence::{Batch, EntityRepository, Store, keys, stage_thing};
use crate::service::integrity::check_thing_index;
use crate::service::name_index::{IndexStats, stage_colony_index, stage_thing_index};
use crate::service::pricing::{PricingOutcome, WEAK_VOTE_MAX, reprice};
use crate::service::report;
use crate::service::sale::{SaleState, run_sale, stage_sale};
use crate::service::settings::MarketSettings;
use crate::service::stock::{StockOutcome, normalize};

/// Summary of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Correlation id of the run.
    pub run_id: Uuid,
    /// Things processed.
    pub things: usize,
    /// Indexed Things left out by the excluded list.
    pub excluded: usize,
    /// Indexed Things without a readable snapshot.
    pub unreadable: usize,
    /// Index entries removed for missing metadata.
    pub orphans: Vec<String>,
    /// Pricing pass counters.
    pub pricing: PricingOutcome,
    /// Stock pass counters.
    pub stock: StockOutcome,
    /// Things put on sale.
    pub sale_items: usize,
    /// Things moved to the cool-down set.
    pub delayed: usize,
    /// Cool-downs that ended.
    pub expired_cooldowns: usize,
    /// Thing name index counters.
    pub thing_index: IndexStats,
    /// Colony name index counters.
    pub colony_index: IndexStats,
    /// Written CSV report, if any.
    pub report_path: Option<PathBuf>,
    /// Whether market-data writes were suppressed.
    pub dry_run: bool,
}

/// Runs the maintenance steps against one market.
#[derive(Debug)]
pub struct MaintenanceCycle<'a, S> {
    store: &'a S,
    settings: &'a MarketSettings,
    dry_run: bool,
    report_dir: Option<&'a Path>,
}

impl<'a, S: Store> MaintenanceCycle<'a, S> {
    /// Creates a cycle. In a dry run nothing but the CSV report is written.
    #[must_use]
    pub const fn new(
        store: &'a S,
        settings: &'a MarketSettings,
        dry_run: bool,
        report_dir: Option<&'a Path>,
    ) -> Self {
        Self {
            store,
            settings,
            dry_run,
            report_dir,
        }
    }

    async fn commit(&self, step: &str, batch: Batch) -> Result<()> {
        if self.dry_run {
            tracing::info!(step, commands = batch.len(), "dry run, batch discarded");
            return Ok(());
        }
        tracing::debug!(step, commands = batch.len(), "committing batch");
        self.store.execute(batch).await
    }

    /// Runs every step of the cycle.
    ///
    /// # Errors
    ///
    /// Returns the first store, encoding or I/O error. Batches committed
    /// before the failing step stay committed.
    pub async fn run<R: Rng>(&self, now: DateTime<Utc>, rng: &mut R) -> Result<CycleReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "maintenance_cycle",
            market = %self.store.market(),
            run_id = %run_id
        );
        self.run_steps(run_id, now, rng).instrument(span).await
    }

    async fn run_steps<R: Rng>(
        &self,
        run_id: Uuid,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<CycleReport> {
        let mut report = CycleReport {
            run_id,
            dry_run: self.dry_run,
            ..CycleReport::default()
        };
        tracing::info!(dry_run = self.dry_run, "maintenance cycle started");

        let (batch, orphans) = check_thing_index(self.store).await?;
        report.orphans = orphans;
        self.commit("integrity", batch).await?;

        let mut things = self.load_things(now, &mut report).await?;
        report.things = things.len();
        let before = things.clone();

        report.pricing = reprice(&mut things, &self.settings.brackets, &self.settings.pricing);
        report.stock = normalize(&mut things, &self.settings.brackets, rng);

        let sale_state = SaleState::load(self.store).await?;
        let sale = run_sale(&mut things, &sale_state, now, rng);
        report.sale_items = sale.items.len();
        report.delayed = sale.delayed.len();
        report.expired_cooldowns = sale.expired;

        let mut batch = Batch::new();
        for thing in &things {
            stage_thing(thing, &mut batch)?;
        }
        for hash in &report.pricing.vote_trimmed {
            batch.sorted_remove_range_by_score(
                keys::thing_votes(hash),
                0.0,
                f64::from(WEAK_VOTE_MAX),
            );
        }
        stage_sale(&sale, self.store.market(), run_id, now, &mut batch)?;
        self.commit("things", batch).await?;

        if let Some(dir) = self.report_dir {
            let rows = report::build_rows(&before, &things);
            report.report_path = Some(report::write_csv(
                dir,
                now.date_naive(),
                self.store.market(),
                &rows,
            )?);
        }

        let (batch, stats) = stage_thing_index(self.store).await?;
        report.thing_index = stats;
        self.commit("thing_index", batch).await?;

        let colonies = EntityRepository::new(self.store).load_colonies().await?;
        let (batch, stats) = stage_colony_index(self.store, &colonies).await?;
        report.colony_index = stats;
        self.commit("colony_index", batch).await?;

        tracing::info!(
            things = report.things,
            newly_priced = report.pricing.newly_priced,
            buy_changes = report.pricing.buy_changes,
            sell_changes = report.pricing.sell_changes,
            restocked = report.stock.restocked,
            trimmed = report.stock.trimmed,
            on_sale = report.sale_items,
            thing_names = report.thing_index.names,
            colony_names = report.colony_index.names,
            "maintenance cycle finished"
        );
        Ok(report)
    }

    async fn load_things(
        &self,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<Vec<Thing>> {
        let repo = EntityRepository::new(self.store);
        let ids = repo.thing_ids().await?;
        let wanted: Vec<&String> = ids
            .iter()
            .filter(|id| !self.settings.excluded_things.contains(*id))
            .collect();
        report.excluded = ids.len() - wanted.len();

        let loaded = repo.load_things(wanted, now.date_naive()).await?;
        let mut things = Vec::with_capacity(loaded.len());
        for (id, thing) in loaded {
            match thing {
                Some(thing) => things.push(thing),
                None => {
                    tracing::warn!(thing = %id, "skipping thing without readable metadata");
                    report.unreadable += 1;
                }
            }
        }
        tracing::info!(
            things = things.len(),
            excluded = report.excluded,
            "things loaded"
        );
        Ok(things)
    }
}
