//! market-keeper entry point.
//!
//! Connects to the market store, seeds missing settings and polls every
//! configured market until interrupted.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use market_keeper::config::KeeperConfig;
use market_keeper::persistence::{PostgresStore, connect};
use market_keeper::service::{MarketKeeper, TickOutcome};

fn init_tracing(config: &KeeperConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = KeeperConfig::from_env().context("loading configuration")?;
    init_tracing(&config);
    tracing::info!(
        markets = ?config.markets,
        dry_run = config.dry_run,
        force = config.force_run_now,
        "starting market-keeper"
    );

    // Build persistence layer
    let pool = connect(&config).await.context("connecting to the store")?;

    // Build one keeper per market
    let mut keepers = Vec::with_capacity(config.markets.len());
    for market in &config.markets {
        let keeper = MarketKeeper::new(
            PostgresStore::new(pool.clone(), market.as_str()),
            config.dry_run,
            config.report_dir.clone(),
        );
        keeper
            .bootstrap()
            .await
            .with_context(|| format!("bootstrapping market {market}"))?;
        keepers.push((market, keeper));
    }

    let mut rng = StdRng::from_os_rng();
    let poll = Duration::from_secs(config.poll_interval_secs);
    loop {
        for (market, keeper) in &keepers {
            match keeper.tick(Utc::now(), config.force_run_now, &mut rng).await {
                Ok(TickOutcome::Completed(report)) => {
                    tracing::info!(market = %market, run_id = %report.run_id, "market maintained");
                }
                Ok(TickOutcome::Waiting { .. }) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(market = %market, error = %e, "skipping market this pass");
                }
                Err(e) => {
                    tracing::error!(market = %market, error = %e, "fatal error, stopping");
                    return Err(e).with_context(|| format!("maintaining market {market}"));
                }
            }
        }
        if config.force_run_now {
            tracing::info!("forced run finished");
            break;
        }
        tokio::select! {
            () = tokio::time::sleep(poll) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
        }
    }

    Ok(())
}
