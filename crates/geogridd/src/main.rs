//! geogridd — the GeoGrid daemon.
//!
//! Single binary that assembles the multi-region control plane:
//! - Region registry + placement policies (seeded from config)
//! - Locality optimizer
//! - Request router
//! - Deployment orchestrator
//! - Failure handler
//! - Stats collector
//!
//! The HTTP/RPC façade, real health probes, and provisioning all live
//! outside this process; standalone mode drives the core with a
//! simulated probe feed so an operator can watch routing and failover
//! behavior end to end.
//!
//! # Usage
//!
//! ```text
//! geogridd standalone --config geogrid.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{info, warn};

use geogrid_deploy::DeploymentOrchestrator;
use geogrid_failover::FailureHandler;
use geogrid_locality::LocalityOptimizer;
use geogrid_metrics::StatsCollector;
use geogrid_router::Router;
use geogrid_state::{
    DeploymentStatus, DeploymentStrategy, PolicyStore, RegionRegistry, SharedClock, SystemClock,
};

mod config;

use config::ProbeConfig;

#[derive(Parser)]
#[command(name = "geogridd", about = "GeoGrid multi-region control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all subsystems in one process with a simulated probe feed.
    Standalone {
        /// Path to the TOML config file.
        #[arg(long, default_value = "geogrid.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,geogridd=debug,geogrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Standalone { config } => run_standalone(&config).await,
    }
}

async fn run_standalone(config_path: &PathBuf) -> anyhow::Result<()> {
    info!("GeoGrid daemon starting in standalone mode");
    let config = config::load(config_path)?;

    // ── Initialize subsystems ──────────────────────────────────────

    let clock: SharedClock = Arc::new(SystemClock);
    let stats = StatsCollector::new();

    let registry = RegionRegistry::new();
    for seed in config.regions {
        registry.register(seed.into_region())?;
    }
    info!(regions = registry.list(false).len(), "region registry seeded");

    let policies = PolicyStore::new();
    for policy in config.policies {
        policies.register(policy);
    }
    info!(policies = policies.list().len(), "placement policies registered");

    let locality = LocalityOptimizer::new(registry.clone());
    info!("locality optimizer initialized");

    let router = Router::new(registry.clone(), clock.clone()).with_stats(stats.clone());
    info!("router initialized");

    let orchestrator = DeploymentOrchestrator::new(registry.clone(), clock.clone());
    info!("deployment orchestrator initialized");

    let _failure_handler = FailureHandler::new(
        registry.clone(),
        router.clone(),
        locality.clone(),
        orchestrator.clone(),
        policies.clone(),
        clock.clone(),
        config.failover.clone(),
    )
    .with_stats(stats.clone());
    info!(
        timeout_ms = config.failover.failover_timeout_ms,
        "failure handler initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe_shutdown = shutdown_rx.clone();
    let stats_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────────

    let probe_cfg = config.probe.clone();
    let probe_registry = registry.clone();
    let probe_orchestrator = orchestrator.clone();
    let probe_clock = clock.clone();
    let probe_handle = tokio::spawn(async move {
        run_probe_loop(
            probe_registry,
            probe_orchestrator,
            probe_clock,
            probe_cfg,
            probe_shutdown,
        )
        .await;
    });

    let stats_cfg = config.probe.clone();
    let stats_registry = registry.clone();
    let stats_collector = stats.clone();
    let stats_handle = tokio::spawn(async move {
        run_stats_loop(stats_registry, stats_collector, stats_cfg, stats_shutdown).await;
    });

    info!("GeoGrid daemon running; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    let _ = probe_handle.await;
    let _ = stats_handle.await;
    info!("GeoGrid daemon stopped");
    Ok(())
}

/// Simulated probe feed: a seeded random walk over each region's health
/// score, applied through the same update path real probes would use.
/// Also advances pending blue/green switches.
async fn run_probe_loop(
    registry: RegionRegistry,
    orchestrator: DeploymentOrchestrator,
    clock: SharedClock,
    config: ProbeConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let interval = Duration::from_secs(config.interval_secs);
    let stale_after_ms = config.interval_secs * 3 * 1_000;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                for region in registry.list(false) {
                    let drift: f64 = rng.gen_range(-3.0..3.0);
                    let score = (region.health_score + drift).clamp(0.0, 100.0);
                    let error_rate = (region.error_rate + rng.gen_range(-0.01..0.01)).clamp(0.0, 1.0);
                    let utilization = region.utilization() * 100.0;
                    if let Err(e) = registry.update_health(
                        &region.id,
                        score,
                        error_rate,
                        utilization,
                        clock.now_millis(),
                    ) {
                        warn!(region = %region.id, error = %e, "probe update rejected");
                    }
                }

                for deployment in orchestrator.list() {
                    if deployment.strategy == DeploymentStrategy::BlueGreen
                        && deployment.status == DeploymentStatus::Active
                    {
                        if let Err(e) = orchestrator.poll_blue_green(&deployment.id) {
                            warn!(deployment = %deployment.id, error = %e, "blue/green poll failed");
                        }
                    }
                }

                let stale = registry.stale_regions(clock.as_ref(), stale_after_ms);
                if !stale.is_empty() {
                    warn!(regions = ?stale, "health data stale; probes may be down");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Periodic stats log line for the external metrics sink to scrape.
async fn run_stats_loop(
    registry: RegionRegistry,
    stats: StatsCollector,
    config: ProbeConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs(config.stats_interval_secs);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                stats.note_dropped_stale_updates(registry.dropped_stale_updates());
                let snapshot = stats.snapshot();
                match serde_json::to_string(&snapshot) {
                    Ok(json) => info!(stats = %json, "stats snapshot"),
                    Err(e) => warn!(error = %e, "stats serialization failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
