//! Raid server entry point
//!
//! Loads configuration, builds the raid coordinator with its profile store
//! and push channel registry, runs the heartbeat sweeper and a periodic stats
//! monitor, and shuts everything down on SIGINT/SIGTERM.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{Context, Result};
use cli::CliArgs;
use config::{AppConfig, ProfileBackend};
use raid_coordinator::{
    ChannelRegistry, InMemoryProfileStore, JsonProfileStore, ProfileStore, RaidCoordinator,
};
use std::sync::Arc;
use tracing::{error, info};

/// The running server process.
pub struct Application {
    config: AppConfig,
    coordinator: Arc<RaidCoordinator>,
    channels: Arc<ChannelRegistry>,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(profile_dir) = args.profile_dir {
            config.profiles.directory = profile_dir.to_string_lossy().to_string();
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(sweep) = args.sweep_interval_ms {
            config.coordinator.sweep_interval_ms = sweep;
        }
        if let Some(timeout) = args.heartbeat_timeout_ms {
            config.coordinator.heartbeat_timeout_ms = timeout;
        }

        config
            .validate()
            .context("Configuration validation failed")?;
        logging::setup_logging(&config.logging)?;

        let profiles: Arc<dyn ProfileStore> = match config.profiles.backend {
            ProfileBackend::Json => Arc::new(
                JsonProfileStore::open(config.profiles.directory_path())
                    .await
                    .context("Failed to open profile directory")?,
            ),
            ProfileBackend::Memory => Arc::new(InMemoryProfileStore::new()),
        };
        let channels = Arc::new(ChannelRegistry::new());
        let coordinator = Arc::new(RaidCoordinator::new(
            config.to_coordinator_config(),
            channels.clone(),
            profiles,
        )?);

        info!(
            "📂 Config: {} | Profiles: {:?} {}",
            args.config_path.display(),
            config.profiles.backend,
            config.profiles.directory
        );
        Ok(Self {
            config,
            coordinator,
            channels,
        })
    }

    pub async fn run(self) -> Result<()> {
        let version = env!("CARGO_PKG_VERSION");
        info!("🌟 Starting Raid Server v{}", version);
        info!("📋 Configuration Summary:");
        info!("  ⏱️ Sweep interval: {}ms", self.config.coordinator.sweep_interval_ms);
        info!("  💓 Heartbeat timeout: {}ms", self.config.coordinator.heartbeat_timeout_ms);
        info!("  🧾 Forfeiture policy: {:?}", self.config.coordinator.forfeiture_policy);

        self.coordinator.start_sweeper().await;
        info!("  🧹 Heartbeat sweeper running: {}", self.coordinator.is_sweeping().await);

        let monitoring_handle = {
            let coordinator = self.coordinator.clone();
            let channels = self.channels.clone();
            let period = self.config.stats_interval();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let stats = coordinator.stats().await;
                    info!(
                        "📊 System Health - {} matches | {} insured | {} workers ({} idle) | {} pending | {} connected",
                        stats.matches,
                        stats.insured_matches,
                        stats.workers.workers,
                        stats.workers.idle_workers,
                        stats.workers.pending_dispatches,
                        channels.connected_count()
                    );
                }
            })
        };

        info!("✅ Raid Server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let received = signals::wait_for_shutdown_signal()
            .await
            .context("Failed to install signal handlers")?;
        info!(signal = %received, "🛑 Shutdown signal received, initiating graceful shutdown...");

        monitoring_handle.abort();
        self.coordinator.shutdown().await;

        let final_stats = self.coordinator.stats().await;
        info!("📊 Final Statistics:");
        info!("  - Active matches: {}", final_stats.matches);
        info!("  - Matches awaiting insurance settlement: {}", final_stats.insured_matches);
        info!("👋 Raid Server stopped");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
