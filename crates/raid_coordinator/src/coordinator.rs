//! Top-level coordinator.
//!
//! `RaidCoordinator` owns every registry, wires the insurance engine into the
//! match lifecycle, and runs the heartbeat sweeper.

use crate::config::CoordinatorConfig;
use crate::controller::RaidController;
use crate::dispatch::Dispatcher;
use crate::error::ConfigError;
use crate::insurance::{InsuranceEngine, ProfileStore};
use crate::matches::{MatchObserver, MatchRegistry};
use crate::transport::PushChannel;
use crate::workers::{HeartbeatSweeper, PoolStats, WorkerPool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Snapshot of coordinator load, logged by the host's monitor task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub matches: usize,
    pub insured_matches: usize,
    pub workers: PoolStats,
}

/// The raid coordination service.
///
/// # Architecture
///
/// * **Match registry**: active matches and their members
/// * **Worker pool**: heartbeat-verified dedicated workers plus pending dispatches
/// * **Dispatcher**: reserves workers and correlates their join back to the requester
/// * **Insurance engine**: observes the registry and settles ledgers at match end
pub struct RaidCoordinator {
    /// Runtime configuration
    config: CoordinatorConfig,

    matches: Arc<MatchRegistry>,

    workers: Arc<WorkerPool>,

    insurance: Arc<InsuranceEngine>,

    /// Request handlers sharing the registries above
    controller: RaidController,

    /// Running sweeper, if started
    sweeper: Mutex<Option<HeartbeatSweeper>>,
}

impl RaidCoordinator {
    /// Builds every component. Fails only on an invalid configuration.
    ///
    /// The sweeper is not running until [`start_sweeper`](Self::start_sweeper).
    pub fn new(
        config: CoordinatorConfig,
        channel: Arc<dyn PushChannel>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let insurance = Arc::new(InsuranceEngine::new(profiles, config.forfeiture_policy));
        let observers = vec![insurance.clone() as Arc<dyn MatchObserver>];
        let matches = Arc::new(MatchRegistry::new(observers));
        let workers = Arc::new(WorkerPool::new(config.heartbeat_timeout));
        let dispatcher = Dispatcher::new(workers.clone(), channel);
        let controller = RaidController::new(matches.clone(), dispatcher, insurance.clone());

        debug!(?config, "Raid coordinator constructed");
        Ok(Self {
            config,
            matches,
            workers,
            insurance,
            controller,
            sweeper: Mutex::new(None),
        })
    }

    pub fn controller(&self) -> &RaidController {
        &self.controller
    }

    pub fn matches(&self) -> &Arc<MatchRegistry> {
        &self.matches
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    pub fn insurance(&self) -> &Arc<InsuranceEngine> {
        &self.insurance
    }

    /// Starts the heartbeat sweeper. Calling it again while running is a no-op.
    pub async fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            debug!("Heartbeat sweeper already running");
            return;
        }
        *sweeper = Some(HeartbeatSweeper::spawn(
            self.workers.clone(),
            self.config.sweep_interval,
        ));
    }

    pub async fn is_sweeping(&self) -> bool {
        self.sweeper.lock().await.is_some()
    }

    pub async fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            matches: self.matches.len(),
            insured_matches: self.insurance.tracked_match_count(),
            workers: self.workers.stats().await,
        }
    }

    /// Stops background work. Match and insurance state is left as is.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.shutdown().await;
        }
        let open_matches = self.matches.match_ids();
        if !open_matches.is_empty() {
            warn!(matches = ?open_matches, "Shutting down with matches still open");
        }
        info!("✅ Raid coordinator shut down");
    }
}
