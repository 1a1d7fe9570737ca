//! Periodic eviction of stale entries from liveness-tracked registries.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A registry whose entries expire when they stop sending heartbeats.
#[async_trait]
pub trait Sweepable: Send + Sync + 'static {
    /// What a sweep reports for each removed entry.
    type Evicted: Send + Debug;

    /// Short name used in log lines.
    fn registry_name(&self) -> &'static str;

    /// Removes every entry considered stale at `now`.
    async fn sweep(&self, now: Instant) -> Vec<Self::Evicted>;
}

/// Background task that calls [`Sweepable::sweep`] on a fixed interval.
///
/// The first sweep happens one full interval after spawning. The task stops
/// when [`shutdown`](Self::shutdown) is called or the sweeper is dropped.
#[derive(Debug)]
pub struct HeartbeatSweeper {
    shutdown_sender: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatSweeper {
    pub fn spawn<R: Sweepable>(registry: Arc<R>, period: Duration) -> Self {
        let (shutdown_sender, mut shutdown_receiver) = broadcast::channel(1);
        let name = registry.registry_name();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;

            info!(registry = name, period_ms = period.as_millis() as u64, "🧹 Heartbeat sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = registry.sweep(Instant::now()).await;
                        if !evicted.is_empty() {
                            debug!(registry = name, count = evicted.len(), ?evicted, "Sweep evicted stale entries");
                        }
                    }
                    _ = shutdown_receiver.recv() => {
                        info!(registry = name, "🛑 Heartbeat sweeper stopping");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_sender,
            handle: Some(handle),
        }
    }

    /// Stops the sweep loop and waits for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_sender.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Heartbeat sweeper task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for HeartbeatSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
