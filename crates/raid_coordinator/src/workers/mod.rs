//! Registry of dedicated workers and their outstanding dispatches.
//!
//! Workers become known implicitly through their first heartbeat and are
//! evicted by the [`HeartbeatSweeper`] once their heartbeat goes stale. The
//! worker map and the pending-dispatch map live behind a single lock so that
//! "find an idle worker" and "reserve it" form one critical section.

pub mod sweeper;

pub use sweeper::{HeartbeatSweeper, Sweepable};

use crate::error::{DispatchError, DispatchResult};
use crate::types::{PlayerId, WorkerId, WorkerState};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A dedicated worker as seen through its heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    pub id: WorkerId,
    pub state: WorkerState,
    pub last_heartbeat: Instant,
    pub registered_at: Instant,
}

impl Worker {
    fn new(id: WorkerId, state: WorkerState, now: Instant) -> Self {
        Self {
            id,
            state,
            last_heartbeat: now,
            registered_at: now,
        }
    }

    /// Whether the last heartbeat is older than `timeout` at `now`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) > timeout
    }
}

/// A worker that was told to start a raid on behalf of `requester_id` and
/// has not joined it yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDispatch {
    pub requester_id: PlayerId,
    pub reserved_at: Instant,
}

/// Result of a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// First heartbeat from this worker; it is now part of the pool.
    Registered,
    /// Known worker refreshed its liveness.
    Refreshed { previous: WorkerState },
}

/// A worker removed by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedWorker {
    pub worker_id: WorkerId,
    pub last_state: WorkerState,
    /// Requester whose dispatch was still waiting on this worker.
    pub orphaned_requester: Option<PlayerId>,
}

/// Point-in-time counts for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub idle_workers: usize,
    pub pending_dispatches: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    workers: HashMap<WorkerId, Worker>,
    pending: HashMap<WorkerId, PendingDispatch>,
}

impl PoolState {
    fn is_available(&self, worker: &Worker, now: Instant, timeout: Duration) -> bool {
        worker.state.is_idle()
            && !worker.is_stale(now, timeout)
            && !self.pending.contains_key(&worker.id)
    }

    /// The one selection rule shared by lookup and reservation.
    fn select_idle<F>(&self, now: Instant, timeout: Duration, is_reachable: F) -> Option<WorkerId>
    where
        F: Fn(&str) -> bool,
    {
        self.workers
            .values()
            .filter(|worker| self.is_available(worker, now, timeout))
            .map(|worker| worker.id.as_str())
            .find(|id| is_reachable(*id))
            .map(str::to_string)
    }
}

/// Heartbeat-verified registry of dedicated workers.
#[derive(Debug)]
pub struct WorkerPool {
    state: RwLock<PoolState>,
    heartbeat_timeout: Duration,
}

impl WorkerPool {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
            heartbeat_timeout,
        }
    }

    /// Records a heartbeat for `worker_id`, creating the worker on first contact.
    ///
    /// # Arguments
    ///
    /// * `worker_id` - Session id of the worker connection
    /// * `state` - Lifecycle state the worker reported
    ///
    /// # Returns
    ///
    /// [`HeartbeatOutcome::Registered`] for a previously unknown worker,
    /// otherwise the state the worker had before this heartbeat.
    pub async fn register_heartbeat(&self, worker_id: &str, state: WorkerState) -> HeartbeatOutcome {
        self.register_heartbeat_at(worker_id, state, Instant::now()).await
    }

    /// [`register_heartbeat`](Self::register_heartbeat) with an explicit clock.
    pub async fn register_heartbeat_at(
        &self,
        worker_id: &str,
        state: WorkerState,
        now: Instant,
    ) -> HeartbeatOutcome {
        let mut pool = self.state.write().await;
        match pool.workers.get_mut(worker_id) {
            Some(worker) => {
                let previous = worker.state;
                worker.state = state;
                worker.last_heartbeat = now;
                if previous != state {
                    debug!(worker_id, %previous, %state, "Worker changed state");
                }
                HeartbeatOutcome::Refreshed { previous }
            }
            None => {
                pool.workers
                    .insert(worker_id.to_string(), Worker::new(worker_id.to_string(), state, now));
                info!(worker_id, %state, "🖥️ Dedicated worker registered");
                HeartbeatOutcome::Registered
            }
        }
    }

    /// Looks up a worker that could take a dispatch right now.
    ///
    /// # Arguments
    ///
    /// * `now` - Instant heartbeat freshness is judged against
    /// * `is_reachable` - Whether a push channel to the worker is open
    ///
    /// # Returns
    ///
    /// Any `Ready` worker with a fresh heartbeat, no pending dispatch and an
    /// open channel. The result is advisory; use
    /// [`reserve_idle_worker`](Self::reserve_idle_worker) to claim one.
    pub async fn find_idle_worker<F>(&self, now: Instant, is_reachable: F) -> Option<WorkerId>
    where
        F: Fn(&str) -> bool,
    {
        self.state
            .read()
            .await
            .select_idle(now, self.heartbeat_timeout, is_reachable)
    }

    /// Finds an idle, reachable worker and records a pending dispatch for
    /// `requester_id` against it, all under one write lock.
    ///
    /// Two concurrent callers can never reserve the same worker.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::NoWorkersAvailable`] when no worker is registered
    /// * [`DispatchError::SelfDispatchRejected`] when the requester is itself a worker
    /// * [`DispatchError::NoIdleWorkers`] when nobody passes the selection rule
    pub async fn reserve_idle_worker<F>(
        &self,
        requester_id: &str,
        now: Instant,
        is_reachable: F,
    ) -> DispatchResult<WorkerId>
    where
        F: Fn(&str) -> bool,
    {
        let mut pool = self.state.write().await;

        if pool.workers.is_empty() {
            return Err(DispatchError::NoWorkersAvailable);
        }
        if pool.workers.contains_key(requester_id) {
            return Err(DispatchError::SelfDispatchRejected);
        }

        let chosen = pool
            .select_idle(now, self.heartbeat_timeout, is_reachable)
            .ok_or(DispatchError::NoIdleWorkers)?;

        pool.pending.insert(
            chosen.clone(),
            PendingDispatch {
                requester_id: requester_id.to_string(),
                reserved_at: now,
            },
        );
        Ok(chosen)
    }

    /// Removes and returns the pending dispatch for `worker_id`. A dispatch
    /// can be taken only once.
    pub async fn take_pending(&self, worker_id: &str) -> Option<PendingDispatch> {
        self.state.write().await.pending.remove(worker_id)
    }

    pub async fn pending_requester(&self, worker_id: &str) -> Option<PlayerId> {
        self.state
            .read()
            .await
            .pending
            .get(worker_id)
            .map(|pending| pending.requester_id.clone())
    }

    pub async fn is_worker(&self, id: &str) -> bool {
        self.state.read().await.workers.contains_key(id)
    }

    pub async fn worker(&self, id: &str) -> Option<Worker> {
        self.state.read().await.workers.get(id).cloned()
    }

    pub async fn stats(&self) -> PoolStats {
        let pool = self.state.read().await;
        let now = Instant::now();
        PoolStats {
            workers: pool.workers.len(),
            idle_workers: pool
                .workers
                .values()
                .filter(|worker| pool.is_available(worker, now, self.heartbeat_timeout))
                .count(),
            pending_dispatches: pool.pending.len(),
        }
    }

    /// Evicts every worker whose heartbeat is older than the timeout at
    /// `now`, together with any dispatch still waiting on it.
    pub async fn evict_stale(&self, now: Instant) -> Vec<EvictedWorker> {
        let mut pool = self.state.write().await;
        let stale: Vec<WorkerId> = pool
            .workers
            .values()
            .filter(|worker| worker.is_stale(now, self.heartbeat_timeout))
            .map(|worker| worker.id.clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for worker_id in stale {
            let Some(worker) = pool.workers.remove(&worker_id) else {
                continue;
            };
            let uptime_secs = now.saturating_duration_since(worker.registered_at).as_secs();
            let orphaned = pool.pending.remove(&worker_id);

            match &orphaned {
                Some(pending) => warn!(
                    worker_id = %worker_id,
                    requester_id = %pending.requester_id,
                    pending_ms = now.saturating_duration_since(pending.reserved_at).as_millis() as u64,
                    uptime_secs,
                    "Dedicated worker removed (timeout) with a dispatch still pending"
                ),
                None => info!(worker_id = %worker_id, uptime_secs, "Dedicated worker removed (timeout)"),
            }
            let orphaned_requester = orphaned.map(|pending| pending.requester_id);

            evicted.push(EvictedWorker {
                worker_id,
                last_state: worker.state,
                orphaned_requester,
            });
        }
        evicted
    }
}

#[async_trait]
impl Sweepable for WorkerPool {
    type Evicted = EvictedWorker;

    fn registry_name(&self) -> &'static str {
        "workers"
    }

    async fn sweep(&self, now: Instant) -> Vec<EvictedWorker> {
        self.evict_stale(now).await
    }
}
