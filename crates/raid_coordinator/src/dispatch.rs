//! Dedicated worker dispatch.
//!
//! A start request moves a worker through these steps:
//!
//! ```text
//!  (unknown) --heartbeat--> Ready --request_start--> Ready + PendingDispatch
//!                                                          |
//!                 worker hosts and joins its own match     |
//!                                                          v
//!                       resolve_join_trigger: JoinMatch pushed to requester
//! ```
//!
//! Reservation happens in the [`WorkerPool`] under its write lock. Pushes are
//! fire-and-forget; a failed push is logged and the reservation stands, since
//! the worker may still come up and join.

use crate::error::DispatchResult;
use crate::transport::{PushChannel, PushMessage};
use crate::types::{PlayerId, WorkerId, WorkerState};
use crate::workers::{HeartbeatOutcome, WorkerPool};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Raid parameters forwarded to the worker that will host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRaidPayload {
    pub location_id: String,
    pub time: String,
    pub side: String,
    pub spawn_place: String,
    pub metabolism_disabled: bool,
    /// Opaque game settings passed through untouched.
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Matches start requests with idle dedicated workers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    channel: Arc<dyn PushChannel>,
}

impl Dispatcher {
    pub fn new(pool: Arc<WorkerPool>, channel: Arc<dyn PushChannel>) -> Self {
        Self { pool, channel }
    }

    /// Reserves an idle, connected worker for `requester_id` and pushes the
    /// start command to it.
    ///
    /// # Arguments
    ///
    /// * `requester_id` - Session of the player asking for a dedicated host
    /// * `payload` - Raid parameters forwarded verbatim in `startRaid`
    ///
    /// # Returns
    ///
    /// The chosen worker, whose id doubles as the id of the match it will
    /// host. The reservation stands even when the push cannot be delivered.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::reserve_idle_worker`]. The error's `Display` text is
    /// what the requester is shown.
    pub async fn request_start(
        &self,
        requester_id: &str,
        payload: StartRaidPayload,
    ) -> DispatchResult<WorkerId> {
        let worker_id = self
            .pool
            .reserve_idle_worker(requester_id, Instant::now(), |id| {
                self.channel.is_connected(id)
            })
            .await
            .map_err(|e| {
                warn!(requester_id, error = %e, "Dedicated start rejected");
                e
            })?;

        if self
            .channel
            .send(&worker_id, PushMessage::StartRaid(payload))
        {
            info!(requester_id, worker_id = %worker_id, "🚀 Start command sent to dedicated worker");
        } else {
            warn!(
                requester_id,
                worker_id = %worker_id,
                "Failed to deliver start command, keeping reservation"
            );
        }
        Ok(worker_id)
    }

    /// Heartbeat from a worker. Unknown workers are registered.
    ///
    /// # Returns
    ///
    /// Whether this was the worker's first heartbeat, and its previous state
    /// otherwise.
    pub async fn report_status(&self, worker_id: &str, state: WorkerState) -> HeartbeatOutcome {
        self.pool.register_heartbeat(worker_id, state).await
    }

    /// Called when `worker_id` joins the match it hosts. Consumes the pending
    /// dispatch, if any, and pushes `joinMatch` to the requester.
    ///
    /// # Returns
    ///
    /// The requester the dispatch belonged to, or `None` when nothing was
    /// pending. Delivery failures are logged and still return the requester.
    pub async fn resolve_join_trigger(&self, worker_id: &str) -> Option<PlayerId> {
        let pending = self.pool.take_pending(worker_id).await?;
        let waited_ms = pending.reserved_at.elapsed().as_millis() as u64;
        let requester_id = pending.requester_id;

        let message = PushMessage::JoinMatch {
            match_id: worker_id.to_string(),
        };
        if self.channel.send(&requester_id, message) {
            info!(
                requester_id = %requester_id,
                match_id = worker_id,
                waited_ms,
                "Told requester to join raid"
            );
        } else {
            warn!(
                requester_id = %requester_id,
                match_id = worker_id,
                "Failed to deliver join command to requester"
            );
        }
        Some(requester_id)
    }
}
