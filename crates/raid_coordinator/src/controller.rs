//! Request handlers for the raid endpoints.
//!
//! Each handler maps one inbound request onto the match registry, the
//! dispatcher, or the insurance engine. Lookups against unknown matches
//! return `None` instead of failing.

use crate::dispatch::Dispatcher;
use crate::error::InsuranceResult;
use crate::insurance::{ExtractionReport, InsuranceEngine, ReconciliationSummary};
use crate::matches::{MatchRegistry, MemberEntry};
use crate::protocol::{
    CreateRaidRequest, CreateRaidResponse, DedicatedStatusRequest, DedicatedStatusResponse,
    GetHostResponse, JoinRaidRequest, JoinRaidResponse, LeaveRaidRequest, PlayerDiedRequest,
    RaidSettingsResponse, RaidStatusResponse, RegisterHostRequest, ServerIdRequest,
    SetStatusRequest, SpawnPointResponse, StartDedicatedRequest, StartDedicatedResponse,
};
use crate::types::EndReason;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry points for every raid request.
///
/// Cheap to clone; all state lives in the shared registries.
#[derive(Debug, Clone)]
pub struct RaidController {
    matches: Arc<MatchRegistry>,
    dispatcher: Dispatcher,
    insurance: Arc<InsuranceEngine>,
}

impl RaidController {
    pub fn new(
        matches: Arc<MatchRegistry>,
        dispatcher: Dispatcher,
        insurance: Arc<InsuranceEngine>,
    ) -> Self {
        Self {
            matches,
            dispatcher,
            insurance,
        }
    }

    /// Registers the host's match. `success` is `false` when a match with the
    /// same id already exists; that match is left untouched.
    pub fn create(&self, request: CreateRaidRequest) -> CreateRaidResponse {
        CreateRaidResponse {
            success: self.matches.create_match(request.into()),
        }
    }

    /// Adds the player to the match. A dedicated worker joining the match it
    /// hosts releases whoever requested it.
    ///
    /// # Arguments
    ///
    /// * `request` - Match to join and the joining profile
    ///
    /// # Returns
    ///
    /// The match details the client needs to connect, or `None` when the
    /// match does not exist (or ended while the join was processed).
    pub async fn join(&self, request: JoinRaidRequest) -> Option<JoinRaidResponse> {
        if let Err(e) = self
            .matches
            .add_player(&request.server_id, &request.profile_id, MemberEntry::default())
            .await
        {
            warn!(profile_id = %request.profile_id, error = %e, "Join rejected");
            return None;
        }

        if request.profile_id == request.server_id {
            self.dispatcher.resolve_join_trigger(&request.server_id).await;
        }

        let game = self.matches.get_match(&request.server_id)?;
        Some(JoinRaidResponse {
            server_id: request.server_id,
            timestamp: game.config.timestamp,
            expected_number_of_players: game.config.expected_number_of_players,
            game_version: game.config.game_version,
            mod_version: game.config.mod_version,
        })
    }

    /// The host leaving ends the match; anyone else just leaves it.
    pub async fn leave(&self, request: LeaveRaidRequest) {
        if request.is_host() {
            self.matches
                .end_match(&request.server_id, EndReason::HostShutdown)
                .await;
            return;
        }
        self.matches
            .remove_player(&request.server_id, &request.profile_id);
    }

    /// Ends a match whose host stopped responding. Tracking is dropped without
    /// touching any ledger.
    pub async fn expire(&self, match_id: &str) -> bool {
        self.matches
            .end_match(match_id, EndReason::PingTimeout)
            .await
            .is_some()
    }

    /// Endpoint of the match host, once it has registered one.
    pub fn get_host(&self, request: &ServerIdRequest) -> Option<GetHostResponse> {
        let endpoint = self.matches.get_match(&request.server_id)?.endpoint?;
        Some(GetHostResponse {
            ip: endpoint.ip,
            port: endpoint.port,
        })
    }

    pub fn get_spawnpoint(&self, request: &ServerIdRequest) -> Option<SpawnPointResponse> {
        self.matches
            .get_match(&request.server_id)
            .map(|game| SpawnPointResponse {
                spawnpoint: game.config.spawn_point,
            })
    }

    pub fn get_settings(&self, request: &ServerIdRequest) -> Option<RaidSettingsResponse> {
        self.matches
            .get_match(&request.server_id)
            .map(|game| game.config.raid_settings)
    }

    pub fn get_status(&self, request: &ServerIdRequest) -> Option<RaidStatusResponse> {
        self.matches
            .get_match(&request.server_id)
            .map(|game| RaidStatusResponse {
                server_id: request.server_id.clone(),
                status: game.status,
                players: game.members().keys().cloned().collect(),
            })
    }

    pub fn set_status(&self, request: &SetStatusRequest) -> bool {
        self.matches
            .set_status(&request.server_id, request.status)
            .is_ok()
    }

    /// Asks for a dedicated worker to host a raid for `session_id`.
    ///
    /// # Returns
    ///
    /// `matchId` set to the reserved worker on success. Otherwise `error`
    /// holds the reason shown to the player.
    pub async fn start_dedicated(
        &self,
        session_id: &str,
        request: StartDedicatedRequest,
    ) -> StartDedicatedResponse {
        match self.dispatcher.request_start(session_id, request).await {
            Ok(worker_id) => StartDedicatedResponse::started(worker_id),
            Err(e) => StartDedicatedResponse::failed(e),
        }
    }

    /// Heartbeat from the worker behind `session_id`. Echoes the request.
    pub async fn dedicated_status(
        &self,
        session_id: &str,
        request: DedicatedStatusRequest,
    ) -> DedicatedStatusResponse {
        let outcome = self
            .dispatcher
            .report_status(session_id, request.status)
            .await;
        debug!(session_id, ?outcome, "Dedicated status received");
        request
    }

    /// Records where players reach the host. `false` for an unknown match.
    pub fn register_host_endpoint(&self, request: &RegisterHostRequest) -> bool {
        self.matches
            .set_endpoint(&request.server_id, &request.ip, request.port)
            .is_ok()
    }

    pub fn mark_player_dead(&self, request: &PlayerDiedRequest) -> bool {
        match self
            .matches
            .set_player_dead(&request.server_id, &request.profile_id)
        {
            Ok(()) => {
                info!(match_id = %request.server_id, profile_id = %request.profile_id, "💀 Player died");
                true
            }
            Err(e) => {
                debug!(error = %e, "Death report ignored");
                false
            }
        }
    }

    /// End-of-raid save for `session_id`. Players still tracked for insurance
    /// go through reconciliation; everyone else is saved directly.
    ///
    /// # Returns
    ///
    /// The reconciliation summary when this report was the last one the
    /// match was waiting on.
    ///
    /// # Errors
    ///
    /// Profile store failures on the direct path. Tracked reports fail only
    /// when the match stopped tracking the player in the meantime.
    pub async fn save_post_raid(
        &self,
        session_id: &str,
        report: &ExtractionReport,
    ) -> InsuranceResult<Option<ReconciliationSummary>> {
        match self.insurance.match_for_player(session_id).await {
            Some(match_id) => {
                self.insurance
                    .report_extraction(session_id, &match_id, report)
                    .await
            }
            None => {
                debug!(session_id, "Player not tracked for insurance, saving directly");
                self.insurance
                    .save_post_raid_progress(session_id, report)
                    .await?;
                Ok(None)
            }
        }
    }
}
