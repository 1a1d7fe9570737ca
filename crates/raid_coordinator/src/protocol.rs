//! Request and response shapes for the raid endpoints.
//!
//! Field names are camelCase on the wire. Responses for unknown matches are
//! `None` at the controller level; the transport turns them into an empty body.

use crate::dispatch::StartRaidPayload;
use crate::matches::{MatchConfig, RaidSettings};
use crate::types::{MatchId, MatchStatus, PlayerId, WorkerState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRaidRequest {
    pub server_id: MatchId,
    pub host_username: String,
    pub timestamp: u64,
    pub expected_number_of_players: u32,
    pub game_version: String,
    pub mod_version: String,
    pub location: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub raid_settings: RaidSettings,
    #[serde(default)]
    pub spawn_point: String,
}

impl From<CreateRaidRequest> for MatchConfig {
    fn from(request: CreateRaidRequest) -> Self {
        MatchConfig {
            server_id: request.server_id,
            host_username: request.host_username,
            timestamp: request.timestamp,
            expected_number_of_players: request.expected_number_of_players,
            game_version: request.game_version,
            mod_version: request.mod_version,
            location: request.location,
            time: request.time,
            side: request.side,
            raid_settings: request.raid_settings,
            spawn_point: request.spawn_point,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRaidResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRaidRequest {
    pub server_id: MatchId,
    pub profile_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRaidResponse {
    pub server_id: MatchId,
    pub timestamp: u64,
    pub expected_number_of_players: u32,
    pub game_version: String,
    pub mod_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRaidRequest {
    pub server_id: MatchId,
    pub profile_id: PlayerId,
}

impl LeaveRaidRequest {
    /// The host's profile id is the match id.
    pub fn is_host(&self) -> bool {
        self.server_id == self.profile_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdRequest {
    pub server_id: MatchId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHostResponse {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPointResponse {
    pub spawnpoint: String,
}

pub type RaidSettingsResponse = RaidSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidStatusResponse {
    pub server_id: MatchId,
    pub status: MatchStatus,
    pub players: Vec<PlayerId>,
}

pub type StartDedicatedRequest = StartRaidPayload;

/// Exactly one of the two fields is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDedicatedResponse {
    pub match_id: Option<MatchId>,
    pub error: Option<String>,
}

impl StartDedicatedResponse {
    pub fn started(match_id: MatchId) -> Self {
        Self {
            match_id: Some(match_id),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            match_id: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedicatedStatusRequest {
    pub session_id: String,
    pub status: WorkerState,
}

pub type DedicatedStatusResponse = DedicatedStatusRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHostRequest {
    pub server_id: MatchId,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDiedRequest {
    pub server_id: MatchId,
    pub profile_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusRequest {
    pub server_id: MatchId,
    pub status: MatchStatus,
}
