//! Match data model and lifecycle observers.
//!
//! A [`Match`] is created by its host, mutated only through the
//! [`MatchRegistry`] membership operations, and removed on an explicit end.
//! Components that need to follow membership (the insurance engine) register
//! as a [`MatchObserver`].

pub mod registry;

pub use registry::MatchRegistry;

use crate::types::{EndReason, MatchId, MatchStatus, PlayerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raid rules chosen by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidSettings {
    pub metabolism_disabled: bool,
    pub players_spawn_place: String,
}

/// Network endpoint players connect to once the host is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEndpoint {
    pub ip: String,
    pub port: u16,
}

/// Everything the host supplies when creating a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    pub server_id: MatchId,
    pub host_username: String,
    pub timestamp: u64,
    pub expected_number_of_players: u32,
    pub game_version: String,
    pub mod_version: String,
    pub location: String,
    pub time: String,
    pub side: String,
    pub raid_settings: RaidSettings,
    pub spawn_point: String,
}

/// Per-player membership data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberEntry {
    pub group_id: Option<String>,
    pub is_dead: bool,
}

/// An active match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub config: MatchConfig,
    pub status: MatchStatus,
    pub endpoint: Option<MatchEndpoint>,
    generation: u64,
    members: BTreeMap<PlayerId, MemberEntry>,
}

impl Match {
    pub(crate) fn new(config: MatchConfig, generation: u64) -> Self {
        Self {
            config,
            status: MatchStatus::default(),
            endpoint: None,
            generation,
            members: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.server_id
    }

    /// Distinguishes successive matches created under the same id. Strictly
    /// increasing across the registry.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn members(&self) -> &BTreeMap<PlayerId, MemberEntry> {
        &self.members
    }

    pub fn member(&self, player_id: &str) -> Option<&MemberEntry> {
        self.members.get(player_id)
    }

    pub fn has_member(&self, player_id: &str) -> bool {
        self.members.contains_key(player_id)
    }

    pub(crate) fn members_mut(&mut self) -> &mut BTreeMap<PlayerId, MemberEntry> {
        &mut self.members
    }
}

/// Receives match lifecycle events from the [`MatchRegistry`].
///
/// Hooks run after the registry has released the match, so a join
/// notification can arrive after the same match has already ended. The
/// `generation` lets observers tell those late joins apart from joins to a
/// newer match that reuses the id.
///
/// Both hooks default to doing nothing.
#[async_trait]
pub trait MatchObserver: Send + Sync {
    async fn on_player_joined(&self, _match_id: &str, _generation: u64, _player_id: &str) {}

    /// `generation` is `None` when the end was requested for a match that
    /// did not exist.
    async fn on_match_ended(&self, _match_id: &str, _generation: Option<u64>, _reason: EndReason) {}
}
