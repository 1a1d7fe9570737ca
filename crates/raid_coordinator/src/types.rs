//! Shared identifier aliases and small lifecycle enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a match. By convention it equals the host player's id.
pub type MatchId = String;

/// Identifier of a player profile / client session.
pub type PlayerId = String;

/// Session identifier of a dedicated worker connection.
pub type WorkerId = String;

/// Owner-independent identifier of an inventory item.
pub type ItemId = String;

/// Lifecycle state a dedicated worker reports through its heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Waiting for work. Workers send either `ready` or `idle`.
    #[serde(alias = "idle")]
    Ready,
    /// Currently hosting a raid.
    #[serde(alias = "inraid")]
    Busy,
    /// Connected but has not reported a usable state yet.
    Pending,
}

impl WorkerState {
    pub fn is_idle(self) -> bool {
        matches!(self, WorkerState::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Ready => "ready",
            WorkerState::Busy => "busy",
            WorkerState::Pending => "pending",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a match was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// The host left its own match. This is the authoritative end signal.
    HostShutdown,
    /// The host stopped answering.
    PingTimeout,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::HostShutdown => "host-shutdown",
            EndReason::PingTimeout => "ping-timeout",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse progress of a match as reported by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    #[default]
    Loading,
    InGame,
    Complete,
}
