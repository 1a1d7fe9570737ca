//! Error types for the raid coordinator

use crate::types::{MatchId, PlayerId};
use std::{io::Error as IoError, path::PathBuf};
use thiserror::Error;

/// Match registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("Match {0} not found")]
    NotFound(MatchId),
}

/// Reasons a dedicated start request is rejected.
///
/// The `Display` text is what the requester sees in the `error` field of the
/// start response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("No dedicated clients available")]
    NoWorkersAvailable,

    #[error("No dedicated clients available at this time")]
    NoIdleWorkers,

    #[error("A dedicated client cannot request another dedicated client")]
    SelfDispatchRejected,
}

/// Profile store errors
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile {0} not found")]
    NotFound(PlayerId),

    #[error("Invalid profile id {0:?}")]
    InvalidId(PlayerId),

    #[error("Failed to read profile file {0}: {1}")]
    FileRead(PathBuf, IoError),

    #[error("Failed to write profile file {0}: {1}")]
    FileWrite(PathBuf, IoError),

    #[error("Failed to rename profile file from {0} to {1}: {2}")]
    FileRename(PathBuf, PathBuf, IoError),

    #[error("Failed to serialize profile {0}: {1}")]
    Serialization(PlayerId, serde_json::Error),

    #[error("Failed to deserialize profile file {0}: {1}")]
    Deserialization(PathBuf, serde_json::Error),
}

/// Insurance bookkeeping errors
#[derive(Debug, Error)]
pub enum InsuranceError {
    #[error("Match {0} is not tracked for insurance")]
    UnknownMatch(MatchId),

    #[error("Match {0} has already ended")]
    MatchEnded(MatchId),

    #[error("Match {match_id} does not contain player {player_id}")]
    PlayerNotInMatch { match_id: MatchId, player_id: PlayerId },

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

pub type MatchResult<T> = Result<T, MatchError>;
pub type DispatchResult<T> = Result<T, DispatchError>;
pub type InsuranceResult<T> = Result<T, InsuranceError>;
pub type ProfileResult<T> = Result<T, ProfileError>;
