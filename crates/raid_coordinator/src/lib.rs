//! # Raid Coordinator
//!
//! Session coordination for multiplayer raids: who is in which match, which
//! dedicated worker hosts which match, and which insured items each player
//! gets back once the match is over.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Match Registry** ([`MatchRegistry`]) - Active matches and their membership
//! * **Worker Pool** ([`WorkerPool`]) - Dedicated workers kept alive by heartbeats
//! * **Heartbeat Sweeper** ([`HeartbeatSweeper`]) - Background eviction of stale workers
//! * **Dispatcher** ([`Dispatcher`]) - Reserves an idle worker per start request
//!   and tells the requester to join once the worker is up
//! * **Insurance Engine** ([`InsuranceEngine`]) - Per-match insured item
//!   bookkeeping, reconciled against player ledgers at match end
//!
//! ### Request Flow
//!
//! 1. A host creates a match and players join it through the [`RaidController`]
//! 2. Every join starts insurance tracking for that player
//! 3. A player may instead ask for a dedicated worker; the dispatcher reserves
//!    one and pushes `startRaid` to it over the [`PushChannel`]
//! 4. The worker hosts and joins its own match, which pushes `joinMatch` to the
//!    original requester
//! 5. Players send their end-of-raid inventory; the host leaving ends the match
//!    and settles every remaining insurance record
//!
//! ## Thread Safety
//!
//! * Matches live in a `DashMap`, one shard entry per match
//! * Workers and pending dispatches share one `RwLock`, so reservation is atomic
//! * Insurance state uses one async `Mutex` per match, so reports for a match
//!   apply in arrival order
//!
//! ## Example
//!
//! ```rust,no_run
//! use raid_coordinator::{
//!     ChannelRegistry, CoordinatorConfig, InMemoryProfileStore, RaidCoordinator,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = RaidCoordinator::new(
//!     CoordinatorConfig::default(),
//!     Arc::new(ChannelRegistry::new()),
//!     Arc::new(InMemoryProfileStore::new()),
//! )?;
//! coordinator.start_sweeper().await;
//! // ... serve requests through coordinator.controller() ...
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod insurance;
pub mod matches;
pub mod protocol;
pub mod transport;
pub mod types;
pub mod workers;

pub use config::CoordinatorConfig;
pub use controller::RaidController;
pub use coordinator::{CoordinatorStats, RaidCoordinator};
pub use dispatch::{Dispatcher, StartRaidPayload};
pub use error::{ConfigError, DispatchError, InsuranceError, MatchError, ProfileError};
pub use insurance::{
    ExtractionReport, ForfeiturePolicy, InMemoryProfileStore, InsuranceEngine, InsuranceRecord,
    JsonProfileStore, PlayerProfile, ProfileStore, ReconciliationSummary, TrackingOutcome,
};
pub use matches::{Match, MatchConfig, MatchObserver, MatchRegistry, MemberEntry, RaidSettings};
pub use transport::{ChannelRegistry, PushChannel, PushMessage};
pub use types::{EndReason, MatchId, MatchStatus, PlayerId, WorkerState};
pub use workers::{HeartbeatSweeper, PoolStats, WorkerPool};
