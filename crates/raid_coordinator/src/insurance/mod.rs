//! Insurance reconciliation.
//!
//! Every tracked player gets an [`InsuranceRecord`] per match: the item ids
//! they insured before the raid and the ids later seen in any end-of-raid
//! inventory from that match. A separate per-match player index follows who
//! has not reported yet. Once the index drains, or the host ends the match,
//! the records are reconciled against each player's ledger through the
//! [`ProfileStore`].
//!
//! Each match's state sits behind its own async mutex, so reports for one
//! match apply in arrival order while other matches proceed independently.
//! Profile writes made by the engine take a per-player lock, so a ledger
//! rewrite and a post-raid save for the same player never interleave.
//!
//! Join notifications carry the match generation. Once a generation has
//! ended, late joins for it are refused instead of reviving its tracking.

pub mod file_store;
pub mod profile;

pub use file_store::JsonProfileStore;
pub use profile::{
    ExtractionReport, InMemoryProfileStore, InsuranceEntry, InsuredItem, InventoryItem,
    LedgerChange, PlayerProfile, ProfileStore,
};

use crate::error::{InsuranceError, InsuranceResult, ProfileError, ProfileResult};
use crate::matches::MatchObserver;
use crate::types::{EndReason, ItemId, MatchId, PlayerId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Which ids are removed from a player's ledger at reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForfeiturePolicy {
    /// Insured ids that never showed up in any final inventory of the match.
    #[default]
    UnrecoveredItems,
    /// The ids that did show up. Mirrors the legacy server, which strips
    /// extracted items from the pending insurance returns.
    ExtractedItems,
}

/// Per-player, per-match insurance bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsuranceRecord {
    pub insured: HashSet<ItemId>,
    pub extracted: HashSet<ItemId>,
}

impl InsuranceRecord {
    pub fn new(insured: HashSet<ItemId>) -> Self {
        Self {
            insured,
            extracted: HashSet::new(),
        }
    }

    /// Folds the insured ids found in `items` into the extracted set.
    /// Returns how many new ids were recorded.
    fn observe<'a>(&mut self, items: impl IntoIterator<Item = &'a ItemId>) -> usize {
        let before = self.extracted.len();
        for id in items {
            if self.insured.contains(id) {
                self.extracted.insert(id.clone());
            }
        }
        self.extracted.len() - before
    }

    pub fn forfeiture(&self, policy: ForfeiturePolicy) -> HashSet<ItemId> {
        match policy {
            ForfeiturePolicy::UnrecoveredItems => {
                self.insured.difference(&self.extracted).cloned().collect()
            }
            ForfeiturePolicy::ExtractedItems => self.extracted.clone(),
        }
    }
}

/// Result of [`InsuranceEngine::begin_tracking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingOutcome {
    Started,
    /// The player was already tracked; their insured set was re-read.
    Refreshed,
}

/// What reconciliation did for one match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub match_id: MatchId,
    pub forfeitures: BTreeMap<PlayerId, LedgerChange>,
    /// Players whose ledger could not be rewritten.
    pub failed: Vec<PlayerId>,
}

impl ReconciliationSummary {
    pub fn items_forfeited(&self) -> usize {
        self.forfeitures.values().map(|c| c.items_removed).sum()
    }
}

#[derive(Debug, Default)]
struct MatchInsurance {
    records: HashMap<PlayerId, InsuranceRecord>,
    /// Players that have not reported yet, in tracking order.
    players: Vec<PlayerId>,
    /// Set once reconciled; the state is unreachable from the map afterwards.
    closed: bool,
}

type SharedMatchInsurance = Arc<Mutex<MatchInsurance>>;

/// Tracks insured items per match and settles them against player ledgers.
#[derive(Debug)]
pub struct InsuranceEngine {
    matches: DashMap<MatchId, SharedMatchInsurance>,
    /// Highest ended generation per match id
    ended: DashMap<MatchId, u64>,
    profile_locks: DashMap<PlayerId, Arc<Mutex<()>>>,
    profiles: Arc<dyn ProfileStore>,
    policy: ForfeiturePolicy,
}

impl InsuranceEngine {
    pub fn new(profiles: Arc<dyn ProfileStore>, policy: ForfeiturePolicy) -> Self {
        Self {
            matches: DashMap::new(),
            ended: DashMap::new(),
            profile_locks: DashMap::new(),
            profiles,
            policy,
        }
    }

    pub fn tracked_match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn is_tracked(&self, match_id: &str) -> bool {
        self.matches.contains_key(match_id)
    }

    /// Starts tracking `player_id` in `match_id` with the insured ids currently
    /// on their profile. Tracking the same pair again refreshes the insured set
    /// and keeps a single index entry.
    ///
    /// # Arguments
    ///
    /// * `match_id` - Match the player joined
    /// * `player_id` - Player whose insured items are read from the profile store
    ///
    /// # Returns
    ///
    /// Whether tracking started or an existing record was refreshed. A missing
    /// profile tracks an empty insured set; other store failures are returned.
    pub async fn begin_tracking(
        &self,
        match_id: &str,
        player_id: &str,
    ) -> InsuranceResult<TrackingOutcome> {
        self.track(match_id, None, player_id).await
    }

    /// Tracking for a join of the given match generation. Refused with
    /// [`InsuranceError::MatchEnded`] once that generation has ended.
    async fn track(
        &self,
        match_id: &str,
        generation: Option<u64>,
        player_id: &str,
    ) -> InsuranceResult<TrackingOutcome> {
        let insured = match self.profiles.load(player_id).await {
            Ok(profile) => profile.insured_item_ids(),
            Err(ProfileError::NotFound(_)) => {
                warn!(match_id, player_id, "No profile found, tracking with no insured items");
                HashSet::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(match_id, player_id, "{} has {} insured items on profile", player_id, insured.len());

        loop {
            // The end check and the insert share the map entry lock, so an end
            // either refuses this join or finds its state afterwards.
            let state = {
                let entry = self.matches.entry(match_id.to_string());
                if let Some(generation) = generation {
                    if self.has_ended(match_id, generation) {
                        return Err(InsuranceError::MatchEnded(match_id.to_string()));
                    }
                }
                entry.or_default().value().clone()
            };
            let mut guard = state.lock().await;
            if guard.closed {
                // Reconciled between lookup and lock; the map entry is already gone.
                continue;
            }

            let outcome = match guard.records.get_mut(player_id) {
                Some(record) => {
                    record.insured = insured;
                    TrackingOutcome::Refreshed
                }
                None => {
                    guard
                        .records
                        .insert(player_id.to_string(), InsuranceRecord::new(insured));
                    TrackingOutcome::Started
                }
            };
            if !guard.players.iter().any(|p| p == player_id) {
                guard.players.push(player_id.to_string());
            }
            if outcome == TrackingOutcome::Refreshed {
                warn!(match_id, player_id, "Player already tracked, refreshed insured items");
            }
            debug!(match_id, players = ?guard.players, "Insurance index updated");
            return Ok(outcome);
        }
    }

    /// Applies one player's end-of-raid inventory to every record in the
    /// match, forwards the report to the profile store, and takes the player
    /// off the index. Reconciles the match when the index drains.
    pub async fn report_extraction(
        &self,
        player_id: &str,
        match_id: &str,
        report: &ExtractionReport,
    ) -> InsuranceResult<Option<ReconciliationSummary>> {
        let state = self.shared(match_id).ok_or_else(|| {
            error!(match_id, player_id, "Extraction reported for untracked match");
            InsuranceError::UnknownMatch(match_id.to_string())
        })?;
        let mut guard = state.lock().await;
        if guard.closed {
            return Err(InsuranceError::UnknownMatch(match_id.to_string()));
        }
        let Some(position) = guard.players.iter().position(|p| p == player_id) else {
            error!(match_id, player_id, "Match does not contain player");
            return Err(InsuranceError::PlayerNotInMatch {
                match_id: match_id.to_string(),
                player_id: player_id.to_string(),
            });
        };

        for (owner, record) in guard.records.iter_mut() {
            let found = record.observe(report.item_ids());
            if found > 0 {
                debug!(match_id, reporter = player_id, owner = %owner, found, "Insured items seen in final inventory");
            }
        }

        if let Err(e) = self.save_post_raid_progress(player_id, report).await {
            error!(match_id, player_id, error = %e, "Failed to save post-raid progress");
        }

        guard.players.remove(position);
        if guard.players.is_empty() {
            info!(match_id, "No more players left in match, reconciling insurance");
            return Ok(Some(self.reconcile(match_id, &state, &mut guard).await));
        }
        info!(match_id, player_id, remaining = guard.players.len(), "Player removed from insurance index");
        Ok(None)
    }

    /// Settles every record of the match against the ledgers and deletes the
    /// match's tracking state. An untracked match is logged and ignored.
    pub async fn end_match_reconciliation(&self, match_id: &str) -> Option<ReconciliationSummary> {
        let Some(state) = self.shared(match_id) else {
            warn!(match_id, "Reconciliation requested for untracked match");
            return None;
        };
        let mut guard = state.lock().await;
        if guard.closed {
            debug!(match_id, "Match already reconciled");
            return None;
        }
        Some(self.reconcile(match_id, &state, &mut guard).await)
    }

    /// Drops the match's tracking state without touching any ledger.
    pub async fn discard(&self, match_id: &str) -> bool {
        let Some(state) = self.shared(match_id) else {
            return false;
        };
        let mut guard = state.lock().await;
        if guard.closed {
            return false;
        }
        guard.closed = true;
        self.matches
            .remove_if(match_id, |_, current| Arc::ptr_eq(current, &state));
        info!(match_id, "Insurance tracking discarded");
        true
    }

    /// Saves a finished raid straight to the profile store, for players not
    /// tracked in any match. Waits for any ledger rewrite of the same player.
    pub async fn save_post_raid_progress(
        &self,
        player_id: &str,
        report: &ExtractionReport,
    ) -> ProfileResult<()> {
        let lock = self.profile_lock(player_id);
        let result = {
            let _guard = lock.lock().await;
            self.profiles.save_post_raid_progress(player_id, report).await
        };
        self.release_profile_lock(player_id, lock);
        result
    }

    /// Finds the match a player is still expected to report for.
    pub async fn match_for_player(&self, player_id: &str) -> Option<MatchId> {
        for (match_id, state) in self.snapshot() {
            let guard = state.lock().await;
            if !guard.closed && guard.players.iter().any(|p| p == player_id) {
                return Some(match_id);
            }
        }
        None
    }

    /// Players that have not reported yet, in tracking order.
    pub async fn tracked_players(&self, match_id: &str) -> Option<Vec<PlayerId>> {
        let state = self.shared(match_id)?;
        let guard = state.lock().await;
        (!guard.closed).then(|| guard.players.clone())
    }

    pub async fn record(&self, match_id: &str, player_id: &str) -> Option<InsuranceRecord> {
        let state = self.shared(match_id)?;
        let guard = state.lock().await;
        if guard.closed {
            return None;
        }
        guard.records.get(player_id).cloned()
    }

    fn has_ended(&self, match_id: &str, generation: u64) -> bool {
        self.ended
            .get(match_id)
            .is_some_and(|ended| *ended >= generation)
    }

    fn mark_ended(&self, match_id: &str, generation: u64) {
        self.ended
            .entry(match_id.to_string())
            .and_modify(|ended| *ended = (*ended).max(generation))
            .or_insert(generation);
    }

    fn profile_lock(&self, player_id: &str) -> Arc<Mutex<()>> {
        self.profile_locks
            .entry(player_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn release_profile_lock(&self, player_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.profile_locks
            .remove_if(player_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn shared(&self, match_id: &str) -> Option<SharedMatchInsurance> {
        self.matches.get(match_id).map(|s| s.value().clone())
    }

    fn snapshot(&self) -> Vec<(MatchId, SharedMatchInsurance)> {
        self.matches
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    async fn reconcile(
        &self,
        match_id: &str,
        state: &SharedMatchInsurance,
        guard: &mut MatchInsurance,
    ) -> ReconciliationSummary {
        guard.closed = true;
        self.matches
            .remove_if(match_id, |_, current| Arc::ptr_eq(current, state));

        let mut summary = ReconciliationSummary {
            match_id: match_id.to_string(),
            ..Default::default()
        };

        let mut records: Vec<_> = guard.records.drain().collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        for (player_id, record) in records {
            let forfeited = record.forfeiture(self.policy);
            if forfeited.is_empty() {
                continue;
            }
            info!(
                match_id,
                player_id = %player_id,
                "{} will lose {}/{} items",
                player_id,
                forfeited.len(),
                record.insured.len()
            );

            match self.rewrite_ledger(&player_id, &forfeited).await {
                Ok(change) => {
                    summary.forfeitures.insert(player_id, change);
                }
                Err(e) => {
                    error!(match_id, player_id = %player_id, error = %e, "Failed to rewrite insurance ledger");
                    summary.failed.push(player_id);
                }
            }
        }
        guard.players.clear();

        info!(
            match_id,
            players = summary.forfeitures.len(),
            items = summary.items_forfeited(),
            "🧾 Insurance reconciled"
        );
        summary
    }

    async fn rewrite_ledger(
        &self,
        player_id: &str,
        forfeited: &HashSet<ItemId>,
    ) -> ProfileResult<LedgerChange> {
        let lock = self.profile_lock(player_id);
        let result = {
            let _guard = lock.lock().await;
            self.forfeit_and_save(player_id, forfeited).await
        };
        self.release_profile_lock(player_id, lock);
        result
    }

    async fn forfeit_and_save(
        &self,
        player_id: &str,
        forfeited: &HashSet<ItemId>,
    ) -> ProfileResult<LedgerChange> {
        let mut profile = self.profiles.load(player_id).await?;
        let change = profile.forfeit_insured_items(forfeited);
        if change != LedgerChange::default() {
            self.profiles.save(&profile).await?;
        }
        Ok(change)
    }
}

#[async_trait]
impl MatchObserver for InsuranceEngine {
    async fn on_player_joined(&self, match_id: &str, generation: u64, player_id: &str) {
        match self.track(match_id, Some(generation), player_id).await {
            Ok(_) => {}
            Err(InsuranceError::MatchEnded(_)) => {
                info!(match_id, generation, player_id, "Match ended before join was tracked, skipping insurance");
            }
            Err(e) => {
                error!(match_id, player_id, error = %e, "Failed to start insurance tracking");
            }
        }
    }

    async fn on_match_ended(&self, match_id: &str, generation: Option<u64>, reason: EndReason) {
        if let Some(generation) = generation {
            self.mark_ended(match_id, generation);
        }
        match reason {
            EndReason::HostShutdown => {
                self.end_match_reconciliation(match_id).await;
            }
            EndReason::PingTimeout => {
                self.discard(match_id).await;
            }
        }
    }
}
