//! Player profile data touched by insurance bookkeeping, and the store seam.

use crate::error::{ProfileError, ProfileResult};
use crate::types::{ItemId, PlayerId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// An item as it appears in an inventory or an insurance package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(rename = "_tpl", default)]
    pub template_id: String,
}

impl InventoryItem {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            template_id: String::new(),
        }
    }
}

/// Marker that an item was insured before the raid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuredItem {
    pub item_id: ItemId,
    #[serde(default)]
    pub trader_id: Option<String>,
}

/// One pending insurance return in the player's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceEntry {
    pub trader_id: String,
    #[serde(default)]
    pub scheduled_time: u64,
    pub items: Vec<InventoryItem>,
}

/// What a player sends when they finish a raid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    /// Full inventory the player left the raid with
    pub items: Vec<InventoryItem>,
    /// Free-form exit status (e.g. "Survived", "Killed")
    #[serde(default)]
    pub exit_status: Option<String>,
}

impl ExtractionReport {
    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.iter().map(|item| &item.id)
    }
}

/// Counts describing a ledger rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerChange {
    pub items_removed: usize,
    pub entries_dropped: usize,
}

/// The slice of a player profile this crate reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub id: PlayerId,
    #[serde(default)]
    pub insured_items: Vec<InsuredItem>,
    #[serde(default)]
    pub insurance: Vec<InsuranceEntry>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

impl PlayerProfile {
    pub fn new(id: impl Into<PlayerId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn insured_item_ids(&self) -> HashSet<ItemId> {
        self.insured_items
            .iter()
            .map(|insured| insured.item_id.clone())
            .collect()
    }

    /// Removes `forfeited` ids from every ledger entry and drops entries left
    /// without items.
    pub fn forfeit_insured_items(&mut self, forfeited: &HashSet<ItemId>) -> LedgerChange {
        if self.insurance.is_empty() {
            warn!(player_id = %self.id, "No insurances available");
            return LedgerChange::default();
        }

        let mut change = LedgerChange::default();
        for entry in &mut self.insurance {
            let entered = entry.items.len();
            entry.items.retain(|item| !forfeited.contains(&item.id));
            let exited = entry.items.len();
            change.items_removed += entered - exited;
            debug!(
                player_id = %self.id,
                trader_id = %entry.trader_id,
                "Insurance entry changed length from {} -> {}",
                entered,
                exited
            );
        }

        let before = self.insurance.len();
        self.insurance.retain(|entry| !entry.items.is_empty());
        change.entries_dropped = before - self.insurance.len();
        change
    }

    pub fn ledger_item_ids(&self) -> HashSet<ItemId> {
        self.insurance
            .iter()
            .flat_map(|entry| entry.items.iter().map(|item| item.id.clone()))
            .collect()
    }
}

/// Key-value store of player profiles, keyed by player id.
#[async_trait]
pub trait ProfileStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, player_id: &str) -> ProfileResult<PlayerProfile>;

    async fn save(&self, profile: &PlayerProfile) -> ProfileResult<()>;

    /// Applies the non-insurance effects of a finished raid: the profile's
    /// inventory becomes what the player left with.
    async fn save_post_raid_progress(
        &self,
        player_id: &str,
        report: &ExtractionReport,
    ) -> ProfileResult<()> {
        let mut profile = self.load(player_id).await?;
        profile.inventory = report.items.clone();
        self.save(&profile).await
    }
}

/// Profiles held in memory. Used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<PlayerId, PlayerProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: PlayerProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn get(&self, player_id: &str) -> Option<PlayerProfile> {
        self.profiles.get(player_id).map(|p| p.value().clone())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self, player_id: &str) -> ProfileResult<PlayerProfile> {
        self.get(player_id)
            .ok_or_else(|| ProfileError::NotFound(player_id.to_string()))
    }

    async fn save(&self, profile: &PlayerProfile) -> ProfileResult<()> {
        self.insert(profile.clone());
        Ok(())
    }
}
