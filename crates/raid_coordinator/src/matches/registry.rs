//! Registry of active matches.

use super::{Match, MatchConfig, MatchEndpoint, MatchObserver, MemberEntry};
use crate::error::{MatchError, MatchResult};
use crate::types::{EndReason, MatchId, MatchStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns every active [`Match`] and its membership.
///
/// Each match sits in its own `DashMap` shard entry, so membership changes on
/// one match never wait on another. Observers are fixed at construction.
pub struct MatchRegistry {
    matches: DashMap<MatchId, Match>,
    observers: Vec<Arc<dyn MatchObserver>>,
    next_generation: AtomicU64,
}

impl fmt::Debug for MatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchRegistry")
            .field("matches", &self.matches.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MatchRegistry {
    pub fn new(observers: Vec<Arc<dyn MatchObserver>>) -> Self {
        Self {
            matches: DashMap::new(),
            observers,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Registers a new match. Returns `false` and leaves the existing match
    /// untouched when the identifier is already taken.
    pub fn create_match(&self, config: MatchConfig) -> bool {
        match self.matches.entry(config.server_id.clone()) {
            Entry::Occupied(_) => {
                warn!(match_id = %config.server_id, "Match already exists, refusing to create");
                false
            }
            Entry::Vacant(vacant) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                info!(
                    match_id = %config.server_id,
                    generation,
                    host = %config.host_username,
                    location = %config.location,
                    expected_players = config.expected_number_of_players,
                    "🎮 Match created"
                );
                vacant.insert(Match::new(config, generation));
                true
            }
        }
    }

    pub fn get_match(&self, match_id: &str) -> Option<Match> {
        self.matches.get(match_id).map(|m| m.value().clone())
    }

    pub fn contains(&self, match_id: &str) -> bool {
        self.matches.contains_key(match_id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Ids of every active match, sorted.
    pub fn match_ids(&self) -> Vec<MatchId> {
        let mut ids: Vec<MatchId> = self.matches.iter().map(|m| m.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Inserts or overwrites the member entry for `player_id`, then notifies
    /// observers.
    pub async fn add_player(
        &self,
        match_id: &str,
        player_id: &str,
        entry: MemberEntry,
    ) -> MatchResult<()> {
        let generation = {
            let mut game = self
                .matches
                .get_mut(match_id)
                .ok_or_else(|| MatchError::NotFound(match_id.to_string()))?;
            if game.members_mut().insert(player_id.to_string(), entry).is_none() {
                info!(match_id, player_id, "➕ Player joined match");
            } else {
                debug!(match_id, player_id, "Player re-joined match");
            }
            game.generation()
        };

        join_all(
            self.observers
                .iter()
                .map(|observer| observer.on_player_joined(match_id, generation, player_id)),
        )
        .await;
        Ok(())
    }

    /// Removes `player_id` from the match. Never ends the match, even when it
    /// becomes empty.
    pub fn remove_player(&self, match_id: &str, player_id: &str) {
        let Some(mut game) = self.matches.get_mut(match_id) else {
            debug!(match_id, player_id, "Leave for unknown match ignored");
            return;
        };
        if game.members_mut().remove(player_id).is_some() {
            info!(match_id, player_id, remaining = game.members().len(), "➖ Player left match");
        }
    }

    /// Removes the match outright and notifies observers with `reason`.
    /// Returns the removed match, if it existed.
    pub async fn end_match(&self, match_id: &str, reason: EndReason) -> Option<Match> {
        let removed = self.matches.remove(match_id).map(|(_, game)| game);
        match &removed {
            Some(game) => info!(
                match_id,
                %reason,
                members = game.members().len(),
                "🏁 Match ended"
            ),
            None => debug!(match_id, %reason, "End requested for unknown match"),
        }

        let generation = removed.as_ref().map(Match::generation);
        join_all(
            self.observers
                .iter()
                .map(|observer| observer.on_match_ended(match_id, generation, reason)),
        )
        .await;
        removed
    }

    /// Records where players should connect to reach the host.
    pub fn set_endpoint(&self, match_id: &str, ip: &str, port: u16) -> MatchResult<()> {
        let mut game = self
            .matches
            .get_mut(match_id)
            .ok_or_else(|| MatchError::NotFound(match_id.to_string()))?;
        game.endpoint = Some(MatchEndpoint {
            ip: ip.to_string(),
            port,
        });
        info!(match_id, ip, port, "Match endpoint registered");
        Ok(())
    }

    pub fn set_status(&self, match_id: &str, status: MatchStatus) -> MatchResult<()> {
        let mut game = self
            .matches
            .get_mut(match_id)
            .ok_or_else(|| MatchError::NotFound(match_id.to_string()))?;
        game.status = status;
        debug!(match_id, ?status, "Match status updated");
        Ok(())
    }

    /// Flags a member as dead. Fails when the match or the member is unknown.
    pub fn set_player_dead(&self, match_id: &str, player_id: &str) -> MatchResult<()> {
        let mut game = self
            .matches
            .get_mut(match_id)
            .ok_or_else(|| MatchError::NotFound(match_id.to_string()))?;
        match game.members_mut().get_mut(player_id) {
            Some(member) => {
                member.is_dead = true;
                Ok(())
            }
            None => Err(MatchError::NotFound(format!("{match_id}/{player_id}"))),
        }
    }

    /// Finds the match a player currently belongs to.
    pub fn match_for_player(&self, player_id: &str) -> Option<MatchId> {
        self.matches
            .iter()
            .find(|game| game.has_member(player_id))
            .map(|game| game.key().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::RaidSettings;
    use tokio::sync::Mutex;

    fn config(id: &str, expected: u32) -> MatchConfig {
        MatchConfig {
            server_id: id.to_string(),
            host_username: "host".to_string(),
            timestamp: 1_700_000_000,
            expected_number_of_players: expected,
            game_version: "0.14.9".to_string(),
            mod_version: "2.2.8".to_string(),
            location: "customs".to_string(),
            time: "CURR".to_string(),
            side: "Pmc".to_string(),
            raid_settings: RaidSettings {
                metabolism_disabled: false,
                players_spawn_place: "SamePlace".to_string(),
            },
            spawn_point: "spawn-a".to_string(),
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MatchObserver for RecordingObserver {
        async fn on_player_joined(&self, match_id: &str, generation: u64, player_id: &str) {
            self.events
                .lock()
                .await
                .push(format!("join {match_id}#{generation} {player_id}"));
        }

        async fn on_match_ended(&self, match_id: &str, generation: Option<u64>, reason: EndReason) {
            self.events
                .lock()
                .await
                .push(format!("end {match_id}#{generation:?} {reason}"));
        }
    }

    #[test]
    fn test_create_conflict_keeps_original_config() {
        let registry = MatchRegistry::default();
        assert!(registry.create_match(config("m1", 2)));
        assert!(!registry.create_match(config("m1", 8)));
        assert_eq!(
            registry.get_match("m1").unwrap().config.expected_number_of_players,
            2
        );
    }

    #[tokio::test]
    async fn test_add_then_remove_restores_members() {
        let registry = MatchRegistry::default();
        registry.create_match(config("m1", 2));
        registry
            .add_player("m1", "p1", MemberEntry::default())
            .await
            .unwrap();
        let before = registry.get_match("m1").unwrap().members().clone();

        registry
            .add_player("m1", "p2", MemberEntry::default())
            .await
            .unwrap();
        registry.remove_player("m1", "p2");

        assert_eq!(registry.get_match("m1").unwrap().members(), &before);
    }

    #[tokio::test]
    async fn test_add_player_is_idempotent_and_requires_match() {
        let registry = MatchRegistry::default();
        assert_eq!(
            registry.add_player("nope", "p1", MemberEntry::default()).await,
            Err(MatchError::NotFound("nope".to_string()))
        );

        registry.create_match(config("m1", 2));
        for _ in 0..3 {
            registry
                .add_player("m1", "p1", MemberEntry::default())
                .await
                .unwrap();
        }
        let members: Vec<_> = registry.get_match("m1").unwrap().members().keys().cloned().collect();
        assert_eq!(members, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_match_persists_until_explicit_end() {
        let registry = MatchRegistry::default();
        registry.create_match(config("m1", 1));
        registry
            .add_player("m1", "p1", MemberEntry::default())
            .await
            .unwrap();
        registry.remove_player("m1", "p1");
        registry.remove_player("m1", "ghost");
        registry.remove_player("unknown", "p1");

        assert!(registry.contains("m1"));
        assert!(registry.end_match("m1", EndReason::HostShutdown).await.is_some());
        assert!(registry.get_match("m1").is_none());
        assert!(registry.end_match("m1", EndReason::HostShutdown).await.is_none());
    }

    #[tokio::test]
    async fn test_observers_see_joins_and_end() {
        let observer = Arc::new(RecordingObserver::default());
        let registry = MatchRegistry::new(vec![observer.clone() as Arc<dyn MatchObserver>]);
        registry.create_match(config("m1", 2));
        registry
            .add_player("m1", "p1", MemberEntry::default())
            .await
            .unwrap();
        registry.end_match("m1", EndReason::HostShutdown).await;
        registry.end_match("m1", EndReason::PingTimeout).await;

        registry.create_match(config("m1", 2));
        registry
            .add_player("m1", "p2", MemberEntry::default())
            .await
            .unwrap();

        assert_eq!(
            *observer.events.lock().await,
            vec![
                "join m1#1 p1".to_string(),
                "end m1#Some(1) host-shutdown".to_string(),
                "end m1#None ping-timeout".to_string(),
                "join m1#2 p2".to_string(),
            ]
        );
    }

    #[test]
    fn test_match_ids_are_sorted() {
        let registry = MatchRegistry::default();
        registry.create_match(config("m2", 1));
        registry.create_match(config("m1", 1));
        assert_eq!(registry.match_ids(), vec!["m1".to_string(), "m2".to_string()]);
    }

    #[tokio::test]
    async fn test_endpoint_status_and_death() {
        let registry = MatchRegistry::default();
        registry.create_match(config("m1", 2));
        registry
            .add_player("m1", "p1", MemberEntry::default())
            .await
            .unwrap();

        registry.set_endpoint("m1", "10.0.0.5", 25565).unwrap();
        registry.set_status("m1", MatchStatus::InGame).unwrap();
        registry.set_player_dead("m1", "p1").unwrap();
        assert!(registry.set_player_dead("m1", "p2").is_err());
        assert!(registry.set_endpoint("m2", "10.0.0.5", 1).is_err());

        let game = registry.get_match("m1").unwrap();
        assert_eq!(game.endpoint.as_ref().unwrap().port, 25565);
        assert_eq!(game.status, MatchStatus::InGame);
        assert!(game.member("p1").unwrap().is_dead);
        assert_eq!(registry.match_for_player("p1").as_deref(), Some("m1"));
        assert_eq!(registry.match_for_player("p9"), None);
    }
}
