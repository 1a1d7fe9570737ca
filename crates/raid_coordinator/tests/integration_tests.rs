//! Integration tests for the raid coordinator
//!
//! These drive the public controller the way the HTTP layer would and check
//! match lifecycle, dedicated dispatch, heartbeat eviction and insurance
//! settlement end to end.

use raid_coordinator::insurance::{InsuranceEntry, InsuredItem, InventoryItem};
use raid_coordinator::protocol::{
    CreateRaidRequest, DedicatedStatusRequest, JoinRaidRequest, LeaveRaidRequest,
    PlayerDiedRequest, RegisterHostRequest, ServerIdRequest,
};
use raid_coordinator::{
    ChannelRegistry, CoordinatorConfig, ExtractionReport, ForfeiturePolicy, InMemoryProfileStore,
    JsonProfileStore, PlayerProfile, ProfileStore, PushMessage, RaidCoordinator, RaidSettings,
    StartRaidPayload, TrackingOutcome, WorkerState,
};
use async_trait::async_trait;
use raid_coordinator::error::ProfileResult;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;

struct Harness {
    channels: Arc<ChannelRegistry>,
    profiles: Arc<InMemoryProfileStore>,
    coordinator: RaidCoordinator,
}

fn harness(config: CoordinatorConfig) -> Harness {
    let channels = Arc::new(ChannelRegistry::new());
    let profiles = Arc::new(InMemoryProfileStore::new());
    let coordinator = RaidCoordinator::new(config, channels.clone(), profiles.clone())
        .expect("default config is valid");
    Harness {
        channels,
        profiles,
        coordinator,
    }
}

fn create_request(server_id: &str, expected: u32) -> CreateRaidRequest {
    CreateRaidRequest {
        server_id: server_id.to_string(),
        host_username: format!("{server_id}-host"),
        timestamp: 1_717_000_000,
        expected_number_of_players: expected,
        game_version: "0.14.9.30626".to_string(),
        mod_version: "2.2.8".to_string(),
        location: "factory4_day".to_string(),
        time: "CURR".to_string(),
        side: "Pmc".to_string(),
        raid_settings: RaidSettings {
            metabolism_disabled: true,
            players_spawn_place: "Together".to_string(),
        },
        spawn_point: "Factory_West".to_string(),
    }
}

fn join(server_id: &str, profile_id: &str) -> JoinRaidRequest {
    JoinRaidRequest {
        server_id: server_id.to_string(),
        profile_id: profile_id.to_string(),
    }
}

fn insured_profile(id: &str, items: &[&str]) -> PlayerProfile {
    PlayerProfile {
        id: id.to_string(),
        insured_items: items
            .iter()
            .map(|item| InsuredItem {
                item_id: item.to_string(),
                trader_id: None,
            })
            .collect(),
        insurance: vec![InsuranceEntry {
            trader_id: "therapist".to_string(),
            scheduled_time: 0,
            items: items.iter().map(|item| InventoryItem::new(*item)).collect(),
        }],
        inventory: Vec::new(),
    }
}

fn ids(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Load,
    Save,
}

/// In-memory store that parks the first `hold` call for one player until the
/// test releases it.
#[derive(Debug)]
struct HoldingStore {
    inner: InMemoryProfileStore,
    player_id: String,
    hold: Hold,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl HoldingStore {
    fn new(player_id: &str, hold: Hold) -> Self {
        Self {
            inner: InMemoryProfileStore::new(),
            player_id: player_id.to_string(),
            hold,
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    async fn pause_if_held(&self, player_id: &str, op: Hold) {
        if op == self.hold
            && player_id == self.player_id
            && self.armed.swap(false, Ordering::SeqCst)
        {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl ProfileStore for HoldingStore {
    async fn load(&self, player_id: &str) -> ProfileResult<PlayerProfile> {
        self.pause_if_held(player_id, Hold::Load).await;
        self.inner.load(player_id).await
    }

    async fn save(&self, profile: &PlayerProfile) -> ProfileResult<()> {
        self.pause_if_held(&profile.id, Hold::Save).await;
        self.inner.save(profile).await
    }
}

fn host_leave(server_id: &str) -> LeaveRaidRequest {
    LeaveRaidRequest {
        server_id: server_id.to_string(),
        profile_id: server_id.to_string(),
    }
}

fn payload() -> StartRaidPayload {
    StartRaidPayload {
        location_id: "woods".to_string(),
        time: "CURR".to_string(),
        side: "Pmc".to_string(),
        spawn_place: "SamePlace".to_string(),
        metabolism_disabled: false,
        settings: serde_json::json!({ "botDifficulty": "normal" }),
    }
}

#[tokio::test]
async fn test_host_leave_settles_insurance_for_remaining_players() {
    let h = harness(CoordinatorConfig::default());
    h.profiles.insert(insured_profile("P1", &["X"]));
    h.profiles.insert(insured_profile("P2", &["Y"]));
    let controller = h.coordinator.controller();
    let insurance = h.coordinator.insurance();

    assert!(controller.create(create_request("M1", 2)).success);
    let joined = controller.join(join("M1", "P1")).await.unwrap();
    assert_eq!(joined.expected_number_of_players, 2);
    controller.join(join("M1", "P2")).await.unwrap();

    assert_eq!(
        insurance.begin_tracking("M1", "P1").await.unwrap(),
        TrackingOutcome::Refreshed
    );

    let report = ExtractionReport {
        items: vec![InventoryItem::new("X")],
        exit_status: Some("Survived".to_string()),
    };
    let settled = controller.save_post_raid("P1", &report).await.unwrap();
    assert!(settled.is_none());
    assert_eq!(
        insurance.tracked_players("M1").await.unwrap(),
        vec!["P2".to_string()]
    );
    assert_eq!(h.profiles.get("P1").unwrap().ledger_item_ids(), ids(&["X"]));

    controller
        .leave(LeaveRaidRequest {
            server_id: "M1".to_string(),
            profile_id: "M1".to_string(),
        })
        .await;

    assert!(h.coordinator.matches().get_match("M1").is_none());
    assert!(!insurance.is_tracked("M1"));
    // X was carried out, Y never showed up in any final inventory.
    assert_eq!(h.profiles.get("P1").unwrap().ledger_item_ids(), ids(&["X"]));
    assert!(h.profiles.get("P2").unwrap().insurance.is_empty());
}

#[tokio::test]
async fn test_last_extraction_settles_without_host_leave() {
    let h = harness(CoordinatorConfig {
        forfeiture_policy: ForfeiturePolicy::ExtractedItems,
        ..Default::default()
    });
    h.profiles.insert(insured_profile("P1", &["A", "B"]));
    let controller = h.coordinator.controller();

    controller.create(create_request("M2", 1));
    controller.join(join("M2", "P1")).await.unwrap();

    let report = ExtractionReport {
        items: vec![InventoryItem::new("A")],
        exit_status: None,
    };
    let summary = controller
        .save_post_raid("P1", &report)
        .await
        .unwrap()
        .expect("index drained");
    assert_eq!(summary.items_forfeited(), 1);
    assert_eq!(h.profiles.get("P1").unwrap().ledger_item_ids(), ids(&["B"]));

    // The match itself only ends on an explicit host leave.
    assert!(h.coordinator.matches().contains("M2"));
}

#[tokio::test]
async fn test_untracked_player_save_is_passed_through() {
    let h = harness(CoordinatorConfig::default());
    h.profiles.insert(PlayerProfile::new("solo"));

    let report = ExtractionReport {
        items: vec![InventoryItem::new("loot")],
        exit_status: Some("Survived".to_string()),
    };
    let settled = h
        .coordinator
        .controller()
        .save_post_raid("solo", &report)
        .await
        .unwrap();

    assert!(settled.is_none());
    assert_eq!(h.profiles.get("solo").unwrap().inventory, report.items);
    assert!(h
        .coordinator
        .controller()
        .save_post_raid("ghost", &report)
        .await
        .is_err());
}

#[tokio::test]
async fn test_create_conflict_and_unknown_lookups() {
    let h = harness(CoordinatorConfig::default());
    let controller = h.coordinator.controller();

    assert!(controller.create(create_request("M1", 2)).success);
    assert!(!controller.create(create_request("M1", 6)).success);

    let lookup = ServerIdRequest {
        server_id: "M1".to_string(),
    };
    assert_eq!(
        controller.get_spawnpoint(&lookup).unwrap().spawnpoint,
        "Factory_West"
    );
    assert!(controller.get_settings(&lookup).unwrap().metabolism_disabled);
    assert!(controller.get_host(&lookup).is_none());

    assert!(controller.register_host_endpoint(&RegisterHostRequest {
        server_id: "M1".to_string(),
        ip: "192.168.1.20".to_string(),
        port: 25565,
    }));
    let host = controller.get_host(&lookup).unwrap();
    assert_eq!((host.ip.as_str(), host.port), ("192.168.1.20", 25565));

    let missing = ServerIdRequest {
        server_id: "nope".to_string(),
    };
    assert!(controller.get_host(&missing).is_none());
    assert!(controller.get_spawnpoint(&missing).is_none());
    assert!(controller.get_settings(&missing).is_none());
    assert!(controller.get_status(&missing).is_none());
    assert!(controller.join(join("nope", "P1")).await.is_none());
}

#[tokio::test]
async fn test_non_host_leave_keeps_match() {
    let h = harness(CoordinatorConfig::default());
    let controller = h.coordinator.controller();
    controller.create(create_request("M1", 2));
    controller.join(join("M1", "P1")).await.unwrap();
    controller.join(join("M1", "P2")).await.unwrap();

    assert!(controller.mark_player_dead(&PlayerDiedRequest {
        server_id: "M1".to_string(),
        profile_id: "P2".to_string(),
    }));
    controller
        .leave(LeaveRaidRequest {
            server_id: "M1".to_string(),
            profile_id: "P1".to_string(),
        })
        .await;
    controller
        .leave(LeaveRaidRequest {
            server_id: "M1".to_string(),
            profile_id: "P2".to_string(),
        })
        .await;

    let status = controller
        .get_status(&ServerIdRequest {
            server_id: "M1".to_string(),
        })
        .unwrap();
    assert!(status.players.is_empty());
    assert!(h.coordinator.insurance().is_tracked("M1"));
}

#[tokio::test]
async fn test_dedicated_worker_round_trip() {
    let h = harness(CoordinatorConfig::default());
    let controller = h.coordinator.controller();

    let response = controller.start_dedicated("P1", payload()).await;
    assert_eq!(response.match_id, None);
    assert_eq!(response.error.as_deref(), Some("No dedicated clients available"));

    let mut worker_rx = h.channels.connect("W1");
    let mut player_rx = h.channels.connect("P1");
    let echoed = controller
        .dedicated_status(
            "W1",
            DedicatedStatusRequest {
                session_id: "W1".to_string(),
                status: WorkerState::Ready,
            },
        )
        .await;
    assert_eq!(echoed.status, WorkerState::Ready);

    let response = controller.start_dedicated("P1", payload()).await;
    assert_eq!(response.match_id.as_deref(), Some("W1"));
    assert_eq!(response.error, None);
    assert_eq!(worker_rx.recv().await, Some(PushMessage::StartRaid(payload())));

    let busy = controller.start_dedicated("P2", payload()).await;
    assert_eq!(
        busy.error.as_deref(),
        Some("No dedicated clients available at this time")
    );
    let recursive = controller.start_dedicated("W1", payload()).await;
    assert_eq!(
        recursive.error.as_deref(),
        Some("A dedicated client cannot request another dedicated client")
    );

    // The worker hosts under its own id and joins first.
    assert!(controller.create(create_request("W1", 1)).success);
    controller.join(join("W1", "W1")).await.unwrap();
    assert_eq!(
        player_rx.recv().await,
        Some(PushMessage::JoinMatch {
            match_id: "W1".to_string()
        })
    );

    controller.join(join("W1", "P1")).await.unwrap();
    let stats = h.coordinator.stats().await;
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.workers.pending_dispatches, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_evicts_silent_worker_and_its_dispatch() {
    let h = harness(CoordinatorConfig::default());
    let controller = h.coordinator.controller();
    let _worker_rx = h.channels.connect("W1");

    controller
        .dedicated_status(
            "W1",
            DedicatedStatusRequest {
                session_id: "W1".to_string(),
                status: WorkerState::Ready,
            },
        )
        .await;
    assert!(controller.start_dedicated("P1", payload()).await.match_id.is_some());
    h.coordinator.start_sweeper().await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(h.coordinator.workers().is_worker("W1").await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!h.coordinator.workers().is_worker("W1").await);
    assert_eq!(h.coordinator.workers().pending_requester("W1").await, None);

    h.coordinator.shutdown().await;
    assert!(!h.coordinator.is_sweeping().await);
}

#[tokio::test]
async fn test_json_profile_store_backs_reconciliation() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(JsonProfileStore::open(dir.path()).await.unwrap());
    store.save(&insured_profile("P1", &["A", "B", "C"])).await.unwrap();

    let coordinator = RaidCoordinator::new(
        CoordinatorConfig::default(),
        Arc::new(ChannelRegistry::new()),
        store.clone(),
    )
    .unwrap();
    let controller = coordinator.controller();
    controller.create(create_request("M1", 1));
    controller.join(join("M1", "P1")).await.unwrap();

    let report = ExtractionReport {
        items: vec![InventoryItem::new("A"), InventoryItem::new("C")],
        exit_status: Some("Survived".to_string()),
    };
    controller.save_post_raid("P1", &report).await.unwrap();

    let profile = store.load("P1").await.unwrap();
    assert_eq!(profile.ledger_item_ids(), ids(&["A", "C"]));
    assert_eq!(profile.inventory, report.items);
}

#[tokio::test]
async fn test_join_racing_host_leave_leaves_no_tracking_behind() {
    let store = Arc::new(HoldingStore::new("P1", Hold::Load));
    store.inner.insert(insured_profile("P1", &["X"]));
    let coordinator = RaidCoordinator::new(
        CoordinatorConfig::default(),
        Arc::new(ChannelRegistry::new()),
        store.clone(),
    )
    .unwrap();
    let controller = coordinator.controller().clone();
    let insurance = coordinator.insurance();

    controller.create(create_request("M1", 2));
    controller.join(join("M1", "M1")).await.unwrap();

    let late_join = tokio::spawn({
        let controller = controller.clone();
        async move { controller.join(join("M1", "P1")).await }
    });
    store.reached.notified().await;

    controller.leave(host_leave("M1")).await;
    store.release.notify_one();
    assert!(late_join.await.unwrap().is_none());

    assert!(coordinator.matches().get_match("M1").is_none());
    assert!(!insurance.is_tracked("M1"));
    assert_eq!(insurance.match_for_player("P1").await, None);
    assert_eq!(store.inner.get("P1").unwrap().ledger_item_ids(), ids(&["X"]));

    // The host's next raid under the same id starts clean.
    controller.create(create_request("M1", 2));
    controller.join(join("M1", "M1")).await.unwrap();
    assert_eq!(
        insurance.tracked_players("M1").await.unwrap(),
        vec!["M1".to_string()]
    );
}

#[tokio::test]
async fn test_direct_save_waits_for_ledger_rewrite() {
    let store = Arc::new(HoldingStore::new("P2", Hold::Save));
    store.inner.insert(insured_profile("P2", &["A", "B"]));
    let coordinator = RaidCoordinator::new(
        CoordinatorConfig::default(),
        Arc::new(ChannelRegistry::new()),
        store.clone(),
    )
    .unwrap();
    let controller = coordinator.controller().clone();

    controller.create(create_request("M1", 2));
    controller.join(join("M1", "M1")).await.unwrap();
    controller.join(join("M1", "P2")).await.unwrap();

    let leave = tokio::spawn({
        let controller = controller.clone();
        async move { controller.leave(host_leave("M1")).await }
    });
    store.reached.notified().await;
    assert_eq!(coordinator.insurance().match_for_player("P2").await, None);

    let report = ExtractionReport {
        items: vec![InventoryItem::new("loot")],
        exit_status: Some("Survived".to_string()),
    };
    let save = tokio::spawn({
        let controller = controller.clone();
        let report = report.clone();
        async move { controller.save_post_raid("P2", &report).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!save.is_finished());

    store.release.notify_one();
    leave.await.unwrap();
    assert!(save.await.unwrap().unwrap().is_none());

    let profile = store.inner.get("P2").unwrap();
    assert!(profile.insurance.is_empty());
    assert_eq!(profile.inventory, report.items);
}
