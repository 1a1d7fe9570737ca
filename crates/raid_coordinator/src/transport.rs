//! Outbound push channel to connected clients.
//!
//! The coordinator never talks to sockets directly. It hands [`PushMessage`]s
//! to a [`PushChannel`] implementation owned by the transport layer. Delivery
//! is best-effort: a `false` return means the recipient had no open channel.

use crate::dispatch::StartRaidPayload;
use crate::types::MatchId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Messages pushed from the coordinator to a single client.
///
/// Serialized as JSON tagged by `type`, e.g.
///
/// ```json
/// { "type": "joinMatch", "matchId": "6650f1c2" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushMessage {
    /// Tells a reserved worker to start hosting a raid.
    StartRaid(StartRaidPayload),

    /// Tells the original requester which match to join.
    #[serde(rename_all = "camelCase")]
    JoinMatch { match_id: MatchId },
}

/// Addressable, fire-and-forget sink for client messages.
///
/// Implementations must not block: the dispatcher calls them while serving
/// requests.
pub trait PushChannel: Send + Sync + std::fmt::Debug {
    /// Queue `message` for `recipient`. Returns whether it was accepted.
    fn send(&self, recipient: &str, message: PushMessage) -> bool;

    /// Whether `recipient` currently has an open channel.
    fn is_connected(&self, recipient: &str) -> bool;
}

/// In-process [`PushChannel`] backed by one unbounded mpsc queue per client.
///
/// The transport layer calls [`connect`](Self::connect) when a client's
/// socket opens and drains the returned receiver into it.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    senders: DashMap<String, mpsc::UnboundedSender<PushMessage>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or replaces) the channel for `client_id`.
    pub fn connect(&self, client_id: &str) -> mpsc::UnboundedReceiver<PushMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.senders.insert(client_id.to_string(), tx).is_some() {
            debug!(client_id, "Replaced existing push channel");
        }
        rx
    }

    pub fn connected_count(&self) -> usize {
        self.senders.len()
    }
}

impl PushChannel for ChannelRegistry {
    fn send(&self, recipient: &str, message: PushMessage) -> bool {
        let delivered = match self.senders.get(recipient) {
            Some(sender) => sender.send(message).is_ok(),
            None => return false,
        };

        if !delivered {
            // Receiver side is gone; forget the dead sender.
            self.senders.remove_if(recipient, |_, sender| sender.is_closed());
        }
        delivered
    }

    fn is_connected(&self, recipient: &str) -> bool {
        self.senders
            .get(recipient)
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }
}
