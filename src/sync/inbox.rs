// Inbox aggregation: the peer list with last-message previews, kept fresh
// from the same event stream the open conversation consumes. Unlike the
// message store, this sees messages for every conversation.

use log::debug;
use tokio::sync::broadcast;

use crate::api::{ApiClient, ApiResult};
use crate::models::{LastMessage, Message, Peer};

use super::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxUpdate {
    Unchanged,
    Updated,
    /// A message arrived from a sender the current list does not know.
    /// Rather than fabricating a partial entry, the whole list must be
    /// re-fetched; the extra round trip is the price of correctness.
    ResyncNeeded,
}

pub struct InboxAggregator {
    own_id: String,
    peers: Vec<Peer>,
    events: broadcast::Receiver<ServerEvent>,
}

impl InboxAggregator {
    pub fn new(own_id: impl Into<String>, events: broadcast::Receiver<ServerEvent>) -> Self {
        Self {
            own_id: own_id.into(),
            peers: Vec::new(),
            events,
        }
    }

    /// Ordered by recency of the last message; entries that never chatted
    /// with us sit wherever the server put them.
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Fetch the full peer list. Used on open and as the recovery path for
    /// `ResyncNeeded`.
    pub async fn resync(&mut self, api: &ApiClient) -> ApiResult<()> {
        let peers = api.list_peers().await?;
        self.set_peers(peers);
        Ok(())
    }

    /// Replace the list wholesale, exactly as a fresh fetch would.
    pub fn set_peers(&mut self, peers: Vec<Peer>) {
        self.peers = peers;
    }

    /// Fold one incoming message into the list: a known sender's entry gets
    /// the new preview and moves to the front; our own messages are not
    /// inbox traffic.
    pub fn apply_message(&mut self, message: &Message) -> InboxUpdate {
        if message.sender.id == self.own_id {
            return InboxUpdate::Unchanged;
        }
        match self.peers.iter().position(|p| p.id == message.sender.id) {
            Some(at) => {
                let mut entry = self.peers.remove(at);
                entry.last_message = Some(LastMessage {
                    text: message.text.clone(),
                    created_at: message.created_at,
                });
                self.peers.insert(0, entry);
                InboxUpdate::Updated
            }
            None => {
                debug!(
                    "message from unknown peer {}; inbox resync required",
                    message.sender.id
                );
                InboxUpdate::ResyncNeeded
            }
        }
    }

    /// Drain pending events. `ResyncNeeded` dominates `Updated`, which
    /// dominates `Unchanged`.
    pub fn pump(&mut self) -> InboxUpdate {
        let mut result = InboxUpdate::Unchanged;
        loop {
            match self.events.try_recv() {
                Ok(ServerEvent::MessageNew { message }) => {
                    match self.apply_message(&message) {
                        InboxUpdate::ResyncNeeded => result = InboxUpdate::ResyncNeeded,
                        InboxUpdate::Updated if result == InboxUpdate::Unchanged => {
                            result = InboxUpdate::Updated
                        }
                        _ => {}
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    // A missed event could have been from an unknown sender.
                    debug!("inbox lagged {} events behind the channel; forcing resync", n);
                    result = InboxUpdate::ResyncNeeded;
                }
                Err(_) => break,
            }
        }
        result
    }
}
