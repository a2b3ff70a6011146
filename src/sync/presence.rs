// Who is online, according to the server's latest snapshot.
// No diffing and no client-side TTL: each `getOnlineUsers` push replaces the
// set wholesale, and staleness is entirely the server's problem.

use std::collections::HashSet;

use tokio::sync::broadcast;

use super::ServerEvent;

pub struct PresenceTracker {
    online: HashSet<String>,
    events: broadcast::Receiver<ServerEvent>,
}

impl PresenceTracker {
    pub fn new(events: broadcast::Receiver<ServerEvent>) -> Self {
        Self {
            online: HashSet::new(),
            events,
        }
    }

    /// Drain pending events and apply any presence snapshots. Returns
    /// whether the set changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(ServerEvent::OnlineUsers { user_ids }) => {
                    changed = true;
                    self.apply_snapshot(user_ids);
                }
                Ok(_) => {}
                // Dropped events are fine: the next snapshot supersedes
                // anything we missed.
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        changed
    }

    pub fn apply_snapshot(&mut self, user_ids: Vec<String>) {
        self.online = user_ids.into_iter().collect();
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }
}
