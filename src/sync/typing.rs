// Typing indicator state for the open conversation: edge detection for the
// local input, a peer-filtered flag for the remote side.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

pub struct TypingController {
    peer_id: String,
    composing: bool,
    peer_typing: bool,
}

impl TypingController {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            composing: false,
            peer_typing: false,
        }
    }

    /// Called on every local input change. Emits exactly one signal when the
    /// input crosses the empty/non-empty boundary in either direction;
    /// keystrokes that stay on the same side emit nothing.
    pub fn local_change(&mut self, text: &str) -> Option<TypingSignal> {
        let composing = !text.is_empty();
        if composing == self.composing {
            return None;
        }
        self.composing = composing;
        Some(if composing {
            TypingSignal::Start
        } else {
            TypingSignal::Stop
        })
    }

    /// Remote start/stop. Events from anyone but the tracked peer are
    /// ignored. Returns whether the flag changed.
    pub fn apply_remote(&mut self, from: &str, started: bool) -> bool {
        if from != self.peer_id {
            return false;
        }
        let changed = self.peer_typing != started;
        self.peer_typing = started;
        changed
    }

    /// A message arriving from the peer supersedes any stale `typing:start`,
    /// so the flag can never stick true on a lost stop event.
    pub fn clear(&mut self) {
        self.peer_typing = false;
    }

    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }
}
