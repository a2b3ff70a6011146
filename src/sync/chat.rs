// The open conversation: an explicit session object constructed when the
// view opens and destroyed when it closes. It owns the message store, the
// typing state, and its own subscription to the event stream. Closing the
// session is what unregisters the listeners, so a stale handler firing after
// teardown is impossible rather than unlikely.

use anyhow::Result;
use log::{debug, warn};
use tokio::sync::broadcast;

use crate::api::ApiClient;
use crate::models::{Message, User};

use super::connection::SyncSession;
use super::store::MessageStore;
use super::typing::{TypingController, TypingSignal};
use super::{ClientEvent, ServerEvent};

pub struct ChatSession {
    me: User,
    peer: User,
    api: ApiClient,
    sync: SyncSession,
    store: MessageStore,
    typing: TypingController,
    events: broadcast::Receiver<ServerEvent>,
}

impl ChatSession {
    /// Open the conversation with `peer`: resolve the conversation record
    /// (find-or-create), load its history, subscribe to the event stream,
    /// then acknowledge everything the peer sent while we were away with one
    /// batch read receipt. The receipt is best-effort: a failure to notify
    /// must not block rendering.
    pub async fn open(api: ApiClient, sync: SyncSession, me: User, peer: User) -> Result<Self> {
        // Subscribe before the history fetch: events that land while the
        // request is in flight sit in the receiver's buffer and the
        // id-deduplicating insert absorbs any overlap with the page.
        let events = sync.subscribe();

        let conversation = api.resolve_conversation(&peer.id).await?;
        let history = api.list_messages(&conversation.id).await?;

        let mut store = MessageStore::new(conversation.id);
        store.load_history(history);
        let session = Self {
            typing: TypingController::new(peer.id.clone()),
            me,
            peer,
            api,
            sync,
            store,
            events,
        };

        let unread = session.store.unread_from(&session.peer.id);
        if !unread.is_empty() {
            session.notify_read(unread).await;
        }

        Ok(session)
    }

    pub fn me(&self) -> &User {
        &self.me
    }

    pub fn peer(&self) -> &User {
        &self.peer
    }

    pub fn conversation_id(&self) -> &str {
        self.store.conversation_id()
    }

    /// Render order: most recent first.
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn peer_typing(&self) -> bool {
        self.typing.peer_typing()
    }

    /// Send a message. The durable create completes first; only then is the
    /// canonical message (server id and timestamp) inserted into the store
    /// and fanned out to the peer. That ordering is a designed invariant:
    /// the peer must never learn an id the sender's own store does not hold,
    /// and later delete/read events can always address the message by id.
    /// On a failed create nothing is inserted and nothing is notified.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let message = self
            .api
            .create_message(self.store.conversation_id(), text)
            .await?;
        let notify = ClientEvent::MessageSend {
            conversation_id: message.conversation_id.clone(),
            to: self.peer.id.clone(),
            message: message.clone(),
        };
        self.store.insert(message);
        if let Err(e) = self.sync.send(notify).await {
            warn!("send notification not delivered: {}", e);
        }
        Ok(())
    }

    /// Delete one of our own messages: optimistic local removal, realtime
    /// notification to the peer, then the durable delete. A failed durable
    /// delete is logged and tolerated; deletion is advisory, and the
    /// message is not resurrected. Authorization (own messages only) is the
    /// caller's job; the store removes whatever id it is told to.
    pub async fn delete(&mut self, message_id: &str) {
        if !self.store.remove(message_id) {
            return;
        }
        let notify = ClientEvent::MessageDelete {
            message_id: message_id.to_string(),
            conversation_id: self.store.conversation_id().to_string(),
            to: self.peer.id.clone(),
        };
        if let Err(e) = self.sync.send(notify).await {
            warn!("delete notification not delivered: {}", e);
        }
        if let Err(e) = self
            .api
            .delete_message(self.store.conversation_id(), message_id)
            .await
        {
            warn!("failed to persist deletion of {}: {}", message_id, e);
        }
    }

    /// Forward the local input state to the typing controller, emitting
    /// `typing:start`/`typing:stop` on empty/non-empty edges only.
    pub async fn input_changed(&mut self, text: &str) {
        let signal = match self.typing.local_change(text) {
            Some(signal) => signal,
            None => return,
        };
        let event = match signal {
            TypingSignal::Start => ClientEvent::TypingStart {
                to: self.peer.id.clone(),
            },
            TypingSignal::Stop => ClientEvent::TypingStop {
                to: self.peer.id.clone(),
            },
        };
        if let Err(e) = self.sync.send(event).await {
            debug!("typing signal not delivered: {}", e);
        }
    }

    /// Drain and apply pending server events. Returns whether anything the
    /// view renders changed.
    pub async fn pump(&mut self) -> bool {
        let mut changed = false;
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("conversation lagged {} events behind the channel", n);
                    continue;
                }
                Err(_) => break,
            };
            changed |= self.apply(event).await;
        }
        changed
    }

    async fn apply(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::MessageNew { message } => {
                if message.conversation_id != self.store.conversation_id() {
                    // Another conversation's traffic. The inbox aggregator
                    // sees it on its own subscription; this store must not.
                    return false;
                }
                let id = message.id.clone();
                if !self.store.insert(message) {
                    debug!("duplicate delivery of {} ignored", id);
                    return false;
                }
                self.typing.clear();
                // The conversation is open, so the message is read the
                // instant it lands.
                self.notify_read(vec![id]).await;
                true
            }
            ServerEvent::MessageDeleted { message_id } => self.store.remove(&message_id),
            ServerEvent::ReadReceipt { message_ids } => self.store.apply_read(&message_ids) > 0,
            ServerEvent::TypingStart { from } => self.typing.apply_remote(&from, true),
            ServerEvent::TypingStop { from } => self.typing.apply_remote(&from, false),
            ServerEvent::OnlineUsers { .. } => false,
        }
    }

    async fn notify_read(&self, message_ids: Vec<String>) {
        let receipt = ClientEvent::MessagesRead {
            message_ids,
            conversation_id: self.store.conversation_id().to_string(),
        };
        if let Err(e) = self.sync.send(receipt).await {
            warn!("read receipt not delivered: {}", e);
        }
    }

    /// Close the conversation view. Consuming the session drops its event
    /// subscription, so teardown is complete before a successor can install
    /// its own listeners.
    pub fn close(self) {}
}
