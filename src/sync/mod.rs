// Realtime synchronization core.
// The event channel delivers pushes (new messages, receipts, typing,
// presence, deletions); the reducers in this module fold them into the
// in-memory state the views render. Event names on the wire follow the
// server's socket protocol (`message:new`, `typing:start`, ...).

pub mod chat;
pub mod connection;
pub mod inbox;
pub mod presence;
pub mod store;
pub mod typing;

pub use chat::ChatSession;
pub use connection::{ConnectionManager, SyncSession};
pub use inbox::{InboxAggregator, InboxUpdate};
pub use presence::PresenceTracker;
pub use store::MessageStore;
pub use typing::{TypingController, TypingSignal};

use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Notifications this client pushes to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Announce who this channel session belongs to. Sent on every
    /// successful connect, not just the first one.
    #[serde(rename = "addUser")]
    Register {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// Fan a just-persisted message out to its recipient. Carries the
    /// canonical message plus routing metadata.
    #[serde(rename = "message:send")]
    MessageSend {
        message: Message,
        to: String,
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },

    #[serde(rename = "message:delete")]
    MessageDelete {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "conversationId")]
        conversation_id: String,
        to: String,
    },

    /// Batch read receipt for messages observed in the open conversation.
    #[serde(rename = "message:read")]
    MessagesRead {
        #[serde(rename = "messageIds")]
        message_ids: Vec<String>,
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },

    #[serde(rename = "typing:start")]
    TypingStart { to: String },

    #[serde(rename = "typing:stop")]
    TypingStop { to: String },
}

impl ClientEvent {
    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Register { .. } => "addUser",
            ClientEvent::MessageSend { .. } => "message:send",
            ClientEvent::MessageDelete { .. } => "message:delete",
            ClientEvent::MessagesRead { .. } => "message:read",
            ClientEvent::TypingStart { .. } => "typing:start",
            ClientEvent::TypingStop { .. } => "typing:stop",
        }
    }
}

/// Events the server pushes to this client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    #[serde(rename = "message:deleted")]
    MessageDeleted {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    #[serde(rename = "message:read:receipt")]
    ReadReceipt {
        #[serde(rename = "messageIds")]
        message_ids: Vec<String>,
    },

    #[serde(rename = "typing:start")]
    TypingStart { from: String },

    #[serde(rename = "typing:stop")]
    TypingStop { from: String },

    /// Full presence snapshot; replaces the online set wholesale.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers {
        #[serde(rename = "userIds")]
        user_ids: Vec<String>,
    },
}
