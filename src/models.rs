// Data model shared by the HTTP API and the realtime event channel.
// Serde renames follow the server's JSON (Mongo-style `_id`, camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
}

/// An inbox entry: a peer plus a preview of the most recent message, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(rename = "lastMessage", skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// The durable pairing record between two users. Created lazily server-side;
/// the client only caches the resolved id for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "participants", default)]
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Assigned by the server at creation; the client never fabricates one.
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub sender: User,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

/// Delivery state of a message, from the sender's perspective. The variant
/// order is the promotion order: transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted by the server.
    Sent,
    /// Reached the recipient's device.
    Delivered,
    /// Observed by the recipient while the conversation was open.
    Read,
}
