// Parley: a one-to-one terminal chat client.
// The library holds the synchronization core: the HTTP API client, the
// realtime event channel, and the reducers that reconcile the two. The
// binary is thin view glue on top.

pub mod api;
pub mod credentials;
pub mod models;
pub mod sync;

pub use api::{ApiClient, ApiError};
pub use models::{Message, MessageStatus, User};
pub use sync::ChatSession;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_status_promotion_order() {
        assert!(MessageStatus::Sent < MessageStatus::Delivered);
        assert!(MessageStatus::Delivered < MessageStatus::Read);
    }

    #[test]
    fn test_message_wire_field_names() {
        let message = Message {
            id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            sender: User {
                id: "u1".to_string(),
                username: "alice".to_string(),
            },
            text: "hello".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap(),
            status: MessageStatus::Sent,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["_id"], "m1");
        assert_eq!(value["conversationId"], "c1");
        assert_eq!(value["sender"]["_id"], "u1");
        assert_eq!(value["status"], "sent");
        assert!(value["createdAt"].as_str().unwrap().starts_with("2024-05-17T09:30:00"));
    }

    #[test]
    fn test_peer_without_last_message_parses() {
        let peer: models::Peer =
            serde_json::from_str(r#"{"_id":"u2","username":"bob"}"#).unwrap();
        assert_eq!(peer.id, "u2");
        assert!(peer.last_message.is_none());
    }
}
