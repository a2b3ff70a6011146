// HTTP request/response client for the chat API.
// Durable state changes (auth, conversations, messages) go through here; the
// realtime channel only carries notifications about them. Every call attaches
// the session token, and authentication failures are surfaced separately from
// transport errors so the caller can prompt a re-login instead of retrying.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::models::{Conversation, Message, Peer, User};

const AUTH_HEADER: &str = "x-auth-token";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

/// What the auth endpoints return: an opaque session credential plus who it
/// belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Install the session credential issued by `login`/`register`.
    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    fn token(&self) -> ApiResult<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| ApiError::Auth("no session token".to_string()))
    }

    /// Map non-2xx responses: 401/403 means the credential was rejected,
    /// anything else is a plain server error.
    async fn check(resp: reqwest::Response) -> ApiResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Auth(if message.is_empty() {
                status.to_string()
            } else {
                message
            }));
        }
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthResponse> {
        self.authenticate("login", username, password).await
    }

    pub async fn register(&self, username: &str, password: &str) -> ApiResult<AuthResponse> {
        self.authenticate("register", username, password).await
    }

    async fn authenticate(
        &self,
        action: &str,
        username: &str,
        password: &str,
    ) -> ApiResult<AuthResponse> {
        let url = format!("{}/api/auth/{}", self.base_url, action);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        // Login rejections come back as plain 400s; any failure from the
        // auth endpoints is an authentication failure as far as the caller
        // is concerned.
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Auth(if message.is_empty() {
                status.to_string()
            } else {
                message
            }));
        }
        Ok(resp.json().await?)
    }

    /// Find or create the conversation with `peer_id`. Idempotent: repeated
    /// calls for the same pair return the same conversation.
    pub async fn resolve_conversation(&self, peer_id: &str) -> ApiResult<Conversation> {
        let url = format!("{}/api/conversations", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header(AUTH_HEADER, self.token()?)
            .json(&json!({ "recipientId": peer_id }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Message history for a conversation, in chronological order.
    pub async fn list_messages(&self, conversation_id: &str) -> ApiResult<Vec<Message>> {
        let url = format!(
            "{}/api/conversations/{}/messages",
            self.base_url, conversation_id
        );
        let resp = self
            .http
            .get(&url)
            .header(AUTH_HEADER, self.token()?)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Create a message and return the canonical record, with the
    /// server-assigned id and timestamp.
    pub async fn create_message(&self, conversation_id: &str, text: &str) -> ApiResult<Message> {
        let url = format!(
            "{}/api/conversations/{}/messages",
            self.base_url, conversation_id
        );
        let resp = self
            .http
            .post(&url)
            .header(AUTH_HEADER, self.token()?)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn delete_message(&self, conversation_id: &str, message_id: &str) -> ApiResult<()> {
        let url = format!(
            "{}/api/conversations/{}/messages/{}",
            self.base_url, conversation_id, message_id
        );
        let resp = self
            .http
            .delete(&url)
            .header(AUTH_HEADER, self.token()?)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// All peers we can chat with, each with an optional last-message
    /// preview, most recently active first.
    pub async fn list_peers(&self) -> ApiResult<Vec<Peer>> {
        let url = format!("{}/api/users", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header(AUTH_HEADER, self.token()?)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
