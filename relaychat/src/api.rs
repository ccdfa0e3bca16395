//! HTTP client for the chat server's REST API.
//!
//! Covers the account and history endpoints the chat views need: user
//! lookup, registration, login, username and password changes, the chat
//! list, and the message history between two users. The server reports failures as a JSON body with an
//! `error` field holding either a string or an object of per-field
//! messages.

use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// REST base URL used when nothing is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

/// Per-request timeout used when nothing is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Reason shown when the server rejects a request without saying why.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Errors from REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never got a usable HTTP response.
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{0}")]
    Rejected(String),

    /// A success response whose body did not have the expected shape.
    #[error("Invalid response from server")]
    InvalidResponse,

    /// Refused before anything was sent.
    #[error("{0}")]
    Input(&'static str),
}

/// Input refusals for profile changes.
pub mod refusal {
    pub const EMPTY_USERNAME: &str = "Please enter a new username";
    pub const SAME_USERNAME: &str = "New username cannot be the same as current username";
    pub const EMPTY_CURRENT_PASSWORD: &str = "Please enter your current password";
    pub const EMPTY_NEW_PASSWORD: &str = "Please enter a new password";
    pub const SAME_PASSWORD: &str = "New password cannot be the same as current password";
}

/// Body of the register and login requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Local IPv4 address packed big-endian into an integer.
    pub ip: u32,
}

impl Credentials {
    /// Credentials carrying this machine's outward-facing IPv4 address.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ip: local_ip(),
        }
    }
}

/// A user as embedded in chat and message records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRef {
    pub username: String,
}

/// Latest message of one conversation, as listed by `GET /api/chats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSummary {
    pub sender: UserRef,
    pub receiver: UserRef,
    pub text: String,
    pub time: String,
}

impl ChatSummary {
    /// The other participant of this conversation, seen from `username`.
    #[must_use]
    pub fn peer_for(&self, username: &str) -> &str {
        let peer = if self.sender.username == username {
            &self.receiver.username
        } else {
            &self.sender.username
        };
        if peer.is_empty() { "Unknown" } else { peer }
    }
}

/// One stored message between two users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryMessage {
    pub sender: UserRef,
    pub text: String,
    pub time: String,
}

#[derive(Deserialize)]
struct ChatList {
    #[serde(default)]
    chats: Vec<ChatSummary>,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

/// Client for the chat server REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Build a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether `username` is a registered user.
    ///
    /// # Errors
    ///
    /// Any status other than 200 or 404 is [`ApiError::Rejected`].
    pub async fn user_exists(&self, username: &str) -> Result<bool, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/users"))
            .query(&[("username", username)])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(username, "user not found");
            return Ok(false);
        }
        check(resp).await?;
        Ok(true)
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// [`ApiError::Rejected`] carries the server's reason, e.g. a taken
    /// username.
    pub async fn register(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url("/api/users/register"))
            .json(credentials)
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(username = %credentials.username, "registered");
        Ok(())
    }

    /// Log in.
    ///
    /// # Errors
    ///
    /// [`ApiError::Rejected`] carries the server's reason.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url("/api/users/login"))
            .json(credentials)
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(username = %credentials.username, "logged in");
        Ok(())
    }

    /// Rename `current` to `new_username` (trimmed). Returns the new name.
    ///
    /// # Errors
    ///
    /// [`ApiError::Input`] if the new name is empty or unchanged, without
    /// contacting the server; otherwise [`ApiError::Rejected`] with the
    /// server's reason, e.g. a taken username.
    pub async fn update_username(
        &self,
        current: &str,
        new_username: &str,
    ) -> Result<String, ApiError> {
        let new_username = new_username.trim();
        if new_username.is_empty() {
            return Err(ApiError::Input(refusal::EMPTY_USERNAME));
        }
        if new_username == current {
            return Err(ApiError::Input(refusal::SAME_USERNAME));
        }
        let resp = self
            .client
            .put(self.url("/api/users/username"))
            .query(&[("oldUsername", current), ("newUsername", new_username)])
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(old = current, new = new_username, "username changed");
        Ok(new_username.to_string())
    }

    /// Change the password of `username`. Both passwords are trimmed.
    ///
    /// # Errors
    ///
    /// [`ApiError::Input`] if either password is empty or they match;
    /// otherwise [`ApiError::Rejected`] with the server's reason, e.g. a
    /// wrong current password.
    pub async fn update_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let (old_password, new_password) = (old_password.trim(), new_password.trim());
        if old_password.is_empty() {
            return Err(ApiError::Input(refusal::EMPTY_CURRENT_PASSWORD));
        }
        if new_password.is_empty() {
            return Err(ApiError::Input(refusal::EMPTY_NEW_PASSWORD));
        }
        if old_password == new_password {
            return Err(ApiError::Input(refusal::SAME_PASSWORD));
        }
        let resp = self
            .client
            .put(self.url("/api/users/password"))
            .query(&[
                ("username", username),
                ("oldPassword", old_password),
                ("newPassword", new_password),
            ])
            .send()
            .await?;
        check(resp).await?;
        tracing::info!(username, "password changed");
        Ok(())
    }

    /// Conversations `username` takes part in, newest message each.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn chats(&self, username: &str) -> Result<Vec<ChatSummary>, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/chats"))
            .query(&[("username", username)])
            .send()
            .await?;
        let list: ChatList = parse(check(resp).await?).await?;
        Ok(list.chats)
    }

    /// Stored messages between `sender` and `receiver`, oldest first.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn messages(
        &self,
        sender: &str,
        receiver: &str,
    ) -> Result<Vec<HistoryMessage>, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/chats/messages"))
            .query(&[("senderUsername", sender), ("receiverUsername", receiver)])
            .send()
            .await?;
        let list: MessageList = parse(check(resp).await?).await?;
        tracing::debug!(count = list.messages.len(), sender, receiver, "fetched history");
        Ok(list.messages)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Pass success responses through, turn the rest into `Rejected`.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|e| {
        tracing::warn!(err = %e, "failed to read error body");
        String::new()
    });
    let reason = rejection_reason(&body);
    tracing::warn!(%status, %reason, "request rejected");
    Err(ApiError::Rejected(reason))
}

async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    resp.json().await.map_err(|e| {
        if e.is_decode() {
            tracing::warn!(err = %e, "unexpected response body");
            ApiError::InvalidResponse
        } else {
            ApiError::Http(e)
        }
    })
}

/// Extract the human-readable reason from an error body.
fn rejection_reason(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return UNKNOWN_ERROR.to_string();
    };
    match value.get("error") {
        Some(Value::String(reason)) if !reason.is_empty() => reason.clone(),
        Some(Value::Object(fields)) => {
            let joined = fields
                .values()
                .filter_map(Value::as_str)
                .filter(|reason| !reason.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            if joined.is_empty() {
                UNKNOWN_ERROR.to_string()
            } else {
                joined
            }
        }
        _ => UNKNOWN_ERROR.to_string(),
    }
}

/// This machine's outward-facing IPv4 address as an integer.
///
/// Falls back to 127.0.0.1. No packet is sent: connecting a UDP socket
/// only selects a route.
fn local_ip() -> u32 {
    let probe = || -> std::io::Result<Ipv4Addr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        match socket.local_addr()?.ip() {
            std::net::IpAddr::V4(ip) => Ok(ip),
            std::net::IpAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
        }
    };
    u32::from(probe().unwrap_or(Ipv4Addr::LOCALHOST))
}
