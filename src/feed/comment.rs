//! Comment records ingested from the relay.
//!
//! A comment is created exactly once, when a well-formed `comment` frame is
//! accepted, and is never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle used when the relay omits the commenter's username.
pub const DEFAULT_USERNAME: &str = "unknown";

/// Display name used when the relay omits the commenter's nickname.
pub const DEFAULT_NICKNAME: &str = "Anonymous";

/// Locally generated comment identifier.
///
/// Ids are minted by the client, never taken from the relay, so they stay
/// unique for the lifetime of a session even if the relay repeats itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentId(Uuid);

impl CommentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One chat event as seen by the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Unique within a session
    pub id: CommentId,
    /// Commenter handle
    pub username: String,
    /// Commenter display name
    pub nickname: String,
    /// Raw comment text, possibly empty
    pub text: String,
    /// When the client ingested the comment (not platform time)
    pub received_at: DateTime<Utc>,
}

impl Comment {
    /// Build a comment from optional relay fields, stamped with the current time.
    ///
    /// Missing or empty `username`/`nickname` fall back to their defaults;
    /// missing text becomes the empty string.
    pub fn ingest(
        username: Option<String>,
        nickname: Option<String>,
        text: Option<String>,
    ) -> Self {
        Self::ingest_at(username, nickname, text, Utc::now())
    }

    /// Same as [`Comment::ingest`] with an explicit ingestion time.
    pub fn ingest_at(
        username: Option<String>,
        nickname: Option<String>,
        text: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CommentId::generate(),
            username: non_empty_or(username, DEFAULT_USERNAME),
            nickname: non_empty_or(nickname, DEFAULT_NICKNAME),
            text: text.unwrap_or_default(),
            received_at,
        }
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}
