//! Durable chat-session and message records.

use std::time::Duration;

use bprovider::Role;
use chrono::{DateTime, Utc};

/// Lookup triple that addresses one durable conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub name: String,
    pub email: String,
    pub topic: String,
}

impl SessionKey {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            topic: topic.into(),
        }
    }

    /// Legacy composite key kept for sessions created before the triple
    /// lookup existed.
    pub fn original_name(&self) -> String {
        format!("{}/{}/{}", self.email, self.topic, self.name)
    }
}

/// One row of `chat_sessions`. The `topic` field maps to the historical
/// `expertor` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub topic: String,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.name.clone(), self.email.clone(), self.topic.clone())
    }
}

/// One row of `chat_messages`. Append-only; ordering is creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub(crate) fn role_from_str(value: &str) -> Role {
    match value {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

/// Connection-pool settings for the relational store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://bellhop_chat.db?mode=rwc".to_string(),
            min_connections: 2,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Private in-process database. One connection only: every pooled
    /// connection to `sqlite::memory:` would otherwise see its own empty
    /// database.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_pool_bounds(mut self, min_connections: u32, max_connections: u32) -> Self {
        self.min_connections = min_connections;
        self.max_connections = max_connections.max(min_connections.max(1));
        self
    }

    pub fn from_env() -> Self {
        match std::env::var("BELLHOP_DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url),
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_name_uses_legacy_composite_layout() {
        let key = SessionKey::new("leave-plan", "alice@x.com", "HR");
        assert_eq!(key.original_name(), "alice@x.com/HR/leave-plan");
    }

    #[test]
    fn role_strings_round_trip() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(role_from_str(role_to_str(role)), role);
        }
        assert_eq!(role_from_str("unknown"), Role::User);
    }

    #[test]
    fn pool_bounds_keep_max_at_least_min() {
        let config = StoreConfig::new("sqlite::memory:").with_pool_bounds(4, 2);
        assert_eq!(config.min_connections, 4);
        assert_eq!(config.max_connections, 4);
    }
}
