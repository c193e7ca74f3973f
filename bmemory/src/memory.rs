//! Session lifecycle and history façade with an in-process fallback buffer.

use std::sync::Mutex;

use bprovider::{Message, Role};

use crate::{
    MessageRepository, SessionKey, SessionRecord, SessionRepository, StoreConfig, StoreError,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 8;

/// Conversation history over the persistence store. When a session is active
/// and the store is reachable the store is authoritative; otherwise the
/// in-process mirror answers. Mirror and store are both role-filtered to
/// user/assistant turns.
pub struct ConversationMemory {
    repositories: Option<(SessionRepository, MessageRepository)>,
    active: Mutex<Option<SessionRecord>>,
    mirror: Mutex<Vec<Message>>,
    history_limit: usize,
}

impl ConversationMemory {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let sessions = SessionRepository::connect(config).await?;
        let messages = MessageRepository::connect(config).await?;
        Ok(Self::from_repositories(sessions, messages))
    }

    pub fn from_repositories(
        sessions: SessionRepository,
        messages: MessageRepository,
    ) -> Self {
        Self {
            repositories: Some((sessions, messages)),
            active: Mutex::new(None),
            mirror: Mutex::new(Vec::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Memory with no store at all; the mirror is authoritative. Used when
    /// the store is unreachable at startup and in tests.
    pub fn detached() -> Self {
        Self {
            repositories: None,
            active: Mutex::new(None),
            mirror: Mutex::new(Vec::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit.max(1);
        self
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn is_persistent(&self) -> bool {
        self.repositories.is_some()
    }

    pub fn active_session(&self) -> Option<SessionRecord> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.clone())
    }

    /// Resolves or creates the session for `key` and loads its bounded
    /// recent history into the mirror. Calling twice with the same triple
    /// yields the same session id.
    pub async fn init_session(&self, key: &SessionKey) -> Result<String, StoreError> {
        let Some((sessions, messages)) = &self.repositories else {
            return Err(StoreError::invalid_request(
                "no store configured; conversation memory is running detached",
            ));
        };

        let session = sessions.resolve_or_create(key).await?;
        let recent = messages.recent(&session.id, self.history_limit).await?;

        let mut mirror = self.lock_mirror()?;
        *mirror = recent
            .into_iter()
            .filter(|record| matches!(record.role, Role::User | Role::Assistant))
            .map(|record| Message::new(record.role, record.content))
            .collect();
        drop(mirror);

        let session_id = session.id.clone();
        *self.lock_active()? = Some(session);
        Ok(session_id)
    }

    /// Appends one turn message. The mirror is always updated; the store
    /// write happens only with an active session, and its failure is the
    /// caller's signal to degrade, not a torn state.
    pub async fn append(&self, role: Role, content: &str) -> Result<(), StoreError> {
        self.lock_mirror()?.push(Message::new(role, content));

        let active = self.active_session();
        if let (Some((sessions, messages)), Some(session)) = (&self.repositories, active) {
            messages.append(&session.id, role, content, None).await?;
            sessions.touch(&session.id).await?;
        }

        Ok(())
    }

    /// Chronological bounded history. Store failures fall back to the mirror
    /// so a reachable answer always exists.
    pub async fn history(&self) -> Vec<Message> {
        if let (Some((_, messages)), Some(session)) =
            (&self.repositories, self.active_session())
        {
            match messages.recent(&session.id, self.history_limit).await {
                Ok(records) => {
                    return records
                        .into_iter()
                        .filter(|record| {
                            matches!(record.role, Role::User | Role::Assistant)
                        })
                        .map(|record| Message::new(record.role, record.content))
                        .collect();
                }
                Err(_) => return self.mirror_snapshot(),
            }
        }

        self.mirror_snapshot()
    }

    fn mirror_snapshot(&self) -> Vec<Message> {
        self.lock_mirror()
            .map(|mirror| {
                let start = mirror.len().saturating_sub(self.history_limit);
                mirror[start..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Deletes all messages of the active session and empties the mirror.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        self.lock_mirror()?.clear();

        if let (Some((_, messages)), Some(session)) =
            (&self.repositories, self.active_session())
        {
            return messages.delete_for_session(&session.id).await;
        }

        Ok(0)
    }

    /// Cascading session deletion. Returns `false` when no session matches
    /// the triple; that is an answer, not an error.
    pub async fn delete_session(&self, key: &SessionKey) -> Result<bool, StoreError> {
        let Some((sessions, _)) = &self.repositories else {
            return Ok(false);
        };

        let deleted = sessions.delete_with_messages(key).await?;

        if deleted
            && let Some(active) = self.active_session()
            && active.key() == *key
        {
            *self.lock_active()? = None;
            self.lock_mirror()?.clear();
        }

        Ok(deleted)
    }

    fn lock_mirror(&self) -> Result<std::sync::MutexGuard<'_, Vec<Message>>, StoreError> {
        self.mirror
            .lock()
            .map_err(|_| StoreError::storage("conversation mirror lock poisoned"))
    }

    fn lock_active(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<SessionRecord>>, StoreError> {
        self.active
            .lock()
            .map_err(|_| StoreError::storage("active session lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::build_pool;

    async fn persistent_memory() -> ConversationMemory {
        let pool = build_pool(&StoreConfig::in_memory())
            .await
            .expect("pool should build");
        let sessions = SessionRepository::with_pool(pool.clone())
            .await
            .expect("session repository should build");
        let messages = MessageRepository::with_pool(pool)
            .await
            .expect("message repository should build");
        ConversationMemory::from_repositories(sessions, messages)
    }

    #[tokio::test]
    async fn init_session_is_idempotent_per_triple() {
        let memory = persistent_memory().await;
        let key = SessionKey::new("leave-plan", "alice@x.com", "HR");

        let first = memory.init_session(&key).await.expect("init should work");
        let second = memory.init_session(&key).await.expect("init should work");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn history_is_chronological_and_bounded() {
        let memory = persistent_memory().await.with_history_limit(4);
        memory
            .init_session(&SessionKey::new("history", "bob@x.com", "IT"))
            .await
            .expect("init should work");

        for index in 0..6 {
            memory
                .append(Role::User, &format!("question {index}"))
                .await
                .expect("append should work");
        }

        let history = memory.history().await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "question 2");
        assert_eq!(history[3].content, "question 5");
    }

    #[tokio::test]
    async fn clear_then_history_is_empty() {
        let memory = persistent_memory().await;
        memory
            .init_session(&SessionKey::new("wipe", "carol@x.com", "HR"))
            .await
            .expect("init should work");

        memory
            .append(Role::User, "hello")
            .await
            .expect("append should work");
        memory
            .append(Role::Assistant, "hi there")
            .await
            .expect("append should work");

        let removed = memory.clear().await.expect("clear should work");
        assert_eq!(removed, 2);
        assert!(memory.history().await.is_empty());
    }

    #[tokio::test]
    async fn detached_memory_serves_the_mirror() {
        let memory = ConversationMemory::detached().with_history_limit(2);

        memory
            .append(Role::User, "first")
            .await
            .expect("append should work");
        memory
            .append(Role::Assistant, "second")
            .await
            .expect("append should work");
        memory
            .append(Role::User, "third")
            .await
            .expect("append should work");

        let history = memory.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "second");
        assert_eq!(history[1].content, "third");
    }

    #[tokio::test]
    async fn delete_session_reports_false_for_unknown_triple() {
        let memory = persistent_memory().await;
        let deleted = memory
            .delete_session(&SessionKey::new("ghost", "nobody@x.com", "HR"))
            .await
            .expect("delete should not error");
        assert!(!deleted);
    }

    #[tokio::test]
    async fn delete_session_clears_active_state() {
        let memory = persistent_memory().await;
        let key = SessionKey::new("short-lived", "dan@x.com", "HR");
        memory.init_session(&key).await.expect("init should work");
        memory
            .append(Role::User, "hello")
            .await
            .expect("append should work");

        assert!(memory
            .delete_session(&key)
            .await
            .expect("delete should work"));
        assert!(memory.active_session().is_none());
        assert!(memory.history().await.is_empty());
    }

    #[tokio::test]
    async fn session_reload_restores_bounded_history() {
        let pool = build_pool(&StoreConfig::in_memory())
            .await
            .expect("pool should build");
        let sessions = SessionRepository::with_pool(pool.clone())
            .await
            .expect("session repository should build");
        let messages = MessageRepository::with_pool(pool.clone())
            .await
            .expect("message repository should build");

        let key = SessionKey::new("returning", "eve@x.com", "HR");
        let memory = ConversationMemory::from_repositories(sessions.clone(), messages.clone());
        memory.init_session(&key).await.expect("init should work");
        memory
            .append(Role::User, "how do I enroll in benefits?")
            .await
            .expect("append should work");
        memory
            .append(Role::Assistant, "through the benefits portal")
            .await
            .expect("append should work");

        let fresh = ConversationMemory::from_repositories(sessions, messages);
        fresh.init_session(&key).await.expect("init should work");
        let history = fresh.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }
}
