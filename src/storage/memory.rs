//! In-process store for tests and embedding.

use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    token::{generate_token, hash_token},
    SessionData, SessionStore, User, UserOptionStore, UserOptions, UserStore,
};

struct StoredSession {
    data: SessionData,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    logins: RwLock<HashMap<Uuid, u32>>,
    sessions: RwLock<HashMap<Vec<u8>, StoredSession>>,
    options: RwLock<HashMap<Uuid, UserOptions>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    /// Number of recorded logins for `user_id`.
    pub async fn login_count(&self, user_id: Uuid) -> u32 {
        self.logins
            .read()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of live sessions, expired ones excluded.
    pub async fn session_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| session.expires_at > now)
            .count()
    }

    /// Number of stored session entries, expired ones included.
    pub async fn stored_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn save(&self, user: &User) -> Result<()> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<()> {
        *self.logins.write().await.entry(id).or_insert(0) += 1;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, data: &SessionData, ttl: Duration) -> Result<String> {
        let token = generate_token()?;
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            hash_token(&token),
            StoredSession {
                data: data.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(token)
    }

    async fn load(&self, token: &str) -> Result<Option<SessionData>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&hash_token(token))
            .filter(|session| session.expires_at > Instant::now())
            .map(|session| session.data.clone()))
    }

    async fn update(&self, token: &str, data: &SessionData) -> Result<()> {
        if let Some(session) = self.sessions.write().await.get_mut(&hash_token(token)) {
            session.data = data.clone();
        }
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(&hash_token(token));
        Ok(())
    }
}

#[async_trait]
impl UserOptionStore for MemoryStore {
    async fn options(&self, user_id: Uuid) -> Result<UserOptions> {
        Ok(self
            .options
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_option(
        &self,
        user_id: Uuid,
        key: &str,
        value: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut options = self.options.write().await;
        let entry = options.entry(user_id).or_default();
        match value {
            Some(value) => {
                entry.insert(key.to_string(), value);
            }
            None => {
                entry.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sessions_round_trip_and_destroy() -> Result<()> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let token = store
            .create(&SessionData::for_user(user_id), Duration::from_secs(60))
            .await?;

        let loaded = store.load(&token).await?;
        assert_eq!(loaded.and_then(|data| data.user_id), Some(user_id));

        store.destroy(&token).await?;
        assert!(store.load(&token).await?.is_none());
        // destroying twice is fine
        store.destroy(&token).await?;
        Ok(())
    }

    #[tokio::test]
    async fn expired_sessions_do_not_load() -> Result<()> {
        let store = MemoryStore::new();
        let token = store
            .create(&SessionData::default(), Duration::from_secs(0))
            .await?;
        assert!(store.load(&token).await?.is_none());
        assert_eq!(store.session_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn create_drops_expired_sessions() -> Result<()> {
        let store = MemoryStore::new();
        let stale = store
            .create(&SessionData::default(), Duration::from_secs(0))
            .await?;
        assert_eq!(store.stored_sessions().await, 1);

        let fresh = store
            .create(&SessionData::default(), Duration::from_secs(60))
            .await?;
        assert_eq!(store.stored_sessions().await, 1);
        assert!(store.load(&stale).await?.is_none());
        assert!(store.load(&fresh).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn options_set_and_clear() -> Result<()> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .set_option(user_id, "alert_email", Some(json!("ops@example.com")))
            .await?;
        assert_eq!(
            store.options(user_id).await?.get("alert_email"),
            Some(&json!("ops@example.com"))
        );

        store.set_option(user_id, "alert_email", None).await?;
        assert!(store.options(user_id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn users_find_by_email() -> Result<()> {
        let store = MemoryStore::new();
        let user = User::new("ann@example.com", String::new());
        store.insert_user(user.clone()).await;

        assert_eq!(store.find_by_email("ann@example.com").await?, Some(user.clone()));
        assert!(store.find_by_email("bob@example.com").await?.is_none());

        store.record_login(user.id).await?;
        assert_eq!(store.login_count(user.id).await, 1);
        Ok(())
    }
}
