//! Storage seams for users, sessions and per-user options.
//!
//! Handlers only talk to the traits in this module. `PgStore` backs them with
//! PostgreSQL (see `sql/schema.sql`); `MemoryStore` keeps everything in
//! process for tests and embedding.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use uuid::Uuid;

pub mod memory;
pub mod password;
pub mod postgres;
pub mod token;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Account record as stored by the persistence layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub locale: Option<String>,
    /// argon2 PHC string.
    pub password_hash: String,
    pub is_active: bool,
}

impl User {
    #[must_use]
    pub fn new(email: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            first_name: String::new(),
            locale: None,
            password_hash,
            is_active: true,
        }
    }
}

/// Server-side session payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: Option<Uuid>,
    pub locale: Option<String>,
    /// Set when the login page asked the client to prove cookie support.
    #[serde(default)]
    pub test_cookie: bool,
}

impl SessionData {
    #[must_use]
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

/// Per-user option values keyed by option name (`alert_email`, `mail:subscribe_by_default`).
pub type UserOptions = BTreeMap<String, serde_json::Value>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Lookup by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable field of `user`.
    async fn save(&self, user: &User) -> Result<()>;

    async fn record_login(&self, id: Uuid) -> Result<()>;

    /// Cheap liveness probe used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session and return the raw token for the cookie.
    async fn create(&self, data: &SessionData, ttl: Duration) -> Result<String>;

    /// Returns `Ok(None)` for unknown or expired tokens.
    async fn load(&self, token: &str) -> Result<Option<SessionData>>;

    async fn update(&self, token: &str, data: &SessionData) -> Result<()>;

    /// Deleting a missing session is not an error.
    async fn destroy(&self, token: &str) -> Result<()>;
}

#[async_trait]
pub trait UserOptionStore: Send + Sync {
    async fn options(&self, user_id: Uuid) -> Result<UserOptions>;

    /// `None` clears the option.
    async fn set_option(
        &self,
        user_id: Uuid,
        key: &str,
        value: Option<serde_json::Value>,
    ) -> Result<()>;
}
