//! PostgreSQL-backed store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, types::Json, Connection, PgPool, Row};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    token::{generate_token, hash_token},
    SessionData, SessionStore, User, UserOptionStore, UserOptions, UserStore,
};

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row
            .try_get::<Option<String>, _>("first_name")?
            .unwrap_or_default(),
        locale: row.try_get("locale")?,
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, email, first_name, locale, password_hash, is_active FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup user by id")?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .context("failed to decode user row")
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = "SELECT id, email, first_name, locale, password_hash, is_active FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup user by email")?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .context("failed to decode user row")
    }

    async fn save(&self, user: &User) -> Result<()> {
        let query = r"
            UPDATE users
            SET
                email = $1,
                first_name = $2,
                locale = $3,
                password_hash = $4,
                is_active = $5,
                updated_at = NOW()
            WHERE id = $6
        ";
        sqlx::query(query)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.locale)
            .bind(&user.password_hash)
            .bind(user.is_active)
            .bind(user.id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to save user")?;
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE users SET last_login = NOW() WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to record login")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(tracing::info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(tracing::info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(&self, data: &SessionData, ttl: Duration) -> Result<String> {
        let reap = "DELETE FROM account_sessions WHERE expires_at <= NOW()";
        sqlx::query(reap)
            .execute(&self.pool)
            .instrument(query_span("DELETE", reap))
            .await
            .context("failed to delete expired sessions")?;

        let token = generate_token()?;
        let query = r"
            INSERT INTO account_sessions (session_hash, user_id, data, expires_at)
            VALUES ($1, $2, $3, NOW() + make_interval(secs => $4))
        ";
        sqlx::query(query)
            .bind(hash_token(&token))
            .bind(data.user_id)
            .bind(Json(data))
            .bind(ttl.as_secs_f64())
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(token)
    }

    async fn load(&self, token: &str) -> Result<Option<SessionData>> {
        let query =
            "SELECT data FROM account_sessions WHERE session_hash = $1 AND expires_at > NOW()";
        let row = sqlx::query(query)
            .bind(hash_token(token))
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session")?;
        row.map(|row| row.try_get::<Json<SessionData>, _>("data").map(|data| data.0))
            .transpose()
            .context("failed to decode session data")
    }

    async fn update(&self, token: &str, data: &SessionData) -> Result<()> {
        let query = "UPDATE account_sessions SET user_id = $1, data = $2 WHERE session_hash = $3";
        sqlx::query(query)
            .bind(data.user_id)
            .bind(Json(data))
            .bind(hash_token(token))
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update session")?;
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        let query = "DELETE FROM account_sessions WHERE session_hash = $1";
        sqlx::query(query)
            .bind(hash_token(token))
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

#[async_trait]
impl UserOptionStore for PgStore {
    async fn options(&self, user_id: Uuid) -> Result<UserOptions> {
        let query = "SELECT key, value FROM user_options WHERE user_id = $1";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load user options")?;
        rows.into_iter()
            .map(|row| -> Result<(String, serde_json::Value)> {
                let key: String = row.try_get("key")?;
                let value: Json<serde_json::Value> = row.try_get("value")?;
                Ok((key, value.0))
            })
            .collect::<Result<UserOptions>>()
            .context("failed to decode user options")
    }

    async fn set_option(
        &self,
        user_id: Uuid,
        key: &str,
        value: Option<serde_json::Value>,
    ) -> Result<()> {
        if let Some(value) = value {
            let query = r"
                INSERT INTO user_options (user_id, key, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, key) DO UPDATE SET value = EXCLUDED.value
            ";
            sqlx::query(query)
                .bind(user_id)
                .bind(key)
                .bind(Json(value))
                .execute(&self.pool)
                .instrument(query_span("INSERT", query))
                .await
                .context("failed to set user option")?;
        } else {
            let query = "DELETE FROM user_options WHERE user_id = $1 AND key = $2";
            sqlx::query(query)
                .bind(user_id)
                .bind(key)
                .execute(&self.pool)
                .instrument(query_span("DELETE", query))
                .await
                .context("failed to clear user option")?;
        }
        Ok(())
    }
}
