//! Postgres-backed session store.
//!
//! Only compiled with the `postgres-sessions` feature. Expiry is enforced in
//! SQL, so a dead session reads exactly like a missing one, and multiple
//! instances can share one session space.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::gate::session::{Identity, SessionData, SessionError, SessionId, SessionStore};

const DEFAULT_SESSION_TTL_SECS: i64 = 86_400;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

fn ttl_secs() -> i64 {
    std::env::var("SESSION_TTL_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_SESSION_TTL_SECS)
}

fn db_max_connections() -> u32 {
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
}

fn backend(e: sqlx::Error) -> SessionError {
    SessionError::Backend(e.to_string())
}

/// Session store over the `sessions` table.
pub struct PostgresSessionStore {
    pool: PgPool,
    ttl_secs: i64,
}

impl PostgresSessionStore {
    /// Connect, run the schema migrations, and build the store.
    ///
    /// Pool size comes from `DB_MAX_CONNECTIONS` (default 5), the TTL from
    /// `SESSION_TTL_SECS` (default 86400).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migrations fail.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(db_max_connections())
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Build over an existing pool with the TTL from `SESSION_TTL_SECS`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool, ttl_secs: ttl_secs() }
    }

    #[must_use]
    pub fn with_ttl_secs(pool: PgPool, ttl_secs: i64) -> Self {
        Self { pool, ttl_secs }
    }
}

fn decode_identity(value: Option<serde_json::Value>) -> Result<Option<Identity>, SessionError> {
    value
        .map(|v| serde_json::from_value(v).map_err(|e| SessionError::Backend(e.to_string())))
        .transpose()
}

fn encode_identity(identity: Option<&Identity>) -> Result<Option<serde_json::Value>, SessionError> {
    identity
        .map(|i| serde_json::to_value(i).map_err(|e| SessionError::Backend(e.to_string())))
        .transpose()
}

#[async_trait::async_trait]
impl SessionStore for PostgresSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let row = sqlx::query("SELECT identity, pre_auth_url FROM sessions WHERE id = $1 AND expires_at > now()")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(r) => Ok(Some(SessionData {
                identity: decode_identity(r.get("identity"))?,
                pre_auth_url: r.get("pre_auth_url"),
            })),
            None => Ok(None),
        }
    }

    async fn create(&self) -> Result<SessionId, SessionError> {
        let id = SessionId::generate();
        sqlx::query("INSERT INTO sessions (id, expires_at) VALUES ($1, now() + $2 * interval '1 second')")
            .bind(id.as_str())
            .bind(self.ttl_secs)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(id)
    }

    async fn save(&self, id: &SessionId, data: SessionData) -> Result<(), SessionError> {
        // Writes against expired or deleted sessions hit zero rows and are
        // dropped, matching the trait contract.
        sqlx::query(
            "UPDATE sessions SET identity = $2, pre_auth_url = $3 WHERE id = $1 AND expires_at > now()",
        )
        .bind(id.as_str())
        .bind(encode_identity(data.identity.as_ref())?)
        .bind(data.pre_auth_url)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn invalidate(&self, id: &SessionId) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
