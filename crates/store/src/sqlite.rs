//! SQLite-backed credential store using sqlx.
//!
//! Schema: `credentials(provider, record_json, updated_at)` with `provider`
//! as primary key. Records are stored in the same JSON shape the host
//! application persists (`{"type":"oauth","refresh":…}`).

use async_trait::async_trait;
use gravlink_types::{AuthRecord, CredentialStore, GravlinkError, ProviderId, traits::Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// A persistent [`CredentialStore`] backed by `SQLite`.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

fn storage_err(e: sqlx::Error) -> GravlinkError {
    GravlinkError::Storage(e.to_string())
}

impl SqliteCredentialStore {
    /// Connects to a `SQLite` database (e.g. `"sqlite:./credentials.db"` or
    /// `"sqlite::memory:"`), creating the file and schema if missing.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if the connection or table creation fails.
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // A single connection keeps `sqlite::memory:` databases alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS credentials (
                provider    TEXT    PRIMARY KEY NOT NULL,
                record_json TEXT    NOT NULL,
                updated_at  INTEGER NOT NULL DEFAULT (unixepoch())
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, provider: &ProviderId) -> Result<Option<AuthRecord>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record_json FROM credentials WHERE provider = ?")
                .bind(provider.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_err)?;
        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, provider: &ProviderId, record: &AuthRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            "INSERT INTO credentials (provider, record_json, updated_at)
             VALUES (?, ?, unixepoch())
             ON CONFLICT(provider) DO UPDATE SET
                record_json = excluded.record_json,
                updated_at  = excluded.updated_at",
        )
        .bind(provider.as_str())
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        tracing::debug!(provider = %provider, "credential persisted");
        Ok(())
    }
}
