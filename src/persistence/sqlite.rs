//! SQLite-backed persister (`sqlite` feature). Stores the latest model snapshot plus an
//! append-only bootstrap log of every `store` call, mirroring the source system's XML
//! configuration file plus history directory (§6, §10.4).
//!
//! No embedded migrations: `connect` issues `CREATE TABLE IF NOT EXISTS` directly, since
//! this crate ships no `migrations/` directory of its own.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{ConfigurationPersister, PersisterError, snapshot_to_bootstrap_op};
use crate::value::Value;

pub struct SqlitePersister {
    pool: SqlitePool,
}

impl SqlitePersister {
    /// Connect (or create) a SQLite database at `database_url`, e.g. `sqlite://domain.db`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, PersisterError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| PersisterError::Backend(format!("connect: {e}")))?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| PersisterError::Backend(format!("create model_snapshot: {e}")))?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bootstrap_ops (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| PersisterError::Backend(format!("create bootstrap_ops: {e}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ConfigurationPersister for SqlitePersister {
    #[instrument(skip(self, snapshot))]
    async fn store(&self, snapshot: Value) -> Result<(), PersisterError> {
        let json = serde_json::to_string(&snapshot)?;
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersisterError::Backend(format!("tx begin: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO model_snapshot (id, json, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at
            "#,
        )
        .bind(&json)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| PersisterError::Backend(format!("upsert snapshot: {e}")))?;

        sqlx::query("INSERT INTO bootstrap_ops (json, created_at) VALUES (?1, ?2)")
            .bind(&json)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersisterError::Backend(format!("append bootstrap op: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| PersisterError::Backend(format!("tx commit: {e}")))?;
        Ok(())
    }

    /// Replays `bootstrap_ops` in insertion order, each row becoming one `add` operation
    /// carrying that row's snapshot — not the `model_snapshot` singleton, which only ever
    /// holds the latest state and has no notion of replay order (§6).
    #[instrument(skip(self))]
    async fn load(&self) -> Result<Vec<Value>, PersisterError> {
        let rows = sqlx::query("SELECT json FROM bootstrap_ops ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersisterError::Backend(format!("select bootstrap_ops: {e}")))?;
        rows.into_iter()
            .map(|row| {
                let json: String = row.get("json");
                let snapshot: Value = serde_json::from_str(&json)?;
                Ok(snapshot_to_bootstrap_op(snapshot))
            })
            .collect()
    }
}
