//! SQLite audit history.
//!
//! One table, `chat_history`, keyed by an autoincrement id that doubles as
//! the pagination cursor. An index on `(session_id, id DESC)` serves the
//! newest-first page scans.

use async_trait::async_trait;
use chrono::Utc;
use personachat_core::error::MemoryError;
use personachat_core::{clamp_page_size, HistoryPage, HistoryRecord, HistoryRepository};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    /// Open (and create if missing) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let repo = Self { pool };
        repo.run_migrations().await?;
        info!("SQLite history initialized at {path}");
        Ok(repo)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let repo = Self { pool };
        repo.run_migrations().await?;
        Ok(repo)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                input_text TEXT NOT NULL,
                output_text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("chat_history table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history(session_id, id DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("session index: {e}")))?;

        debug!("SQLite history migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryRecord, MemoryError> {
        let column = |name: &str, e: sqlx::Error| MemoryError::QueryFailed(format!("{name} column: {e}"));

        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MemoryError::Serialization(format!("created_at: {e}")))?;

        Ok(HistoryRecord {
            id: row.try_get("id").map_err(|e| column("id", e))?,
            session_id: row.try_get("session_id").map_err(|e| column("session_id", e))?,
            input_text: row.try_get("input_text").map_err(|e| column("input_text", e))?,
            output_text: row.try_get("output_text").map_err(|e| column("output_text", e))?,
            created_at,
        })
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, session_id: &str, input_text: &str, output_text: &str) -> Result<i64, MemoryError> {
        let result = sqlx::query(
            "INSERT INTO chat_history (session_id, input_text, output_text, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(input_text)
        .bind(output_text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!("Saved history record {id} for {session_id}");
        Ok(id)
    }

    async fn find_page(&self, session_id: &str, cursor: Option<i64>, size: usize) -> Result<HistoryPage, MemoryError> {
        let size = clamp_page_size(size);
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, input_text, output_text, created_at
            FROM chat_history
            WHERE session_id = ?1 AND id < ?2
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )
        .bind(session_id)
        .bind(cursor.unwrap_or(i64::MAX))
        .bind((size + 1) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("Page query: {e}")))?;

        let records = rows.iter().map(Self::row_to_record).collect::<Result<Vec<_>, _>>()?;
        Ok(HistoryPage::from_overfetch(records, size))
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<u64, MemoryError> {
        let result = sqlx::query("DELETE FROM chat_history WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: i64) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM chat_history WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
