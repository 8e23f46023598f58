//! Durable per-conversation batch buffer.
//!
//! Rows survive process restarts; the in-memory debounce timer does not.
//! Every key carries a safety expiry so a buffer whose timer was lost is
//! picked up by the reconciler sweep instead of lingering forever.

use {sqlx::Row, sqlx::SqlitePool};

use crate::{
    Result,
    payload::{BatchMessage, BatchMeta},
};

/// Durable buffer keyed by (bot_id, participant_id).
#[derive(Clone)]
pub struct BatchBuffer {
    pool: SqlitePool,
}

impl BatchBuffer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the buffer schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS batch_entries (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id         TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                payload        TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_batch_entries_key
             ON batch_entries (bot_id, participant_id, seq)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS batch_meta (
                bot_id         TEXT    NOT NULL,
                participant_id TEXT    NOT NULL,
                meta           TEXT    NOT NULL,
                expires_at_ms  INTEGER NOT NULL,
                PRIMARY KEY(bot_id, participant_id)
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Append one message to the buffer and overwrite the key's metadata
    /// and safety expiry.
    pub async fn append(
        &self,
        bot_id: &str,
        participant_id: &str,
        message: &BatchMessage,
        meta: &BatchMeta,
        expires_at_ms: i64,
    ) -> Result<()> {
        let message_json = serde_json::to_string(message)?;
        let meta_json = serde_json::to_string(meta)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO batch_entries (bot_id, participant_id, payload) VALUES (?, ?, ?)",
        )
        .bind(bot_id)
        .bind(participant_id)
        .bind(&message_json)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO batch_meta (bot_id, participant_id, meta, expires_at_ms)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(bot_id, participant_id) DO UPDATE SET
               meta = excluded.meta,
               expires_at_ms = excluded.expires_at_ms",
        )
        .bind(bot_id)
        .bind(participant_id)
        .bind(&meta_json)
        .bind(expires_at_ms)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Atomically read and clear the buffer for one key.
    ///
    /// Read and delete run in a single transaction, so an `append` racing
    /// this drain lands wholly before it (included in the result) or wholly
    /// after it (left for the next flush), never in between.
    pub async fn drain(
        &self,
        bot_id: &str,
        participant_id: &str,
    ) -> Result<(Vec<BatchMessage>, Option<BatchMeta>)> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT payload FROM batch_entries
             WHERE bot_id = ? AND participant_id = ?
             ORDER BY seq",
        )
        .bind(bot_id)
        .bind(participant_id)
        .fetch_all(&mut *tx)
        .await?;
        let meta_row = sqlx::query("SELECT meta FROM batch_meta WHERE bot_id = ? AND participant_id = ?")
            .bind(bot_id)
            .bind(participant_id)
            .fetch_optional(&mut *tx)
            .await?;

        // Deserialize before deleting anything: a parse failure here drops
        // the transaction and leaves the buffer rows in place.
        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.get("payload");
            messages.push(serde_json::from_str(&payload)?);
        }
        let meta = meta_row
            .map(|row| serde_json::from_str(&row.get::<String, _>("meta")))
            .transpose()?;

        sqlx::query("DELETE FROM batch_entries WHERE bot_id = ? AND participant_id = ?")
            .bind(bot_id)
            .bind(participant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM batch_meta WHERE bot_id = ? AND participant_id = ?")
            .bind(bot_id)
            .bind(participant_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((messages, meta))
    }

    /// Keys whose safety expiry has passed. The reconciler flushes these;
    /// expiry re-triggers delivery, it never silently deletes data.
    pub async fn expired_keys(&self, now_ms: i64) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT bot_id, participant_id FROM batch_meta WHERE expires_at_ms <= ?",
        )
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("bot_id"), row.get("participant_id")))
            .collect())
    }

    pub async fn len(&self, bot_id: &str, participant_id: &str) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM batch_entries WHERE bot_id = ? AND participant_id = ?",
        )
        .bind(bot_id)
        .bind(participant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }
}
