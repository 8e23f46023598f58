//! Record operations over a shared [`SqlitePool`].

use {
    courier_common::{ClientStatus, ConversationStatus, MessageKind},
    sqlx::SqlitePool,
    tracing::debug,
    uuid::Uuid,
};

use crate::{
    error::{Context, Error, Result},
    records::{Bot, Client, Conversation, Message, NewBot, NewMessage},
};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ── Row types ───────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct BotRow {
    id: String,
    name: String,
    identifier: String,
    callback_url: Option<String>,
    api_key: String,
    response_delay_secs: i64,
    created_at_ms: i64,
}

impl From<BotRow> for Bot {
    fn from(r: BotRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            identifier: r.identifier,
            callback_url: r.callback_url,
            api_key: r.api_key,
            response_delay_secs: r.response_delay_secs.max(0) as u32,
            created_at_ms: r.created_at_ms,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    bot_id: String,
    participant_id: String,
    name: String,
    status: String,
    created_at_ms: i64,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = Error;

    fn try_from(r: ConversationRow) -> Result<Self> {
        let status = ConversationStatus::parse(&r.status).ok_or(Error::InvalidRow {
            field: "status",
            value: r.status.clone(),
        })?;
        Ok(Self {
            id: r.id,
            bot_id: r.bot_id,
            participant_id: r.participant_id,
            name: r.name,
            status,
            created_at_ms: r.created_at_ms,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    bot_id: String,
    participant_id: String,
    name: Option<String>,
    status: String,
}

impl TryFrom<ClientRow> for Client {
    type Error = Error;

    fn try_from(r: ClientRow) -> Result<Self> {
        let status = ClientStatus::parse(&r.status).ok_or(Error::InvalidRow {
            field: "status",
            value: r.status.clone(),
        })?;
        Ok(Self {
            bot_id: r.bot_id,
            participant_id: r.participant_id,
            name: r.name,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    external_id: String,
    conversation_id: String,
    sender: String,
    from_me: i64,
    content: String,
    kind: String,
    forwarded_at_ms: Option<i64>,
    processed: i64,
    created_at_ms: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        let kind = MessageKind::parse(&r.kind).ok_or(Error::InvalidRow {
            field: "kind",
            value: r.kind.clone(),
        })?;
        Ok(Self {
            id: r.id,
            external_id: r.external_id,
            conversation_id: r.conversation_id,
            sender: r.sender,
            from_me: r.from_me != 0,
            content: r.content,
            kind,
            forwarded_at_ms: r.forwarded_at_ms,
            processed: r.processed != 0,
            created_at_ms: r.created_at_ms,
        })
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Record store over a shared SQLite pool.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the record schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS bots (
                id                  TEXT    PRIMARY KEY,
                name                TEXT    NOT NULL,
                identifier          TEXT    NOT NULL,
                callback_url        TEXT,
                api_key             TEXT    NOT NULL,
                response_delay_secs INTEGER NOT NULL DEFAULT 0,
                created_at_ms       INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS conversations (
                id             TEXT    PRIMARY KEY,
                bot_id         TEXT    NOT NULL,
                participant_id TEXT    NOT NULL,
                name           TEXT    NOT NULL,
                status         TEXT    NOT NULL DEFAULT 'CONNECTED',
                created_at_ms  INTEGER NOT NULL,
                UNIQUE(bot_id, participant_id)
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS clients (
                bot_id         TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                name           TEXT,
                status         TEXT NOT NULL DEFAULT 'PENDING',
                PRIMARY KEY(bot_id, participant_id)
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id              TEXT    PRIMARY KEY,
                external_id     TEXT    NOT NULL UNIQUE,
                conversation_id TEXT    NOT NULL,
                sender          TEXT    NOT NULL,
                from_me         INTEGER NOT NULL DEFAULT 0,
                content         TEXT    NOT NULL,
                kind            TEXT    NOT NULL,
                forwarded_at_ms INTEGER,
                processed       INTEGER NOT NULL DEFAULT 0,
                created_at_ms   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // ── Bots ────────────────────────────────────────────────────────────

    pub async fn create_bot(&self, new: NewBot) -> Result<Bot> {
        let bot = Bot {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            identifier: new.identifier,
            callback_url: new.callback_url,
            api_key: new.api_key,
            response_delay_secs: new.response_delay_secs,
            created_at_ms: now_ms(),
        };
        sqlx::query(
            "INSERT INTO bots (id, name, identifier, callback_url, api_key, response_delay_secs, created_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bot.id)
        .bind(&bot.name)
        .bind(&bot.identifier)
        .bind(&bot.callback_url)
        .bind(&bot.api_key)
        .bind(bot.response_delay_secs as i64)
        .bind(bot.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(bot)
    }

    pub async fn get_bot(&self, bot_id: &str) -> Result<Option<Bot>> {
        let row = sqlx::query_as::<_, BotRow>("SELECT * FROM bots WHERE id = ?")
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_bots(&self) -> Result<Vec<Bot>> {
        let rows = sqlx::query_as::<_, BotRow>("SELECT * FROM bots ORDER BY created_at_ms")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn set_callback_url(&self, bot_id: &str, url: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE bots SET callback_url = ? WHERE id = ?")
            .bind(url)
            .bind(bot_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::bot_not_found(bot_id));
        }
        Ok(())
    }

    // ── Conversations ───────────────────────────────────────────────────

    pub async fn find_conversation(
        &self,
        bot_id: &str,
        participant_id: &str,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE bot_id = ? AND participant_id = ?",
        )
        .bind(bot_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Resolve-or-create keyed by (bot_id, participant_id).
    ///
    /// Returns the conversation and whether this call created it. A lost
    /// create race (`ON CONFLICT DO NOTHING` inserting zero rows) falls
    /// back to a re-read and reports `is_new = false`.
    pub async fn upsert_conversation(
        &self,
        bot_id: &str,
        participant_id: &str,
        default_name: &str,
    ) -> Result<(Conversation, bool)> {
        if let Some(existing) = self.find_conversation(bot_id, participant_id).await? {
            return Ok((existing, false));
        }

        let id = Uuid::new_v4().to_string();
        let result = sqlx::query(
            "INSERT INTO conversations (id, bot_id, participant_id, name, status, created_at_ms)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(bot_id, participant_id) DO NOTHING",
        )
        .bind(&id)
        .bind(bot_id)
        .bind(participant_id)
        .bind(default_name)
        .bind(ConversationStatus::Connected.as_str())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(bot_id, participant_id, "conversation create race, re-reading");
            let existing = self
                .find_conversation(bot_id, participant_id)
                .await?
                .with_context(|| {
                    format!("conversation vanished after create race: {bot_id}:{participant_id}")
                })?;
            return Ok((existing, false));
        }

        let created = self
            .find_conversation(bot_id, participant_id)
            .await?
            .with_context(|| format!("conversation not found after insert: {id}"))?;
        Ok((created, true))
    }

    // ── Clients ─────────────────────────────────────────────────────────

    pub async fn upsert_client(&self, client: Client) -> Result<()> {
        sqlx::query(
            "INSERT INTO clients (bot_id, participant_id, name, status)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(bot_id, participant_id) DO UPDATE SET
               name = excluded.name,
               status = excluded.status",
        )
        .bind(&client.bot_id)
        .bind(&client.participant_id)
        .bind(&client.name)
        .bind(client.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn client_status(
        &self,
        bot_id: &str,
        participant_id: &str,
    ) -> Result<Option<ClientStatus>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT * FROM clients WHERE bot_id = ? AND participant_id = ?",
        )
        .bind(bot_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(TryInto::<Client>::try_into)
            .transpose()?
            .map(|c| c.status))
    }

    // ── Messages ────────────────────────────────────────────────────────

    pub async fn message_by_external_id(&self, external_id: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Persist a message keyed by external id.
    ///
    /// A record bearing an already-seen external id is returned unchanged:
    /// no new row, and the caller can tell from `was_new = false` that the
    /// transport redelivered an event it had already handed over.
    pub async fn upsert_message(&self, new: NewMessage) -> Result<(Message, bool)> {
        if let Some(existing) = self.message_by_external_id(&new.external_id).await? {
            debug!(external_id = %new.external_id, "duplicate message, returning existing record");
            return Ok((existing, false));
        }

        let id = Uuid::new_v4().to_string();
        let result = sqlx::query(
            "INSERT INTO messages (id, external_id, conversation_id, sender, from_me, content, kind, forwarded_at_ms, processed, created_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(external_id) DO NOTHING",
        )
        .bind(&id)
        .bind(&new.external_id)
        .bind(&new.conversation_id)
        .bind(&new.sender)
        .bind(new.from_me as i64)
        .bind(&new.content)
        .bind(new.kind.as_str())
        .bind(new.forwarded_at_ms)
        .bind(new.processed as i64)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost the insert race to a concurrent delivery of the same event.
            let existing = self
                .message_by_external_id(&new.external_id)
                .await?
                .with_context(|| {
                    format!("message vanished after dedup race: {}", new.external_id)
                })?;
            return Ok((existing, false));
        }

        let created = self
            .message_by_external_id(&new.external_id)
            .await?
            .with_context(|| format!("message not found after insert: {id}"))?;
        Ok((created, true))
    }

    /// Mark a set of messages as forwarded/processed. Returns how many rows
    /// changed.
    pub async fn mark_forwarded(&self, message_ids: &[String]) -> Result<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let sql = format!(
            "UPDATE messages SET forwarded_at_ms = ?, processed = 1 WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(now_ms());
        for id in message_ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
