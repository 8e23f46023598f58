//! SQLite-backed record store for bots, conversations, clients, and messages.
//!
//! The pipeline consumes this through plain record operations (create,
//! upsert, find-unique, update-many). Uniqueness constraints live in the
//! schema; the upsert helpers turn create races into re-reads so callers
//! never see a constraint violation for a lost race.

pub mod error;
pub mod records;
pub mod store;

pub use {
    error::{Error, Result},
    records::{Bot, Client, Conversation, Message, NewBot, NewMessage},
    store::RecordStore,
};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

/// Open (or create) the courier database at `path` and initialize the schema.
pub async fn open(path: &std::path::Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    RecordStore::init(&pool).await?;
    Ok(pool)
}

/// In-memory pool for tests. A single connection, so every query sees the
/// same database.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    RecordStore::init(&pool).await?;
    Ok(pool)
}
