use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] courier_store::Error),

    #[error(transparent)]
    Queue(#[from] courier_queue::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("bot not found: {bot_id}")]
    BotNotFound { bot_id: String },
}

impl Error {
    #[must_use]
    pub fn bot_not_found(bot_id: impl Into<String>) -> Self {
        Self::BotNotFound {
            bot_id: bot_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
