use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("bot not found: {bot_id}")]
    BotNotFound { bot_id: String },

    #[error("invalid {field} value in row: {value}")]
    InvalidRow { field: &'static str, value: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn bot_not_found(bot_id: impl Into<String>) -> Self {
        Self::BotNotFound {
            bot_id: bot_id.into(),
        }
    }
}

impl courier_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

courier_common::impl_context!();
