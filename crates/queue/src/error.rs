use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: i64 },
}

impl Error {
    #[must_use]
    pub fn job_not_found(job_id: i64) -> Self {
        Self::JobNotFound { job_id }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
