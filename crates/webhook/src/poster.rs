//! HTTP delivery to tenant callback endpoints.

use std::time::Duration;

use {
    anyhow::{Context, Result},
    tracing::{debug, warn},
};

/// Outcome of posting a payload to a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// 2xx: the callback accepted the payload.
    Delivered,
    /// 4xx: terminal, never retried. The payload or target is permanently
    /// unacceptable (misconfigured URL, malformed body).
    Rejected { status: u16 },
    /// 5xx, network error, or timeout, after the inner retry budget.
    RetryableFailure { reason: String },
}

impl Delivery {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Poster tuning. The defaults mirror the delivery contract: 10s request
/// timeout, 3 attempts, backoff 1s → 2s → 4s.
#[derive(Debug, Clone)]
pub struct PosterConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for PosterConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Stateless HTTP client for callback delivery. Cheap to clone.
#[derive(Clone)]
pub struct Poster {
    client: reqwest::Client,
    config: PosterConfig,
}

impl Poster {
    pub fn new(config: PosterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(PosterConfig::default())
    }

    /// POST `payload` to `url`, retrying transient failures up to the
    /// configured attempt budget. A rejection short-circuits immediately.
    pub async fn post(&self, url: &str, payload: &serde_json::Value) -> Delivery {
        let mut last_reason = String::new();

        for attempt in 1..=self.config.max_attempts {
            match self.post_once(url, payload).await {
                Attempt::Delivered => {
                    debug!(url, attempt, "callback accepted payload");
                    return Delivery::Delivered;
                },
                Attempt::Rejected { status, body } => {
                    warn!(url, status, body = %truncate(&body, 200), "callback rejected payload, not retrying");
                    return Delivery::Rejected { status };
                },
                Attempt::Transient { reason } => {
                    warn!(
                        url,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        reason = %reason,
                        "callback delivery attempt failed"
                    );
                    last_reason = reason;
                },
            }

            if attempt < self.config.max_attempts {
                // 1s, 2s, 4s with the default base.
                let delay = self.config.backoff_base * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
        }

        Delivery::RetryableFailure {
            reason: last_reason,
        }
    }

    async fn post_once(&self, url: &str, payload: &serde_json::Value) -> Attempt {
        let response = match self.client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Transient {
                    reason: e.to_string(),
                };
            },
        };

        let status = response.status();
        if status.is_success() {
            return Attempt::Delivered;
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Rejected {
                status: status.as_u16(),
                body,
            };
        }
        Attempt::Transient {
            reason: format!("HTTP {}", status.as_u16()),
        }
    }
}

enum Attempt {
    Delivered,
    Rejected { status: u16, body: String },
    Transient { reason: String },
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn fast_poster(max_attempts: u32) -> Poster {
        Poster::new(PosterConfig {
            timeout: Duration::from_secs(2),
            max_attempts,
            backoff_base: Duration::from_millis(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_2xx_is_delivered() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(200)
            .create_async()
            .await;

        let outcome = fast_poster(3)
            .post(
                &format!("{}/hook", server.url()),
                &serde_json::json!({"content": "hello"}),
            )
            .await;
        assert_eq!(outcome, Delivery::Delivered);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_4xx_is_rejected_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(404)
            .with_body("no such workflow")
            .expect(1)
            .create_async()
            .await;

        let outcome = fast_poster(3)
            .post(&format!("{}/hook", server.url()), &serde_json::json!({}))
            .await;
        assert_eq!(outcome, Delivery::Rejected { status: 404 });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_5xx_retries_full_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let outcome = fast_poster(3)
            .post(&format!("{}/hook", server.url()), &serde_json::json!({}))
            .await;
        assert!(matches!(outcome, Delivery::RetryableFailure { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_error_is_retryable() {
        // Nothing is listening on this port.
        let outcome = fast_poster(2)
            .post("http://127.0.0.1:1/hook", &serde_json::json!({}))
            .await;
        assert!(matches!(outcome, Delivery::RetryableFailure { .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 4), "héll");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
