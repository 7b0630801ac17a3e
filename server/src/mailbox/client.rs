use std::{sync::Arc, time::Duration};

use anyhow::Context;
use leaky_bucket::RateLimiter;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::{server_config::cfg, HttpClient};

use super::{Folder, MailboxMessage, MessagePage};

/// Errors from the upstream mailbox provider, split by retry policy.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// Expired or revoked token. Never retried; the job surfaces a
    /// "reconnect your account" error to the owner.
    #[error("mailbox authorization expired")]
    Unauthorized,

    #[error("mailbox rate limit hit")]
    RateLimited { retry_after: Option<Duration> },

    #[error("mailbox server error (HTTP {status})")]
    Server { status: u16 },

    #[error("mailbox request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected mailbox response: {0}")]
    BadResponse(#[from] anyhow::Error),
}

impl MailboxError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MailboxError::Unauthorized | MailboxError::BadResponse(_) => false,
            MailboxError::RateLimited { .. } | MailboxError::Server { .. } => true,
            MailboxError::Transport(e) => !e.is_builder(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MailboxError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type MailboxResult<T> = Result<T, MailboxError>;

#[derive(Clone)]
pub struct MailboxClient {
    http_client: HttpClient,
    base_url: Url,
    api_token: String,
    rate_limiter: Arc<RateLimiter>,
}

impl MailboxClient {
    pub fn new(http_client: HttpClient, api_token: String) -> Self {
        let rate_limiter = Arc::new(
            RateLimiter::builder()
                .initial(cfg.mailbox.quota_per_second)
                .interval(Duration::from_secs(1))
                .refill(cfg.mailbox.quota_per_second)
                .build(),
        );

        Self {
            http_client,
            base_url: cfg.mailbox.base_url.clone(),
            api_token,
            rate_limiter,
        }
    }

    fn url(&self, path: &str) -> Url {
        // Base URL carries a trailing slash, so joins stay inside it.
        self.base_url.join(path).expect("mailbox path is valid")
    }

    /// List one page of a folder. The page token is opaque; None starts
    /// from the beginning.
    pub async fn list_messages(
        &self,
        folder: Folder,
        limit: u32,
        page_token: Option<&str>,
    ) -> MailboxResult<MessagePage> {
        self.rate_limiter.acquire_one().await;

        let mut query = vec![
            ("folder".to_string(), folder.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken".to_string(), token.to_string()));
        }

        let resp = self
            .http_client
            .get(self.url("messages"))
            .query(&query)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let resp = check_status(resp)?;
        let page = resp
            .json::<MessagePage>()
            .await
            .context("Could not parse message list response")?;

        Ok(page)
    }

    pub async fn get_message(&self, message_id: &str) -> MailboxResult<MailboxMessage> {
        self.rate_limiter.acquire_one().await;

        let resp = self
            .http_client
            .get(self.url(&format!("messages/{}", message_id)))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let resp = check_status(resp)?;
        let message = resp
            .json::<MailboxMessage>()
            .await
            .context("Could not parse message response")?;

        Ok(message)
    }
}

fn check_status(resp: reqwest::Response) -> MailboxResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(MailboxError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get(http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(MailboxError::RateLimited { retry_after })
        }
        s if s.is_server_error() => Err(MailboxError::Server {
            status: s.as_u16(),
        }),
        s => Err(MailboxError::BadResponse(anyhow::anyhow!(
            "unexpected status {}",
            s
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_split() {
        assert!(!MailboxError::Unauthorized.is_retryable());
        assert!(MailboxError::RateLimited { retry_after: None }.is_retryable());
        assert!(MailboxError::Server { status: 503 }.is_retryable());
    }

    #[test]
    fn test_retry_after_only_on_rate_limit() {
        let e = MailboxError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(e.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(MailboxError::Server { status: 500 }.retry_after(), None);
    }
}
