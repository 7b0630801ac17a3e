//! Upstream mailbox provider API client.

pub mod client;

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use client::{MailboxClient, MailboxError};

/// Folders the importer walks. Serialized in the provider's casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum Folder {
    #[strum(serialize = "SENT")]
    #[serde(rename = "SENT")]
    Sent,
    #[strum(serialize = "INBOX")]
    #[serde(rename = "INBOX")]
    Inbox,
}

impl Folder {
    pub fn other(self) -> Folder {
        match self {
            Folder::Sent => Folder::Inbox,
            Folder::Inbox => Folder::Sent,
        }
    }
}

/// A message as returned by the provider's list/get endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub received_at: Option<chrono::DateTime<chrono::FixedOffset>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub records: Vec<MailboxMessage>,
    pub next_page_token: Option<String>,
}

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 30_000;
const BACKOFF_JITTER_MS: u64 = 250;

/// Exponential backoff with jitter: 1s, 2s, 4s... capped at 30s. A
/// Retry-After from the provider wins when it asks for longer.
pub fn backoff_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    let exp_ms = BACKOFF_BASE_MS
        .saturating_mul(1u64 << attempt.min(10))
        .min(BACKOFF_CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    let backoff = Duration::from_millis(exp_ms + jitter);
    match retry_after {
        Some(ra) if ra > backoff => ra,
        _ => backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_round_trip() {
        assert_eq!(Folder::Sent.to_string(), "SENT");
        assert_eq!("INBOX".parse::<Folder>().unwrap(), Folder::Inbox);
        assert_eq!(Folder::Sent.other(), Folder::Inbox);
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let jitter = Duration::from_millis(BACKOFF_JITTER_MS);
        assert!(backoff_delay(0, None) >= Duration::from_secs(1));
        assert!(backoff_delay(0, None) <= Duration::from_secs(1) + jitter);
        assert!(backoff_delay(2, None) >= Duration::from_secs(4));
        // attempts far past the cap stay at the ceiling
        assert!(backoff_delay(30, None) <= Duration::from_secs(30) + jitter);
    }

    #[test]
    fn test_backoff_honors_longer_retry_after() {
        let ra = Duration::from_secs(120);
        assert_eq!(backoff_delay(0, Some(ra)), ra);
        // a shorter Retry-After than the computed backoff is ignored
        let short = Duration::from_millis(1);
        assert!(backoff_delay(3, Some(short)) >= Duration::from_secs(8));
    }
}
