//! Fire-and-forget self-invocation.
//!
//! A relay hop is an authenticated POST back to one of our own stage
//! routes, carrying the full resumable payload, spawned on a detached task.
//! Failures are logged and swallowed: the importer's checkpoint row makes a
//! dropped relay recoverable, and the caller has already committed its work.

use serde::Serialize;

use crate::{
    server_config::{cfg, internal_api_token},
    HttpClient,
};

pub const IMPORT_PATH: &str = "pipeline/import";
pub const CLASSIFY_PATH: &str = "pipeline/classify";
pub const CONSOLIDATE_PATH: &str = "pipeline/consolidate";

#[derive(Clone)]
pub struct Relay {
    http_client: HttpClient,
}

impl Relay {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    pub fn fire<P: Serialize>(&self, path: &str, payload: &P) {
        let url = match cfg.settings.self_base_url.join(path) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("relay target {} does not resolve: {}", path, e);
                return;
            }
        };

        let client = self.http_client.clone();
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("relay payload for {} not serializable: {}", path, e);
                return;
            }
        };

        tokio::spawn(async move {
            let result = client
                .post(url.clone())
                .header("x-internal-token", internal_api_token())
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!("relayed to {}", url);
                }
                Ok(resp) => {
                    tracing::warn!("relay to {} answered HTTP {}", url, resp.status());
                }
                Err(e) => {
                    tracing::warn!("relay to {} failed: {}", url, e);
                }
            }
        });
    }
}
