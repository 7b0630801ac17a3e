//! LLM gateway client.
//!
//! One chat-completion endpoint serves classification, consolidation, voice
//! learning and drafting. The gateway gives no structured-output guarantee,
//! so callers parse replies through [`extract`].

pub mod extract;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::AppResult,
    rate_limiters::RateLimiters,
    server_config::{cfg, llm_api_key},
    util, HttpClient,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}

#[derive(Debug)]
pub struct ChatReply {
    pub content: String,
    pub token_usage: i64,
}

/// Send one chat-completion request and return the reply text.
///
/// Acquires rate-limit budget before the call; a gateway-reported rate
/// limit flips the shared backoff flag so concurrent callers slow down too.
pub async fn send_chat_prompt(
    http_client: &HttpClient,
    rate_limiters: &RateLimiters,
    system_prompt: &str,
    user_prompt: &str,
) -> AppResult<ChatReply> {
    let estimated = util::estimate_tokens(system_prompt) + util::estimate_tokens(user_prompt);
    rate_limiters.acquire(estimated).await;

    let resp = http_client
        .post(cfg.model.endpoint.clone())
        .bearer_auth(llm_api_key())
        .json(&json!({
            "model": &cfg.model.id,
            "temperature": cfg.model.temperature,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ]
        }))
        .send()
        .await?
        .json::<serde_json::Value>()
        .await?;

    let parsed = serde_json::from_value::<ChatApiResponseOrError>(resp.clone())
        .context(format!("Could not parse chat response: {}", resp))?;

    let parsed = match parsed {
        ChatApiResponseOrError::Error(error) => {
            if error.message.to_lowercase().contains("rate limit") {
                rate_limiters.trigger_backoff();
            }
            return Err(anyhow!("Chat API error: {:?}", error).into());
        }
        ChatApiResponseOrError::Response(parsed) => parsed,
    };

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .context("No choices in response")?;
    let token_usage = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);

    Ok(ChatReply {
        content: choice.message.content,
        token_usage,
    })
}
