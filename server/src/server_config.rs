use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, result::Result};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Base URL this server is reachable at, used for relay self-invocation.
    pub self_base_url: Url,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    pub base_url: Url,
    /// Provider API quota, tokens per second for the leaky bucket.
    pub quota_per_second: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub endpoint: Url,
    pub temperature: f64,
    /// Classifications below this confidence are flagged for review.
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptLimits {
    pub rate_limit_per_sec: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenLimits {
    pub rate_limit_per_min: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub prompt_limits: PromptLimits,
    pub token_limits: TokenLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Work budget per invocation; always below the execution ceiling so a
    /// checkpoint fits before the host kills us.
    pub time_budget_secs: u64,
    pub execution_ceiling_secs: u64,
    pub import_page_size: u32,
    pub import_default_target: i32,
    pub max_retries: u32,
    pub max_stalled_relays: i32,
    pub classify_chunk_size: u64,
    pub consolidate_chunk_size: usize,
    /// Staging-row updates run concurrently in groups of this size.
    pub db_write_group: usize,
    pub voice_sample_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyCategory {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub visibility_timeout_secs: u64,
    pub max_attempts: i32,
    pub poll_interval_ms: u64,
    pub read_batch_size: u64,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    settings: Settings,
    mailbox: MailboxConfig,
    model: ModelConfig,
    api: ApiConfig,
    pipeline: PipelineConfig,
    queue: QueueConfig,
    categories: Vec<ClassifyCategory>,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub settings: Settings,
    pub mailbox: MailboxConfig,
    pub model: ModelConfig,
    pub api: ApiConfig,
    pub pipeline: PipelineConfig,
    pub queue: QueueConfig,
    pub categories: Vec<ClassifyCategory>,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\n{:?}\n\nMailbox: {:?}\n\nModel: {:?}\n\nAPI: {:?}\n\nPipeline: {:?}\n\nQueue: {:?}\n\nCategories:\n{}",
            self.settings,
            self.mailbox,
            self.model,
            self.api,
            self.pipeline,
            self.queue,
            self.categories
                .iter()
                .map(|c| format!("{} -> {}", c.name, c.description))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

fn load_config_file() -> Result<ConfigFile, ConfigError> {
    let root = env::var("APP_DIR").unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        let dir = Path::new(&dir).parent().unwrap().display().to_string();
        format!("{}/config", dir)
    });
    let path = format!("{root}/server.toml");
    let builder = Config::builder()
        .add_source(config::File::with_name(&path))
        .build()?;

    builder.try_deserialize()
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let file = load_config_file().expect("Failed to load server.toml");
        ServerConfig {
            settings: file.settings,
            mailbox: file.mailbox,
            model: file.model,
            api: file.api,
            pipeline: file.pipeline,
            queue: file.queue,
            categories: file.categories,
        }
    };
}

/// Secrets come from the environment, not the config file.
pub fn llm_api_key() -> String {
    env::var("LLM_API_KEY").expect("LLM_API_KEY is not set")
}

pub fn mailbox_api_token() -> String {
    env::var("MAILBOX_API_TOKEN").expect("MAILBOX_API_TOKEN is not set")
}

pub fn webhook_secret() -> String {
    env::var("WEBHOOK_SECRET").expect("WEBHOOK_SECRET is not set")
}

pub fn internal_api_token() -> String {
    env::var("INTERNAL_API_TOKEN").expect("INTERNAL_API_TOKEN is not set")
}
