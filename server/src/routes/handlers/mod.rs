pub mod jobs;
pub mod pipeline;
pub mod webhook;

use axum::http::HeaderMap;

use crate::{
    error::{AppError, AppResult},
    server_config::internal_api_token,
};

/// Stage routes double as relay targets; both external triggers and our own
/// relay hops authenticate with the shared internal token.
pub fn check_internal_token(headers: &HeaderMap) -> AppResult<()> {
    let presented = headers
        .get("x-internal-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented == internal_api_token() {
        Ok(())
    } else {
        Err(AppError::Unauthorized("invalid internal token".to_string()))
    }
}
