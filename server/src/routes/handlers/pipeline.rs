//! Pipeline stage triggers. Each handler runs one bounded invocation of its
//! stage inline and reports the outcome; continuation happens through the
//! relay, not through this request.

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    error::AppJsonResult,
    pipeline::{
        classifier::{self, ClassifyRequest},
        consolidator::{self, ConsolidateRequest},
        importer::{self, ImportRequest},
    },
    ServerState,
};

use super::check_internal_token;

pub async fn trigger_import(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<ImportRequest>,
) -> AppJsonResult<Value> {
    check_internal_token(&headers)?;
    let outcome = importer::run_import(&state, req).await?;
    Ok(Json(json!({ "outcome": outcome })))
}

pub async fn trigger_classify(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<ClassifyRequest>,
) -> AppJsonResult<Value> {
    check_internal_token(&headers)?;
    let outcome = classifier::run_classify(&state, req).await?;
    Ok(Json(json!({ "outcome": outcome })))
}

pub async fn trigger_consolidate(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(req): Json<ConsolidateRequest>,
) -> AppJsonResult<Value> {
    check_internal_token(&headers)?;
    let outcome = consolidator::run_consolidate(&state, req).await?;
    Ok(Json(json!({ "outcome": outcome })))
}
