//! Job progress rows for the dashboard. Read-only; the pipeline keeps these
//! monotonically informative and never stale past a terminal status.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::AppJsonResult,
    model::{import_job::ImportJobCtrl, staging_message::StagingMessageCtrl},
    ServerState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub status: String,
    pub current_folder: String,
    pub sent_imported: i32,
    pub inbox_imported: i32,
    pub total_target: i32,
    pub unclassified: u64,
    pub retry_count: i32,
    pub stalled_relays: i32,
    pub last_error: Option<String>,
    pub last_batch_at: Option<chrono::DateTime<chrono::FixedOffset>>,
}

pub async fn get_job_progress(
    State(state): State<ServerState>,
    Path(workspace_id): Path<i32>,
) -> AppJsonResult<Value> {
    let Some(job) = ImportJobCtrl::for_workspace(&state.conn, workspace_id).await? else {
        return Ok(Json(json!({ "job": null })));
    };

    let unclassified = StagingMessageCtrl::count_unclassified(&state.conn, workspace_id).await?;

    let progress = JobProgress {
        status: job.status,
        current_folder: job.current_folder,
        sent_imported: job.sent_imported,
        inbox_imported: job.inbox_imported,
        total_target: job.total_target,
        unclassified,
        retry_count: job.retry_count,
        stalled_relays: job.stalled_relays,
        last_error: job.last_error,
        last_batch_at: job.last_batch_at,
    };

    Ok(Json(json!({ "job": progress })))
}
