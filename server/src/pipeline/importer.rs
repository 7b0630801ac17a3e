//! Batch mailbox importer.
//!
//! One invocation does a bounded slice of the walk: acquire the workspace
//! lock, load or create the checkpoint row, pull pages from the current
//! folder, upsert them into staging, re-derive counts, checkpoint. When the
//! budget runs out before the job is done, the invocation releases the lock
//! and relays to a fresh invocation of itself carrying the job id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db_core::prelude::*,
    error::AppResult,
    mailbox::{backoff_delay, client::MailboxResult, Folder, MailboxClient, MailboxError, MessagePage},
    model::{
        import_job::{current_folder, job_status, Checkpoint, ImportJobCtrl, JobStatus},
        staging_message::{Direction, DirectionCounts, NewStagingMessage, StagingMessageCtrl},
        worker_lock::WorkerLockCtrl,
        workspace::WorkspaceCtrl,
    },
    server_config::{cfg, mailbox_api_token},
    ServerState,
};

use super::{
    classifier::ClassifyRequest,
    relay::{Relay, CLASSIFY_PATH, IMPORT_PATH},
    ImportProgress, TimeBudget,
};

const LOCK_NAME: &str = "email_import";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub workspace_id: i32,
    #[serde(default)]
    pub job_id: Option<i32>,
    /// Backoff the previous hop could not absorb; slept off at the start
    /// of this invocation if the budget allows.
    #[serde(default)]
    pub sleep_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcome {
    /// Another worker holds the lock; nothing to do.
    Skipped,
    Cancelled,
    Completed,
    /// Checkpointed and handed off to a fresh invocation.
    Relayed,
    Stalled,
    Failed,
}

pub async fn run_import(state: &ServerState, req: ImportRequest) -> AppResult<ImportOutcome> {
    let workspace = WorkspaceCtrl::by_id(&state.conn, req.workspace_id).await?;

    let locked_by = format!("import-{}", Uuid::new_v4());
    if !WorkerLockCtrl::acquire(&state.conn, workspace.id, LOCK_NAME, &locked_by).await? {
        return Ok(ImportOutcome::Skipped);
    }

    let outcome = drive_import(state, &workspace, &req).await;
    WorkerLockCtrl::release(&state.conn, workspace.id, LOCK_NAME).await?;
    outcome
}

async fn drive_import(
    state: &ServerState,
    workspace: &workspace::Model,
    req: &ImportRequest,
) -> AppResult<ImportOutcome> {
    let conn = &state.conn;
    let budget = TimeBudget::start();
    let relay = Relay::new(state.http_client.clone());

    let total_target = if workspace.import_total_target > 0 {
        workspace.import_total_target
    } else {
        cfg.pipeline.import_default_target
    };
    let job = ImportJobCtrl::get_or_create(conn, workspace.id, total_target).await?;

    match job_status(&job) {
        JobStatus::Cancelled => {
            tracing::info!(workspace_id = workspace.id, "import job cancelled, exiting");
            return Ok(ImportOutcome::Cancelled);
        }
        JobStatus::Completed | JobStatus::Classifying => return Ok(ImportOutcome::Completed),
        JobStatus::Error => return Ok(ImportOutcome::Failed),
        _ => {}
    }

    // Counts come from staging, never from the job row's own memory of
    // itself; duplicate pages and partial upserts wash out here.
    let counts = StagingMessageCtrl::direction_counts(conn, workspace.id).await?;

    // A relay chain that stops making progress gets cut off instead of
    // bouncing against a dead upstream forever. The very first hop of a
    // queued job is exempt; it has had no chance to progress yet.
    let stalled = ImportJobCtrl::track_progress(conn, &job, counts.total()).await?;
    if job_status(&job) != JobStatus::Queued && stalled >= cfg.pipeline.max_stalled_relays {
        let msg = format!(
            "import stalled: no progress across {} consecutive relays",
            stalled
        );
        tracing::error!(workspace_id = workspace.id, "{}", msg);
        ImportJobCtrl::set_error(conn, job.id, &msg).await?;
        return Ok(ImportOutcome::Stalled);
    }

    if let Some(ms) = req.sleep_ms {
        let hint = std::time::Duration::from_millis(ms);
        if budget.can_absorb(hint) {
            tokio::time::sleep(hint).await;
        } else {
            relay_import(&relay, workspace.id, job.id, Some(ms));
            return Ok(ImportOutcome::Relayed);
        }
    }

    let client = MailboxClient::new(state.http_client.clone(), mailbox_api_token());

    let mut progress = ImportProgress {
        sent_imported: counts.outbound,
        inbox_imported: counts.inbound,
        sent_done: job.sent_done,
        inbox_done: job.inbox_done,
        total_target: job.total_target,
    };
    let mut sent_cursor = job.sent_cursor.clone();
    let mut inbox_cursor = job.inbox_cursor.clone();
    let mut folder = current_folder(&job);

    loop {
        let Some(next) = progress.next_folder(folder) else {
            break;
        };
        folder = next;

        if budget.expired() {
            checkpoint(conn, job.id, folder, &progress, &sent_cursor, &inbox_cursor).await?;
            relay_import(&relay, workspace.id, job.id, None);
            return Ok(ImportOutcome::Relayed);
        }

        let cursor = match folder {
            Folder::Sent => sent_cursor.as_deref(),
            Folder::Inbox => inbox_cursor.as_deref(),
        };

        let page = match fetch_page(&client, folder, cursor, &budget).await {
            Ok(page) => page,
            Err(FetchFailure::Unauthorized) => {
                let msg = "mailbox authorization expired, reconnect your account";
                tracing::error!(workspace_id = workspace.id, "{}", msg);
                ImportJobCtrl::set_error(conn, job.id, msg).await?;
                return Ok(ImportOutcome::Failed);
            }
            Err(FetchFailure::BudgetExhausted { sleep_ms }) => {
                ImportJobCtrl::bump_retry_count(conn, &job).await?;
                checkpoint(conn, job.id, folder, &progress, &sent_cursor, &inbox_cursor).await?;
                relay_import(&relay, workspace.id, job.id, Some(sleep_ms));
                return Ok(ImportOutcome::Relayed);
            }
            Err(FetchFailure::RetriesExhausted(e)) => {
                // Still transient as far as we know; checkpoint and let the
                // next hop try again. The stall counter bounds the chain.
                tracing::warn!(
                    workspace_id = workspace.id,
                    "page fetch failed after retries: {}",
                    e
                );
                ImportJobCtrl::bump_retry_count(conn, &job).await?;
                checkpoint(conn, job.id, folder, &progress, &sent_cursor, &inbox_cursor).await?;
                relay_import(&relay, workspace.id, job.id, None);
                return Ok(ImportOutcome::Relayed);
            }
        };

        let exhausted = page.next_page_token.is_none() || page.records.is_empty();
        let rows = normalize_page(workspace.id, folder, &page);
        StagingMessageCtrl::upsert_batch(conn, rows).await?;

        let counts = StagingMessageCtrl::direction_counts(conn, workspace.id).await?;
        progress.sent_imported = counts.outbound;
        progress.inbox_imported = counts.inbound;

        match folder {
            Folder::Sent => sent_cursor = page.next_page_token.clone(),
            Folder::Inbox => inbox_cursor = page.next_page_token.clone(),
        }
        if exhausted {
            progress.mark_done(folder);
        }

        checkpoint(conn, job.id, folder, &progress, &sent_cursor, &inbox_cursor).await?;
        tracing::info!(
            workspace_id = workspace.id,
            folder = %folder,
            sent = progress.sent_imported,
            inbox = progress.inbox_imported,
            target = progress.total_target,
            "import batch checkpointed"
        );
    }

    ImportJobCtrl::set_status(conn, job.id, JobStatus::Classifying).await?;
    tracing::info!(
        workspace_id = workspace.id,
        total = progress.total(),
        "import complete, handing off to classification"
    );
    relay.fire(
        CLASSIFY_PATH,
        &ClassifyRequest {
            workspace_id: workspace.id,
        },
    );

    Ok(ImportOutcome::Completed)
}

enum FetchFailure {
    Unauthorized,
    /// The required backoff does not fit in what is left of the budget;
    /// carried to the next hop as a sleep hint instead of blocking here.
    BudgetExhausted {
        sleep_ms: u64,
    },
    RetriesExhausted(MailboxError),
}

async fn fetch_page(
    client: &MailboxClient,
    folder: Folder,
    cursor: Option<&str>,
    budget: &TimeBudget,
) -> Result<MessagePage, FetchFailure> {
    let mut attempt = 0u32;
    loop {
        let result: MailboxResult<MessagePage> = client
            .list_messages(folder, cfg.pipeline.import_page_size, cursor)
            .await;

        let err = match result {
            Ok(page) => return Ok(page),
            Err(MailboxError::Unauthorized) => return Err(FetchFailure::Unauthorized),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= cfg.pipeline.max_retries {
            return Err(FetchFailure::RetriesExhausted(err));
        }

        let delay = backoff_delay(attempt, err.retry_after());
        if !budget.can_absorb(delay) {
            return Err(FetchFailure::BudgetExhausted {
                sleep_ms: delay.as_millis() as u64,
            });
        }

        tracing::info!(
            folder = %folder,
            attempt,
            "transient mailbox error, backing off {:?}: {}",
            delay,
            err
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn normalize_page(
    workspace_id: i32,
    folder: Folder,
    page: &MessagePage,
) -> Vec<NewStagingMessage> {
    let direction = match folder {
        Folder::Sent => Direction::Outbound,
        Folder::Inbox => Direction::Inbound,
    };

    page.records
        .iter()
        .map(|record| NewStagingMessage {
            workspace_id,
            external_id: record.id.clone(),
            thread_id: record.thread_id.clone(),
            direction,
            from_address: record.from.clone(),
            to_address: record.to.clone(),
            subject: record.subject.clone(),
            snippet: record.snippet.clone(),
            body: record.body.clone(),
            received_at: record.received_at,
        })
        .collect()
}

async fn checkpoint(
    conn: &DatabaseConnection,
    job_id: i32,
    folder: Folder,
    progress: &ImportProgress,
    sent_cursor: &Option<String>,
    inbox_cursor: &Option<String>,
) -> AppResult<()> {
    let status = match folder {
        Folder::Sent => JobStatus::ScanningSent,
        Folder::Inbox => JobStatus::ScanningInbox,
    };
    ImportJobCtrl::checkpoint(
        conn,
        job_id,
        &Checkpoint {
            status,
            current_folder: folder,
            sent_cursor: sent_cursor.clone(),
            inbox_cursor: inbox_cursor.clone(),
            sent_done: progress.sent_done,
            inbox_done: progress.inbox_done,
            counts: DirectionCounts {
                outbound: progress.sent_imported,
                inbound: progress.inbox_imported,
            },
        },
    )
    .await
}

fn relay_import(relay: &Relay, workspace_id: i32, job_id: i32, sleep_ms: Option<u64>) {
    relay.fire(
        IMPORT_PATH,
        &ImportRequest {
            workspace_id,
            job_id: Some(job_id),
            sleep_ms,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MailboxMessage;

    fn page(ids: &[&str], next: Option<&str>) -> MessagePage {
        MessagePage {
            records: ids
                .iter()
                .map(|id| MailboxMessage {
                    id: ToString::to_string(&id),
                    thread_id: Some(format!("t-{}", id)),
                    from: Some("customer@example.com".to_string()),
                    to: Some("owner@example.com".to_string()),
                    subject: Some("Hello".to_string()),
                    snippet: Some("Hi there".to_string()),
                    body: Some("Hi there, full body".to_string()),
                    received_at: None,
                })
                .collect(),
            next_page_token: next.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_normalize_sets_direction_by_folder() {
        let p = page(&["a", "b"], None);
        let sent = normalize_page(1, Folder::Sent, &p);
        assert!(sent.iter().all(|r| r.direction == Direction::Outbound));
        let inbox = normalize_page(1, Folder::Inbox, &p);
        assert!(inbox.iter().all(|r| r.direction == Direction::Inbound));
        assert_eq!(inbox[0].external_id, "a");
        assert_eq!(inbox[0].thread_id.as_deref(), Some("t-a"));
    }

    #[test]
    fn test_page_exhaustion_detection() {
        // Matches the loop's `exhausted` expression.
        let with_next = page(&["a"], Some("tok"));
        assert!(!(with_next.next_page_token.is_none() || with_next.records.is_empty()));

        let last = page(&["a"], None);
        assert!(last.next_page_token.is_none() || last.records.is_empty());

        let empty = page(&[], Some("tok"));
        assert!(empty.next_page_token.is_none() || empty.records.is_empty());
    }
}
