//! Queue consumer loops.
//!
//! One long-lived loop per queue, pulling leased batches and dispatching on
//! the job kind. Delivery is at-least-once: a message is deleted only after
//! its handler succeeds, and a message read more than `max_attempts` times
//! is archived to the dead letter instead of retried again.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    model::queue::{Job, LeasedMessage, QueueCtrl, QUEUE_DRAFT, QUEUE_IMPORT_FETCH, QUEUE_VOICE},
    pipeline::{draft, importer, voice},
    server_config::cfg,
    ServerState,
};

pub fn spawn_queue_workers(state: ServerState, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    [QUEUE_IMPORT_FETCH, QUEUE_DRAFT, QUEUE_VOICE]
        .into_iter()
        .map(|queue| {
            let state = state.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_queue_loop(state, queue, shutdown).await;
            })
        })
        .collect()
}

async fn run_queue_loop(state: ServerState, queue: &'static str, shutdown: CancellationToken) {
    let poll_interval = std::time::Duration::from_millis(cfg.queue.poll_interval_ms);
    tracing::info!(queue, "queue worker started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(queue, "queue worker shutting down");
                return;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let batch = match QueueCtrl::read(
            &state.conn,
            queue,
            cfg.queue.visibility_timeout_secs,
            cfg.queue.read_batch_size,
        )
        .await
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(queue, "queue read failed: {:?}", e);
                continue;
            }
        };

        for msg in batch {
            process_message(&state, queue, msg).await;
        }
    }
}

async fn process_message(state: &ServerState, queue: &str, msg: LeasedMessage) {
    // Exhausted messages go to the dead letter before another attempt.
    if msg.read_ct > cfg.queue.max_attempts {
        tracing::warn!(
            queue,
            msg_id = msg.msg_id,
            read_ct = msg.read_ct,
            "retry budget exhausted, dead-lettering"
        );
        if let Err(e) = QueueCtrl::archive(&state.conn, queue, &msg, "retry budget exhausted").await
        {
            tracing::error!(queue, msg_id = msg.msg_id, "dead-letter failed: {:?}", e);
        }
        return;
    }

    match handle_job(state, &msg.job).await {
        Ok(()) => {
            if let Err(e) = QueueCtrl::delete(&state.conn, queue, msg.msg_id).await {
                tracing::error!(queue, msg_id = msg.msg_id, "ack failed: {:?}", e);
            }
        }
        Err(e) => {
            // Leave the message leased; it reappears after the visibility
            // timeout with read_ct bumped.
            tracing::warn!(
                queue,
                msg_id = msg.msg_id,
                read_ct = msg.read_ct,
                "job failed, will retry: {:?}",
                e
            );
        }
    }
}

async fn handle_job(state: &ServerState, job: &Job) -> anyhow::Result<()> {
    match job {
        Job::ImportFetch {
            workspace_id,
            job_id,
            sleep_ms,
        } => {
            let outcome = importer::run_import(
                state,
                importer::ImportRequest {
                    workspace_id: *workspace_id,
                    job_id: *job_id,
                    sleep_ms: *sleep_ms,
                },
            )
            .await?;
            tracing::info!(workspace_id, outcome = ?outcome, "import job handled");
            Ok(())
        }
        Job::Draft {
            workspace_id,
            message_id,
        } => {
            draft::run_draft(state, *workspace_id, *message_id).await?;
            Ok(())
        }
        Job::VoiceLearn { workspace_id } => {
            voice::run_voice_learn(state, *workspace_id).await?;
            Ok(())
        }
    }
}
