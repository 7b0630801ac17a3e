//! Durable FIFO work queue over the `queue_message` table.
//!
//! At-least-once delivery: a read leases messages by pushing their
//! visibility timeout into the future and bumping `read_ct`; a handler
//! crash lets the lease lapse and the message reappears. Removal only
//! happens on explicit delete, or on archive to the dead-letter table once
//! `read_ct` exceeds the retry budget.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{db_core::prelude::*, error::AppResult, util};

pub const QUEUE_IMPORT_FETCH: &str = "import_fetch";
pub const QUEUE_DRAFT: &str = "draft";
pub const QUEUE_VOICE: &str = "voice";

/// Every job the queue can carry. Consumers match exhaustively, so adding
/// a variant forces every handler site to decide what to do with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    ImportFetch {
        workspace_id: i32,
        #[serde(default)]
        job_id: Option<i32>,
        /// Backoff the previous invocation could not absorb in its budget.
        #[serde(default)]
        sleep_ms: Option<u64>,
    },
    Draft {
        workspace_id: i32,
        message_id: i32,
    },
    VoiceLearn {
        workspace_id: i32,
    },
}

impl Job {
    pub fn queue(&self) -> &'static str {
        match self {
            Job::ImportFetch { .. } => QUEUE_IMPORT_FETCH,
            Job::Draft { .. } => QUEUE_DRAFT,
            Job::VoiceLearn { .. } => QUEUE_VOICE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeasedMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub job: Job,
}

pub struct QueueCtrl;

impl QueueCtrl {
    /// Enqueue a job, optionally delayed. Returns the message id.
    pub async fn send(
        conn: &DatabaseConnection,
        job: &Job,
        delay_secs: u64,
    ) -> AppResult<i64> {
        let now = util::now_fixed();
        let row = queue_message::ActiveModel {
            queue: Set(job.queue().to_string()),
            payload: Set(serde_json::to_value(job)?),
            read_ct: Set(0),
            vt: Set(now + Duration::seconds(delay_secs as i64)),
            enqueued_at: Set(now),
            ..Default::default()
        };
        let res = QueueMessage::insert(row).exec(conn).await?;
        Ok(res.last_insert_id)
    }

    /// Lease up to `max` visible messages for `vt_secs`. Rows whose payload
    /// no longer deserializes are archived straight to the dead letter.
    pub async fn read(
        conn: &DatabaseConnection,
        queue: &str,
        vt_secs: u64,
        max: u64,
    ) -> AppResult<Vec<LeasedMessage>> {
        let now = util::now_fixed();
        let txn = conn.begin().await?;

        let rows = QueueMessage::find()
            .filter(queue_message::Column::Queue.eq(queue))
            .filter(queue_message::Column::Vt.lte(now))
            .order_by_asc(queue_message::Column::MsgId)
            .limit(max)
            .all(&txn)
            .await?;

        let mut leased = Vec::with_capacity(rows.len());
        for row in rows {
            let read_ct = row.read_ct + 1;
            let msg_id = row.msg_id;

            let mut active = row.clone().into_active_model();
            active.read_ct = Set(read_ct);
            active.vt = Set(now + Duration::seconds(vt_secs as i64));
            active.update(&txn).await?;

            match serde_json::from_value::<Job>(row.payload.clone()) {
                Ok(job) => leased.push(LeasedMessage {
                    msg_id,
                    read_ct,
                    job,
                }),
                Err(e) => {
                    tracing::warn!(msg_id, "unreadable queue payload, dead-lettering: {}", e);
                    Self::archive_row(&txn, queue, msg_id, row.payload, read_ct, &e.to_string())
                        .await?;
                }
            }
        }

        txn.commit().await?;
        Ok(leased)
    }

    /// Ack: remove a handled message.
    pub async fn delete(conn: &DatabaseConnection, queue: &str, msg_id: i64) -> AppResult<()> {
        QueueMessage::delete_many()
            .filter(queue_message::Column::Queue.eq(queue))
            .filter(queue_message::Column::MsgId.eq(msg_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Move an exhausted message to the dead-letter table.
    pub async fn archive(
        conn: &DatabaseConnection,
        queue: &str,
        msg: &LeasedMessage,
        error: &str,
    ) -> AppResult<()> {
        let txn = conn.begin().await?;
        Self::archive_row(
            &txn,
            queue,
            msg.msg_id,
            serde_json::to_value(&msg.job)?,
            msg.read_ct,
            error,
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn archive_row(
        txn: &sea_orm::DatabaseTransaction,
        queue: &str,
        msg_id: i64,
        payload: serde_json::Value,
        read_ct: i32,
        error: &str,
    ) -> AppResult<()> {
        let dead = dead_letter_message::ActiveModel {
            queue: Set(queue.to_string()),
            payload: Set(payload),
            read_ct: Set(read_ct),
            error: Set(Some(error.to_string())),
            dead_at: Set(util::now_fixed()),
            ..Default::default()
        };
        DeadLetterMessage::insert(dead).exec(txn).await?;
        QueueMessage::delete_many()
            .filter(queue_message::Column::Queue.eq(queue))
            .filter(queue_message::Column::MsgId.eq(msg_id))
            .exec(txn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_routes_to_its_queue() {
        let import = Job::ImportFetch {
            workspace_id: 1,
            job_id: None,
            sleep_ms: None,
        };
        assert_eq!(import.queue(), QUEUE_IMPORT_FETCH);
        assert_eq!(
            Job::Draft {
                workspace_id: 1,
                message_id: 9
            }
            .queue(),
            QUEUE_DRAFT
        );
    }

    #[test]
    fn test_job_payload_is_tagged() {
        let job = Job::ImportFetch {
            workspace_id: 7,
            job_id: Some(3),
            sleep_ms: Some(1500),
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["kind"], "import_fetch");

        let back: Job = serde_json::from_value(value).unwrap();
        match back {
            Job::ImportFetch {
                workspace_id,
                job_id,
                sleep_ms,
            } => {
                assert_eq!(workspace_id, 7);
                assert_eq!(job_id, Some(3));
                assert_eq!(sleep_ms, Some(1500));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let raw = serde_json::json!({"kind": "compact_disks", "workspace_id": 1});
        assert!(serde_json::from_value::<Job>(raw).is_err());
    }
}
