//! Staging table access: idempotent ingest plus classification updates.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{db_core::prelude::*, error::AppResult, server_config::cfg, util};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// How a row got its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ClassifiedBy {
    Rule,
    Model,
    Fallback,
}

/// Normalized message ready for the staging upsert.
#[derive(Debug, Clone)]
pub struct NewStagingMessage {
    pub workspace_id: i32,
    pub external_id: String,
    pub thread_id: Option<String>,
    pub direction: Direction,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub received_at: Option<DateTimeWithTimeZone>,
}

/// Final classification for one staging row.
#[derive(Debug, Clone)]
pub struct Classification {
    pub category: String,
    pub requires_reply: bool,
    pub confidence: f32,
    pub entities: Option<serde_json::Value>,
    pub needs_review: bool,
    pub classified_by: ClassifiedBy,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectionCounts {
    pub outbound: i32,
    pub inbound: i32,
}

impl DirectionCounts {
    pub fn total(&self) -> i32 {
        self.outbound + self.inbound
    }
}

pub struct StagingMessageCtrl;

impl StagingMessageCtrl {
    /// Idempotent batch ingest: duplicates on `(workspace_id, external_id)`
    /// are silently dropped, so re-delivered pages are no-ops.
    pub async fn upsert_batch(
        conn: &DatabaseConnection,
        rows: Vec<NewStagingMessage>,
    ) -> AppResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let now = util::now_fixed();
        let active_models: Vec<staging_message::ActiveModel> = rows
            .into_iter()
            .map(|row| staging_message::ActiveModel {
                workspace_id: Set(row.workspace_id),
                external_id: Set(row.external_id),
                thread_id: Set(row.thread_id),
                direction: Set(row.direction.to_string()),
                from_address: Set(row.from_address),
                to_address: Set(row.to_address),
                subject: Set(row.subject),
                snippet: Set(row.snippet),
                body: Set(row.body),
                needs_review: Set(false),
                processing_status: Set("pending".to_string()),
                received_at: Set(row.received_at),
                created_at: Set(now),
                ..Default::default()
            })
            .collect();

        let insert = StagingMessage::insert_many(active_models).on_conflict(
            OnConflict::columns([
                staging_message::Column::WorkspaceId,
                staging_message::Column::ExternalId,
            ])
            .do_nothing()
            .to_owned(),
        );

        // Inserting a page where every row is a duplicate is still success.
        match insert.exec(conn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Authoritative per-folder counts, re-derived from the table rather
    /// than accumulated in memory.
    pub async fn direction_counts(
        conn: &DatabaseConnection,
        workspace_id: i32,
    ) -> AppResult<DirectionCounts> {
        let mut counts = DirectionCounts::default();
        for direction in [Direction::Outbound, Direction::Inbound] {
            let n = StagingMessage::find()
                .filter(staging_message::Column::WorkspaceId.eq(workspace_id))
                .filter(staging_message::Column::Direction.eq(direction.to_string()))
                .count(conn)
                .await? as i32;
            match direction {
                Direction::Outbound => counts.outbound = n,
                Direction::Inbound => counts.inbound = n,
            }
        }
        Ok(counts)
    }

    pub async fn fetch_unclassified(
        conn: &DatabaseConnection,
        workspace_id: i32,
        limit: u64,
    ) -> AppResult<Vec<staging_message::Model>> {
        let rows = StagingMessage::find()
            .filter(staging_message::Column::WorkspaceId.eq(workspace_id))
            .filter(staging_message::Column::Category.is_null())
            .order_by_asc(staging_message::Column::Id)
            .limit(limit)
            .all(conn)
            .await?;
        Ok(rows)
    }

    pub async fn count_unclassified(
        conn: &DatabaseConnection,
        workspace_id: i32,
    ) -> AppResult<u64> {
        let n = StagingMessage::find()
            .filter(staging_message::Column::WorkspaceId.eq(workspace_id))
            .filter(staging_message::Column::Category.is_null())
            .count(conn)
            .await?;
        Ok(n)
    }

    /// Apply classifications concurrently in bounded groups; a failed row
    /// is logged and skipped so one bad update cannot sink the chunk.
    pub async fn apply_classifications(
        conn: &DatabaseConnection,
        updates: Vec<(i32, Classification)>,
    ) -> AppResult<usize> {
        let mut applied = 0;
        for group in updates.chunks(cfg.pipeline.db_write_group) {
            let futs = group.iter().map(|(id, classification)| {
                let conn = conn.clone();
                let classification = classification.clone();
                let id = *id;
                async move {
                    let result = Self::apply_one(&conn, id, &classification).await;
                    if let Err(e) = &result {
                        tracing::warn!(id, "failed to store classification: {:?}", e);
                    }
                    result.is_ok()
                }
            });
            applied += join_all(futs).await.into_iter().filter(|ok| *ok).count();
        }
        Ok(applied)
    }

    async fn apply_one(
        conn: &DatabaseConnection,
        id: i32,
        classification: &Classification,
    ) -> AppResult<()> {
        let update = staging_message::ActiveModel {
            id: Set(id),
            category: Set(Some(classification.category.clone())),
            requires_reply: Set(Some(classification.requires_reply)),
            confidence: Set(Some(classification.confidence)),
            entities: Set(classification.entities.clone()),
            needs_review: Set(classification.needs_review),
            classified_by: Set(Some(classification.classified_by.to_string())),
            processing_status: Set("classified".to_string()),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(())
    }

    /// Voice-learning input: the owner's own outbound messages.
    pub async fn outbound_samples(
        conn: &DatabaseConnection,
        workspace_id: i32,
        limit: u64,
    ) -> AppResult<Vec<staging_message::Model>> {
        let rows = StagingMessage::find()
            .filter(staging_message::Column::WorkspaceId.eq(workspace_id))
            .filter(staging_message::Column::Direction.eq(Direction::Outbound.to_string()))
            .filter(staging_message::Column::Body.is_not_null())
            .order_by_desc(staging_message::Column::ReceivedAt)
            .limit(limit)
            .all(conn)
            .await?;
        Ok(rows)
    }
}
