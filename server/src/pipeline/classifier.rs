//! Bulk classifier.
//!
//! Drains staging rows with no category in capped chunks. Sender rules
//! classify deterministically first; whatever remains goes to the model in
//! one batched call per chunk. Rows the reply loses are marked `unknown`
//! instead of failing the chunk. The stage self-chains until the staging
//! table is drained, then hands off to voice learning.

use serde::{Deserialize, Serialize};

use crate::{
    db_core::prelude::*,
    error::AppResult,
    llm,
    model::{
        import_job::{ImportJobCtrl, JobStatus},
        queue::{Job, QueueCtrl},
        sender_rule::SenderRules,
        staging_message::{Classification, ClassifiedBy, Direction, StagingMessageCtrl},
    },
    prompt,
    server_config::cfg,
    ServerState,
};

use super::relay::{Relay, CLASSIFY_PATH};

pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Categories that never warrant a reply, regardless of what the model
/// said about them.
const NO_REPLY_CATEGORIES: &[&str] = &["notification", "spam"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub workspace_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyOutcome {
    /// Chunk processed, more rows remain; relayed to a fresh invocation.
    Relayed,
    /// Staging table drained; voice learning queued.
    Drained,
}

pub async fn run_classify(state: &ServerState, req: ClassifyRequest) -> AppResult<ClassifyOutcome> {
    let conn = &state.conn;
    let workspace_id = req.workspace_id;

    let chunk =
        StagingMessageCtrl::fetch_unclassified(conn, workspace_id, cfg.pipeline.classify_chunk_size)
            .await?;

    if !chunk.is_empty() {
        let rules = SenderRules::for_workspace(conn, workspace_id).await?;
        let updates = classify_chunk(state, &chunk, &rules).await?;
        let applied = StagingMessageCtrl::apply_classifications(conn, updates).await?;
        tracing::info!(workspace_id, applied, "classified chunk");
    }

    let remaining = StagingMessageCtrl::count_unclassified(conn, workspace_id).await?;
    if remaining > 0 {
        tracing::info!(workspace_id, remaining, "more rows to classify, relaying");
        let relay = Relay::new(state.http_client.clone());
        relay.fire(CLASSIFY_PATH, &ClassifyRequest { workspace_id });
        return Ok(ClassifyOutcome::Relayed);
    }

    if let Some(job) = ImportJobCtrl::for_workspace(conn, workspace_id).await? {
        ImportJobCtrl::set_status(conn, job.id, JobStatus::Completed).await?;
    }
    QueueCtrl::send(conn, &Job::VoiceLearn { workspace_id }, 0).await?;
    tracing::info!(workspace_id, "classification drained, voice learning queued");

    Ok(ClassifyOutcome::Drained)
}

/// Classify one chunk: deterministic sender rules first, one batched model
/// call for the rest, `unknown` fallback for anything the reply lost.
async fn classify_chunk(
    state: &ServerState,
    chunk: &[staging_message::Model],
    rules: &SenderRules,
) -> AppResult<Vec<(i32, Classification)>> {
    let mut updates: Vec<(i32, Classification)> = Vec::with_capacity(chunk.len());
    let mut for_model: Vec<&staging_message::Model> = Vec::new();

    for row in chunk {
        let matched = row
            .from_address
            .as_deref()
            .and_then(|from| rules.match_sender(from));

        match matched {
            Some(rule) => {
                let direction = row_direction(row);
                updates.push((
                    row.id,
                    finalize(
                        direction,
                        rule.category.clone(),
                        rule.requires_reply,
                        1.0,
                        None,
                        ClassifiedBy::Rule,
                    ),
                ));
            }
            None => for_model.push(row),
        }
    }

    if for_model.is_empty() {
        return Ok(updates);
    }

    let lines: Vec<String> = for_model
        .iter()
        .enumerate()
        .map(|(index, row)| {
            prompt::classification_batch_line(
                index,
                row_direction(row),
                row.from_address.as_deref(),
                row.subject.as_deref(),
                row.snippet.as_deref().or(row.body.as_deref()),
            )
        })
        .collect();

    let system_prompt = prompt::classification_system_prompt();
    let reply = llm::send_chat_prompt(
        &state.http_client,
        &state.rate_limiters,
        &system_prompt,
        &lines.join("\n"),
    )
    .await;

    let items = match reply {
        Ok(reply) => prompt::parse_classification_reply(&reply.content),
        Err(e) => {
            tracing::warn!("classification call failed, marking chunk unknown: {}", e);
            Vec::new()
        }
    };

    let mut by_index = vec![None; for_model.len()];
    for item in items {
        let index = item.index;
        if index < by_index.len() {
            by_index[index] = Some(item);
        }
    }

    for (row, item) in for_model.iter().zip(by_index.into_iter()) {
        let direction = row_direction(row);
        let classification = match item {
            Some(item) => finalize(
                direction,
                item.category,
                item.requires_reply,
                item.confidence,
                item.entities,
                ClassifiedBy::Model,
            ),
            // The model skipped or mangled this line; degrade, don't abort.
            None => finalize(
                direction,
                UNKNOWN_CATEGORY.to_string(),
                false,
                0.0,
                None,
                ClassifiedBy::Fallback,
            ),
        };
        updates.push((row.id, classification));
    }

    Ok(updates)
}

fn row_direction(row: &staging_message::Model) -> Direction {
    row.direction.parse().unwrap_or(Direction::Inbound)
}

/// Edge-case policy in one place: outbound mail and no-reply categories are
/// never reply-worthy, low confidence flags the row for review.
fn finalize(
    direction: Direction,
    category: String,
    requires_reply: bool,
    confidence: f32,
    entities: Option<serde_json::Value>,
    classified_by: ClassifiedBy,
) -> Classification {
    let requires_reply = requires_reply
        && direction != Direction::Outbound
        && !NO_REPLY_CATEGORIES.contains(&category.as_str());

    let needs_review = match classified_by {
        ClassifiedBy::Rule => false,
        ClassifiedBy::Model => confidence < cfg.model.confidence_threshold,
        ClassifiedBy::Fallback => true,
    };

    Classification {
        category,
        requires_reply,
        confidence,
        entities,
        needs_review,
        classified_by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_never_requires_reply() {
        let c = finalize(
            Direction::Outbound,
            "inquiry".to_string(),
            true,
            0.99,
            None,
            ClassifiedBy::Model,
        );
        assert!(!c.requires_reply);
    }

    #[test]
    fn test_no_reply_categories_forced_false() {
        for category in ["notification", "spam"] {
            let c = finalize(
                Direction::Inbound,
                category.to_string(),
                true,
                0.99,
                None,
                ClassifiedBy::Model,
            );
            assert!(!c.requires_reply, "{} should never require a reply", category);
        }
    }

    #[test]
    fn test_inbound_inquiry_keeps_reply_flag() {
        let c = finalize(
            Direction::Inbound,
            "inquiry".to_string(),
            true,
            0.9,
            None,
            ClassifiedBy::Model,
        );
        assert!(c.requires_reply);
    }

    #[test]
    fn test_rule_classifications_are_trusted() {
        let c = finalize(
            Direction::Inbound,
            "newsletter".to_string(),
            false,
            1.0,
            None,
            ClassifiedBy::Rule,
        );
        assert!(!c.needs_review);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_fallback_rows_are_flagged() {
        let c = finalize(
            Direction::Inbound,
            UNKNOWN_CATEGORY.to_string(),
            false,
            0.0,
            None,
            ClassifiedBy::Fallback,
        );
        assert!(c.needs_review);
        assert_eq!(c.category, UNKNOWN_CATEGORY);
    }
}
