//! FAQ consolidator: filter → dedup → adapt, as one relay chain.
//!
//! Unlike the importer, the accumulator between hops lives in the relay
//! payload itself, not in a table: zero schema overhead, at the cost that a
//! broken chain loses the in-flight accumulator. The payload shape is
//! phase-specific and tagged, so a hop can never misread another phase's
//! carried data.

use serde::{Deserialize, Serialize};

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
    llm,
    model::{
        faq::{AdaptedRow, FaqCtrl},
        voice_profile::VoiceProfileCtrl,
        workspace::WorkspaceCtrl,
    },
    prompt,
    server_config::cfg,
    ServerState,
};

use super::{
    relay::{Relay, CONSOLIDATE_PATH},
    TimeBudget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Filter,
    Dedup,
    Adapt,
    AdaptContinue,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Filter
    }
}

/// Cross-hop accumulator. Tagged so the shape always travels with the
/// data; a hop interprets it against its phase and rejects mismatches
/// instead of guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum Carried {
    #[default]
    None,
    /// Filter's kept-id accumulator. The verdicts are already durable on
    /// the FAQ rows; this travels for observability of the chain.
    KeptIds(Vec<i32>),
    /// Dedup's working set of canonical topics.
    Topics(Vec<AdaptedRow>),
    /// Adapt's output so far plus the topics still to process.
    Adapting {
        done: Vec<AdaptedRow>,
        remaining: Vec<AdaptedRow>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateRequest {
    pub workspace_id: i32,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub chunk_index: u64,
    #[serde(default)]
    pub carried: Carried,
    /// Diagnostic only; grows without bound across a chain.
    #[serde(default)]
    pub relay_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidateOutcome {
    Relayed,
    Completed,
}

pub async fn run_consolidate(
    state: &ServerState,
    req: ConsolidateRequest,
) -> AppResult<ConsolidateOutcome> {
    let budget = TimeBudget::start();
    let relay = Relay::new(state.http_client.clone());
    let workspace = WorkspaceCtrl::by_id(&state.conn, req.workspace_id).await?;

    tracing::info!(
        workspace_id = workspace.id,
        phase = ?req.phase,
        chunk_index = req.chunk_index,
        relay_depth = req.relay_depth,
        "consolidation hop"
    );

    match req.phase {
        Phase::Filter => run_filter(state, &workspace, req, &budget, &relay).await,
        Phase::Dedup => run_dedup(state, &workspace, req, &budget, &relay).await,
        Phase::Adapt | Phase::AdaptContinue => {
            run_adapt(state, &workspace, req, &budget, &relay).await
        }
    }
}

// ============================================================================
// Phase 1: filter
// ============================================================================

async fn run_filter(
    state: &ServerState,
    workspace: &workspace::Model,
    req: ConsolidateRequest,
    budget: &TimeBudget,
    relay: &Relay,
) -> AppResult<ConsolidateOutcome> {
    let mut kept_ids = match req.carried.clone() {
        Carried::KeptIds(ids) => ids,
        Carried::None => Vec::new(),
        other => return Err(carried_mismatch(Phase::Filter, &other)),
    };
    let conn = &state.conn;
    let chunk_size = cfg.pipeline.consolidate_chunk_size as u64;
    let mut chunk_index = req.chunk_index;

    loop {
        let chunk = FaqCtrl::unfiltered_chunk(conn, workspace.id, chunk_size).await?;
        if chunk.is_empty() {
            break;
        }

        if budget.expired() {
            // Verdicts so far are already durable on the rows; the baton
            // carries position plus the running kept set.
            relay_next(
                relay,
                workspace.id,
                Phase::Filter,
                chunk_index,
                Carried::KeptIds(kept_ids),
                &req,
            );
            return Ok(ConsolidateOutcome::Relayed);
        }

        let rows: Vec<(i32, &str, &str)> = chunk
            .iter()
            .map(|f| (f.id, f.question.as_str(), f.answer.as_str()))
            .collect();
        let system = prompt::faq_filter_system_prompt(
            &workspace.business_name,
            workspace.business_type.as_deref().unwrap_or("small business"),
            workspace.services.as_deref().unwrap_or(""),
        );
        let user = prompt::faq_filter_user_prompt(&rows);

        let chunk_ids: Vec<i32> = chunk.iter().map(|f| f.id).collect();
        let kept = match llm::send_chat_prompt(&state.http_client, &state.rate_limiters, &system, &user)
            .await
        {
            Ok(reply) => prompt::parse_kept_ids(&reply.content).unwrap_or_else(|| {
                tracing::warn!("unparseable filter reply, keeping whole chunk");
                chunk_ids.clone()
            }),
            Err(e) => {
                // Keeping everything is the safe degradation; dedup gets
                // another look at these.
                tracing::warn!("filter call failed, keeping whole chunk: {}", e);
                chunk_ids.clone()
            }
        };

        FaqCtrl::mark_relevance(conn, workspace.id, &chunk_ids, &kept).await?;
        kept_ids.extend(&kept);
        chunk_index += 1;
        tracing::info!(
            workspace_id = workspace.id,
            chunk_index,
            kept = kept.len(),
            dropped = chunk_ids.len() - kept.len(),
            "filter chunk done"
        );
    }

    relay_next(relay, workspace.id, Phase::Dedup, 0, Carried::Topics(Vec::new()), &req);
    Ok(ConsolidateOutcome::Relayed)
}

// ============================================================================
// Phase 2: dedup
// ============================================================================

async fn run_dedup(
    state: &ServerState,
    workspace: &workspace::Model,
    req: ConsolidateRequest,
    budget: &TimeBudget,
    relay: &Relay,
) -> AppResult<ConsolidateOutcome> {
    let mut topics = match req.carried.clone() {
        Carried::Topics(topics) => topics,
        Carried::None => Vec::new(),
        other => return Err(carried_mismatch(Phase::Dedup, &other)),
    };

    let conn = &state.conn;
    let chunk_size = cfg.pipeline.consolidate_chunk_size as u64;
    let mut chunk_index = req.chunk_index;

    loop {
        let chunk = FaqCtrl::relevant_page(conn, workspace.id, chunk_index * chunk_size, chunk_size)
            .await?;
        if chunk.is_empty() {
            break;
        }

        if budget.expired() {
            relay_next(
                relay,
                workspace.id,
                Phase::Dedup,
                chunk_index,
                Carried::Topics(topics),
                &req,
            );
            return Ok(ConsolidateOutcome::Relayed);
        }

        let rows: Vec<(i32, &str, &str)> = chunk
            .iter()
            .map(|f| (f.id, f.question.as_str(), f.answer.as_str()))
            .collect();
        let system = prompt::faq_dedup_system_prompt();
        let user = prompt::faq_dedup_user_prompt(&topics, &rows);

        match llm::send_chat_prompt(&state.http_client, &state.rate_limiters, &system, &user).await {
            Ok(reply) => match prompt::parse_topics(&reply.content) {
                Some(merged) if !merged.is_empty() => topics = merged,
                _ => {
                    tracing::warn!("unparseable dedup reply, appending chunk verbatim");
                    append_chunk_as_topics(&mut topics, &chunk);
                }
            },
            Err(e) => {
                tracing::warn!("dedup call failed, appending chunk verbatim: {}", e);
                append_chunk_as_topics(&mut topics, &chunk);
            }
        }

        chunk_index += 1;
        tracing::info!(
            workspace_id = workspace.id,
            chunk_index,
            topics = topics.len(),
            "dedup chunk done"
        );
    }

    relay_next(
        relay,
        workspace.id,
        Phase::Adapt,
        0,
        Carried::Adapting {
            done: Vec::new(),
            remaining: topics,
        },
        &req,
    );
    Ok(ConsolidateOutcome::Relayed)
}

fn append_chunk_as_topics(topics: &mut Vec<AdaptedRow>, chunk: &[competitor_faq::Model]) {
    for faq in chunk {
        topics.push(AdaptedRow {
            topic: slugify(&faq.question),
            question: faq.question.clone(),
            answer: faq.answer.clone(),
        });
    }
}

// ============================================================================
// Phase 3: adapt
// ============================================================================

async fn run_adapt(
    state: &ServerState,
    workspace: &workspace::Model,
    req: ConsolidateRequest,
    budget: &TimeBudget,
    relay: &Relay,
) -> AppResult<ConsolidateOutcome> {
    let (mut done, remaining) = match req.carried.clone() {
        Carried::Adapting { done, remaining } => (done, remaining),
        other => return Err(carried_mismatch(req.phase, &other)),
    };

    let conn = &state.conn;
    let owner_questions = FaqCtrl::owner_questions(conn, workspace.id).await?;
    let voice = VoiceProfileCtrl::for_workspace(conn, workspace.id).await?;
    let system = prompt::faq_adapt_system_prompt(
        &workspace.business_name,
        workspace.services.as_deref().unwrap_or(""),
        voice.as_ref().and_then(|v| v.tone.as_deref()),
        voice.as_ref().and_then(|v| v.style_notes.as_deref()),
    );

    let mut queue = remaining.into_iter();
    while let Some(topic) = queue.next() {
        // Topics the owner already answers are skipped, not rewritten.
        if topic_covered(&topic.question, &owner_questions) {
            tracing::debug!(topic = %topic.topic, "owner already covers topic, skipping");
            continue;
        }

        if budget.expired() {
            let mut remaining: Vec<AdaptedRow> = vec![topic];
            remaining.extend(queue);
            relay_next(
                relay,
                workspace.id,
                Phase::AdaptContinue,
                req.chunk_index,
                Carried::Adapting { done, remaining },
                &req,
            );
            return Ok(ConsolidateOutcome::Relayed);
        }

        let user = format!("Q: {}\nA: {}", topic.question, topic.answer);
        match llm::send_chat_prompt(&state.http_client, &state.rate_limiters, &system, &user).await {
            Ok(reply) => match prompt::parse_adapted(&reply.content, &topic.topic) {
                Some(row) => done.push(row),
                None => {
                    tracing::warn!(topic = %topic.topic, "unparseable adapt reply, keeping original");
                    done.push(topic);
                }
            },
            Err(e) => {
                tracing::warn!(topic = %topic.topic, "adapt call failed, keeping original: {}", e);
                done.push(topic);
            }
        }
    }

    // Delete-then-insert keeps re-runs idempotent: the workspace's adapted
    // set is replaced wholesale, never appended to.
    let written = FaqCtrl::replace_adapted(conn, workspace.id, done).await?;
    tracing::info!(
        workspace_id = workspace.id,
        written,
        relay_depth = req.relay_depth,
        "consolidation complete"
    );
    Ok(ConsolidateOutcome::Completed)
}

/// Loose containment check on normalized words; errs toward rewriting
/// rather than skipping when in doubt.
fn topic_covered(question: &str, owner_questions: &[String]) -> bool {
    let needle = normalize(question);
    owner_questions.iter().any(|owned| {
        let owned = normalize(owned);
        owned == needle || owned.contains(&needle) || needle.contains(&owned)
    })
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn slugify(s: &str) -> String {
    normalize(s)
        .split_whitespace()
        .take(5)
        .collect::<Vec<_>>()
        .join("-")
}

// ============================================================================
// Shared
// ============================================================================

fn relay_next(
    relay: &Relay,
    workspace_id: i32,
    phase: Phase,
    chunk_index: u64,
    carried: Carried,
    req: &ConsolidateRequest,
) {
    relay.fire(
        CONSOLIDATE_PATH,
        &ConsolidateRequest {
            workspace_id,
            phase,
            chunk_index,
            carried,
            relay_depth: req.relay_depth + 1,
        },
    );
}

fn carried_mismatch(phase: Phase, carried: &Carried) -> AppError {
    AppError::BadRequest(format!(
        "carried payload {:?} does not belong to phase {:?}",
        std::mem::discriminant(carried),
        phase
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_to_filter_start() {
        let req: ConsolidateRequest =
            serde_json::from_str(r#"{"workspace_id": 3}"#).unwrap();
        assert_eq!(req.phase, Phase::Filter);
        assert_eq!(req.chunk_index, 0);
        assert_eq!(req.carried, Carried::None);
        assert_eq!(req.relay_depth, 0);
    }

    #[test]
    fn test_carried_round_trip_is_tagged() {
        let carried = Carried::Adapting {
            done: vec![AdaptedRow {
                topic: "hours".to_string(),
                question: "When are you open?".to_string(),
                answer: "Weekdays.".to_string(),
            }],
            remaining: vec![],
        };
        let req = ConsolidateRequest {
            workspace_id: 1,
            phase: Phase::AdaptContinue,
            chunk_index: 2,
            carried,
            relay_depth: 5,
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["phase"], "adapt_continue");
        assert_eq!(value["carried"]["shape"], "adapting");

        let back: ConsolidateRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back.phase, Phase::AdaptContinue);
        match back.carried {
            Carried::Adapting { done, remaining } => {
                assert_eq!(done.len(), 1);
                assert!(remaining.is_empty());
            }
            other => panic!("wrong carried shape: {:?}", other),
        }
    }

    #[test]
    fn test_kept_ids_round_trip() {
        let req = ConsolidateRequest {
            workspace_id: 1,
            phase: Phase::Filter,
            chunk_index: 1,
            carried: Carried::KeptIds(vec![3, 17]),
            relay_depth: 1,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["carried"]["shape"], "kept_ids");
        let back: ConsolidateRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back.carried, Carried::KeptIds(vec![3, 17]));
    }

    #[test]
    fn test_topic_covered_normalizes() {
        let owned = vec!["What are your opening hours?".to_string()];
        assert!(topic_covered("what are your opening hours", &owned));
        assert!(topic_covered("Opening hours?", &owned));
        assert!(!topic_covered("Do you take card payments?", &owned));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Do you offer weekend delivery at all?"),
            "do-you-offer-weekend-delivery"
        );
    }
}
