//! Voice learning: summarize the owner's writing voice from their own
//! outbound mail. One model call per run, profile upserted per workspace.

use crate::{
    error::AppResult,
    llm::{self, extract},
    model::{
        staging_message::StagingMessageCtrl,
        voice_profile::{VoiceProfileCtrl, VoiceSummary},
    },
    prompt,
    server_config::cfg,
    ServerState,
};

pub async fn run_voice_learn(state: &ServerState, workspace_id: i32) -> AppResult<()> {
    let samples = StagingMessageCtrl::outbound_samples(
        &state.conn,
        workspace_id,
        cfg.pipeline.voice_sample_size,
    )
    .await?;

    if samples.is_empty() {
        tracing::info!(workspace_id, "no outbound samples, skipping voice learning");
        return Ok(());
    }

    let bodies: Vec<String> = samples
        .iter()
        .filter_map(|m| m.body.clone())
        .collect();
    let sample_count = bodies.len() as i32;

    let reply = llm::send_chat_prompt(
        &state.http_client,
        &state.rate_limiters,
        &prompt::voice_system_prompt(),
        &prompt::voice_user_prompt(&bodies),
    )
    .await?;

    let Some(obj) = extract::extract_json_object(&reply.content) else {
        tracing::warn!(workspace_id, "unparseable voice reply, keeping prior profile");
        return Ok(());
    };

    let summary = VoiceSummary {
        tone: obj.get("tone").and_then(|v| v.as_str()).map(String::from),
        style_notes: obj
            .get("style_notes")
            .and_then(|v| v.as_str())
            .map(String::from),
        common_phrases: obj.get("common_phrases").filter(|v| v.is_array()).cloned(),
        sample_count,
    };

    VoiceProfileCtrl::upsert(&state.conn, workspace_id, summary).await?;
    tracing::info!(workspace_id, sample_count, "voice profile updated");
    Ok(())
}
