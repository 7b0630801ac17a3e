//! Reply drafting: conversation tail + voice profile + adapted FAQs in,
//! one reply body out, stored on the message row for the owner to review.

use crate::{
    error::{AppError, AppResult},
    llm,
    model::{
        faq::FaqCtrl,
        message::MessageCtrl,
        staging_message::Direction,
        voice_profile::VoiceProfileCtrl,
        workspace::WorkspaceCtrl,
    },
    prompt, ServerState,
};

const CONTEXT_MESSAGES: u64 = 6;
const MAX_FAQS_IN_PROMPT: usize = 12;

pub async fn run_draft(state: &ServerState, workspace_id: i32, message_id: i32) -> AppResult<()> {
    let conn = &state.conn;

    let message = MessageCtrl::by_id(conn, message_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("message {} not found", message_id)))?;
    let workspace = WorkspaceCtrl::by_id(conn, workspace_id).await?;
    let voice = VoiceProfileCtrl::for_workspace(conn, workspace_id).await?;

    let faqs: Vec<(String, String)> = FaqCtrl::adapted_for_workspace(conn, workspace_id)
        .await?
        .into_iter()
        .take(MAX_FAQS_IN_PROMPT)
        .map(|f| (f.question, f.answer))
        .collect();

    let tail = MessageCtrl::conversation_tail(conn, message.conversation_id, CONTEXT_MESSAGES)
        .await?;
    let thread: Vec<(Direction, String)> = tail
        .iter()
        .filter_map(|m| {
            let body = m.body.clone()?;
            let direction = m.direction.parse().unwrap_or(Direction::Inbound);
            Some((direction, body))
        })
        .collect();

    if thread.is_empty() {
        tracing::info!(message_id, "nothing to draft against, skipping");
        return Ok(());
    }

    let system = prompt::draft_system_prompt(
        &workspace.business_name,
        voice.as_ref().and_then(|v| v.tone.as_deref()),
        voice.as_ref().and_then(|v| v.style_notes.as_deref()),
        &faqs,
    );
    let user = prompt::draft_user_prompt(&thread);

    let reply = llm::send_chat_prompt(&state.http_client, &state.rate_limiters, &system, &user)
        .await?;
    let draft = reply.content.trim();
    if draft.is_empty() {
        return Err(anyhow::anyhow!("empty draft from model").into());
    }

    MessageCtrl::store_draft(conn, message_id, draft).await?;
    tracing::info!(workspace_id, message_id, "draft stored");
    Ok(())
}
