//! Mailbox provider webhook: the single-event fast path.
//!
//! Everything answers HTTP 200 with the same body. A bad signature, an
//! unknown account id and a processed event are indistinguishable from the
//! outside, so the endpoint cannot be used to enumerate valid account ids.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use lib_utils::sig;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    mailbox::{MailboxClient, MailboxMessage},
    model::{
        conversation::ConversationCtrl,
        customer::CustomerCtrl,
        message::{MessageCtrl, NewMessage},
        queue::{Job, QueueCtrl},
        sender_rule::extract_address,
        staging_message::Direction,
        workspace::WorkspaceCtrl,
    },
    server_config::{mailbox_api_token, webhook_secret},
    ServerState,
};

const SIGNATURE_HEADER: &str = "x-aurinko-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    pub validation_token: Option<String>,
}

/// Subscription handshake: echo the validation token back as plain text.
pub async fn handshake(Query(params): Query<HandshakeParams>) -> String {
    params.validation_token.unwrap_or_else(|| "OK".to_string())
}

pub async fn receive(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let accepted = Json(json!({ "success": true }));

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !sig::verify_hmac_sha256(webhook_secret().as_bytes(), &body, signature) {
        tracing::warn!("webhook signature rejected");
        return accepted;
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        tracing::warn!("webhook body is not JSON");
        return accepted;
    };

    let Some(event) = parse_event(&payload) else {
        tracing::warn!("webhook body has no recognizable event shape");
        return accepted;
    };

    // Processing is detached from the response so every request answers
    // with the same status, shape and latency.
    tokio::spawn(async move {
        if let Err(e) = process_event(&state, event).await {
            tracing::error!("webhook processing failed: {:?}", e);
        }
    });

    accepted
}

/// Parsed webhook event: which account, which message resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub account_id: String,
    pub resources: Vec<String>,
}

/// Accept both wire shapes: the legacy single-notification body and the
/// batched subscription body.
pub fn parse_event(payload: &Value) -> Option<WebhookEvent> {
    // Batched: {"payloads": [{"changeType": ..., "resource": ...}],
    //           "subscription": {"accountId": ...}}
    if let Some(payloads) = payload.get("payloads").and_then(|v| v.as_array()) {
        let account_id = payload
            .get("subscription")?
            .get("accountId")?
            .as_str()?
            .to_string();
        let resources = payloads
            .iter()
            .filter_map(|p| p.get("resource").and_then(|r| r.as_str()))
            .map(String::from)
            .collect();
        return Some(WebhookEvent {
            account_id,
            resources,
        });
    }

    // Legacy: {"notification": ..., "resource": ..., "accountId": ...}
    if payload.get("notification").is_some() || payload.get("resource").is_some() {
        let account_id = payload.get("accountId")?.as_str()?.to_string();
        let resources = payload
            .get("resource")
            .and_then(|r| r.as_str())
            .map(|r| vec![r.to_string()])
            .unwrap_or_default();
        return Some(WebhookEvent {
            account_id,
            resources,
        });
    }

    None
}

async fn process_event(state: &ServerState, event: WebhookEvent) -> anyhow::Result<()> {
    let Some(workspace) =
        WorkspaceCtrl::by_provider_account_id(&state.conn, &event.account_id).await?
    else {
        // Unknown account: drop silently, the caller already got its 200.
        tracing::info!("webhook for unknown account id, ignoring");
        return Ok(());
    };

    let client = MailboxClient::new(state.http_client.clone(), mailbox_api_token());
    for resource in &event.resources {
        let message = match client.get_message(resource).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(resource, "webhook message fetch failed: {}", e);
                continue;
            }
        };
        if let Err(e) = ingest_message(state, &workspace, &message).await {
            tracing::warn!(resource, "webhook ingest failed: {:?}", e);
        }
    }

    Ok(())
}

/// The single-event mirror of the batch path: race-safe upserts keyed on
/// stable external ids, then a fire-and-forget draft trigger.
async fn ingest_message(
    state: &ServerState,
    workspace: &entity::workspace::Model,
    message: &MailboxMessage,
) -> anyhow::Result<()> {
    let conn = &state.conn;

    let from = message.from.as_deref().map(extract_address);
    let direction = match &from {
        Some(addr) if addr.eq_ignore_ascii_case(&workspace.owner_email) => Direction::Outbound,
        _ => Direction::Inbound,
    };

    let counterparty = match direction {
        Direction::Inbound => from.clone(),
        Direction::Outbound => message.to.as_deref().map(extract_address),
    };
    let Some(counterparty) = counterparty.filter(|a| a.contains('@')) else {
        tracing::info!("webhook message without usable counterparty, skipping");
        return Ok(());
    };

    let customer =
        CustomerCtrl::find_or_create(conn, workspace.id, &counterparty, None).await?;

    let thread_id = message
        .thread_id
        .clone()
        .unwrap_or_else(|| format!("msg-{}", message.id));
    let conversation = ConversationCtrl::find_or_create(
        conn,
        workspace.id,
        customer.id,
        &thread_id,
        message.subject.as_deref(),
    )
    .await?;

    let stored = MessageCtrl::insert(
        conn,
        NewMessage {
            workspace_id: workspace.id,
            conversation_id: conversation.id,
            external_id: message.id.clone(),
            direction,
            from_address: message.from.clone(),
            subject: message.subject.clone(),
            body: message.body.clone().or_else(|| message.snippet.clone()),
            received_at: message.received_at,
        },
    )
    .await?;
    ConversationCtrl::touch(conn, conversation.id).await?;

    if direction == Direction::Inbound {
        QueueCtrl::send(
            &state.conn,
            &Job::Draft {
                workspace_id: workspace.id,
                message_id: stored.id,
            },
            0,
        )
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_shape() {
        let body = json!({
            "notification": "messageCreated",
            "resource": "msg-123",
            "accountId": "acct-9"
        });
        let event = parse_event(&body).unwrap();
        assert_eq!(event.account_id, "acct-9");
        assert_eq!(event.resources, vec!["msg-123"]);
    }

    #[test]
    fn test_parse_batched_shape() {
        let body = json!({
            "payloads": [
                { "changeType": "created", "resource": "m-1" },
                { "changeType": "created", "resource": "m-2" }
            ],
            "subscription": { "accountId": "acct-4" }
        });
        let event = parse_event(&body).unwrap();
        assert_eq!(event.account_id, "acct-4");
        assert_eq!(event.resources, vec!["m-1", "m-2"]);
    }

    #[test]
    fn test_parse_rejects_unrelated_json() {
        assert!(parse_event(&json!({"hello": "world"})).is_none());
        assert!(parse_event(&json!({"payloads": []})).is_none());
    }

    #[test]
    fn test_legacy_without_resource_still_resolves_account() {
        let body = json!({ "notification": "ping", "accountId": "acct-1" });
        let event = parse_event(&body).unwrap();
        assert!(event.resources.is_empty());
    }
}
