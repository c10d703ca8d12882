use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use ring::digest;
use serde::{Deserialize, Serialize};
use taskling_agent::AgentRuntime;
use tracing::info;

/// An inbound message from a messaging transport. `from` is whatever the
/// transport uses to address the sender (a phone number, a handle).
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct OutboundReply {
    pub reply: String,
}

/// Build the application router.
pub fn build_router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/message", post(receive_message))
        .with_state(runtime)
}

async fn health() -> &'static str {
    "ok"
}

async fn receive_message(
    State(runtime): State<Arc<AgentRuntime>>,
    Json(message): Json<InboundMessage>,
) -> Json<OutboundReply> {
    let user_id = hash_sender(&message.from);
    info!(user_id = %user_id, "webhook message received");

    // The raw sender address keys the conversation; the hash keys task
    // ownership, so the address never lands in the task rows.
    let reply = runtime
        .handle_user_message(&message.from, &user_id, &message.body)
        .await;

    Json(OutboundReply { reply })
}

/// Stable, non-reversible user id derived from the sender address.
pub fn hash_sender(sender: &str) -> String {
    let hash = digest::digest(&digest::SHA256, sender.as_bytes());
    let hex: String = hash
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::hash_sender;

    #[test]
    fn hash_is_stable_and_short() {
        let a = hash_sender("+15551234567");
        let b = hash_sender("+15551234567");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_senders_get_different_ids() {
        assert_ne!(hash_sender("+15551234567"), hash_sender("+15557654321"));
    }
}
