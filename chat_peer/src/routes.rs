// rsa_handshake_chat/chat_peer/src/routes.rs

//! HTTP surface of a chat party.
//!
//! Routes only translate between JSON and the handshake coordinator; every
//! decision about trust lives in `shared_crypto`.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_crypto::{
    EncryptedChatMessage, Error, HandshakeRequest, PeerTransport, PublicKey,
    RegisterWebhookRequest, StatusResponse, WebhookCallback,
};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::{AppState, ChatMessage};

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router<T: PeerTransport + 'static>(state: AppState<T>) -> Router {
    Router::new()
        .route("/public_key", get(public_key::<T>))
        .route("/handshake", post(handshake::<T>))
        .route("/init_handshake", post(init_handshake::<T>))
        .route("/register_webhook", post(register_webhook::<T>))
        .route("/webhook_callback", post(webhook_callback::<T>))
        .route("/send", post(send::<T>))
        .route("/receive", post(receive::<T>))
        .route("/messages", get(messages::<T>))
        .route("/health", get(health::<T>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub text: String,
    #[serde(default)]
    pub peer: Option<String>,
}

/// GET /public_key
async fn public_key<T: PeerTransport>(State(state): State<AppState<T>>) -> Json<PublicKey> {
    Json(state.coordinator.public_key().clone())
}

/// POST /handshake
/// Body: { "nonce": "4821", "signature": "...", "partner_key_url": "...", "webhook_url": "..." }
async fn handshake<T: PeerTransport>(
    State(state): State<AppState<T>>,
    ApiJson(request): ApiJson<HandshakeRequest>,
) -> ApiResult<StatusResponse> {
    let peer = state.coordinator.resolve_peer(request.sender.as_deref())?;
    state.coordinator.accept_handshake(&peer, request).await?;
    Ok(Json(StatusResponse::new("authenticated")))
}

/// POST /init_handshake
/// Challenges the partner, then fetches and trusts its public key.
async fn init_handshake<T: PeerTransport>(
    State(state): State<AppState<T>>,
) -> ApiResult<StatusResponse> {
    let peer = state.coordinator.resolve_peer(None)?;
    state.coordinator.authenticate(&peer).await?;
    Ok(Json(StatusResponse::new("authenticated")))
}

/// POST /register_webhook
/// Body: { "webhook_url": "http://localhost:5001/webhook_callback" }
async fn register_webhook<T: PeerTransport>(
    State(state): State<AppState<T>>,
    ApiJson(request): ApiJson<RegisterWebhookRequest>,
) -> ApiResult<StatusResponse> {
    let peer = state.coordinator.resolve_peer(request.sender.as_deref())?;
    state
        .coordinator
        .register_webhook(&peer, &request.webhook_url)
        .await?;
    Ok(Json(StatusResponse::new("webhook registered")))
}

/// POST /webhook_callback
async fn webhook_callback<T: PeerTransport>(
    State(state): State<AppState<T>>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<StatusResponse> {
    if body.get("signature").is_none() {
        return Err(Error::InvalidInput("missing signature".into()).into());
    }
    let callback: WebhookCallback = serde_json::from_value(body)
        .map_err(|e| Error::InvalidInput(format!("malformed webhook callback: {e}")))?;
    let peer = state.coordinator.resolve_peer(callback.sender.as_deref())?;
    state
        .coordinator
        .verify_webhook_notification(&peer, &callback.signature)
        .await?;
    tracing::info!(peer = %peer, event = callback.event.as_deref().unwrap_or("-"), "webhook notification authenticated");
    Ok(Json(StatusResponse::new("ok")))
}

/// POST /send
/// Body: { "text": "hello" }
async fn send<T: PeerTransport>(
    State(state): State<AppState<T>>,
    ApiJson(request): ApiJson<SendRequest>,
) -> ApiResult<StatusResponse> {
    let peer = state.coordinator.resolve_peer(request.peer.as_deref())?;
    state.coordinator.send_message(&peer, &request.text).await?;
    Ok(Json(StatusResponse::new("ok")))
}

/// POST /receive
/// Body: { "text": ["123", "456", ...], "sender": "bob" }
async fn receive<T: PeerTransport>(
    State(state): State<AppState<T>>,
    ApiJson(message): ApiJson<EncryptedChatMessage>,
) -> ApiResult<Value> {
    let peer = state.coordinator.resolve_peer(message.sender.as_deref())?;
    let text = state.coordinator.decrypt_incoming(&message.text)?;
    tracing::info!(peer = %peer, symbols = message.text.len(), "message received");

    state.record_message(peer.clone(), text).await;
    state.coordinator.notify_webhook(&peer).await;

    Ok(Json(json!({
        "status": "ok",
        "message": "message received and webhook notified",
    })))
}

/// GET /messages
async fn messages<T: PeerTransport>(State(state): State<AppState<T>>) -> Json<Vec<ChatMessage>> {
    Json(state.messages.read().await.clone())
}

/// GET /health
async fn health<T: PeerTransport>(State(state): State<AppState<T>>) -> ApiResult<Value> {
    let mut peers = Vec::new();
    for id in state.coordinator.peer_ids() {
        let peer_state = state.coordinator.peer_state(id).await?;
        peers.push(json!({ "id": id, "state": peer_state }));
    }
    Ok(Json(json!({
        "status": "ok",
        "name": state.coordinator.local_id(),
        "covers_unicode": state.coordinator.covers_unicode(),
        "peers": peers,
    })))
}
