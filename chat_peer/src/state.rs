// rsa_handshake_chat/chat_peer/src/state.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_crypto::{HandshakeCoordinator, PeerId};
use tokio::sync::RwLock;

/// A decrypted message as shown to the local user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: PeerId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Shared handler state.
pub struct AppState<T> {
    pub coordinator: Arc<HandshakeCoordinator<T>>,
    pub messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl<T> AppState<T> {
    pub fn new(coordinator: HandshakeCoordinator<T>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn record_message(&self, sender: PeerId, text: String) {
        self.messages.write().await.push(ChatMessage {
            sender,
            text,
            timestamp: Utc::now(),
        });
    }
}

// Manual impl: `T` itself need not be `Clone`.
impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            messages: Arc::clone(&self.messages),
        }
    }
}
