// rsa_handshake_chat/chat_peer/src/lib.rs

// Modules of the chat party binary, exposed for integration tests.
pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod routes;
pub mod state;
pub mod transport;

pub use config::Args;
pub use error::ApiError;
pub use extract::ApiJson;
pub use routes::router;
pub use state::{AppState, ChatMessage};
pub use transport::HttpTransport;
