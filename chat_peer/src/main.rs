// rsa_handshake_chat/chat_peer/src/main.rs

use anyhow::Context;
use clap::Parser;
use shared_crypto::{generate_key_pair, HandshakeCoordinator};

use chat_peer::{logging, router, AppState, Args, HttpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(logging::DEFAULT_FILTER, args.log_json);

    // 1. Generate our own RSA keys
    let range = args.key_range()?;
    let keys = tokio::task::spawn_blocking(move || generate_key_pair(range))
        .await
        .context("key generation task panicked")??;
    tracing::info!(
        name = %args.name,
        e = %keys.public().e,
        n = %keys.public().n,
        "RSA key pair generated"
    );
    if !keys.covers_unicode() {
        tracing::warn!(
            n = %keys.public().n,
            "modulus does not cover every Unicode code point; some text cannot be sent"
        );
    }

    // 2. Wire the coordinator to the designated partner
    let transport = HttpTransport::new().context("failed to build HTTP client")?;
    let peer = args.peer_config();
    tracing::info!(peer = %peer.id, url = %args.peer_url, "designated partner configured");
    let coordinator = HandshakeCoordinator::new(
        keys,
        args.local_endpoints(),
        vec![peer],
        transport,
        args.timeouts(),
    );

    // 3. Serve the HTTP endpoints
    let app = router(AppState::new(coordinator));
    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, public_url = %args.public_base_url(), "chat peer listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
