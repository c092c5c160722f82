// rsa_handshake_chat/chat_peer/src/config.rs

//! Command line / environment configuration for one chat party.

use std::time::Duration;

use clap::Parser;
use shared_crypto::{KeyRange, LocalEndpoints, PeerConfig, PeerId, Timeouts};

#[derive(Parser, Debug, Clone)]
#[command(name = "chat_peer", version, about = "RSA handshake chat party")]
pub struct Args {
    /// Role identifier of this party (e.g. alice)
    #[arg(long, default_value = "alice", env = "CHAT_NAME")]
    pub name: String,

    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1", env = "CHAT_BIND")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 5000, env = "CHAT_PORT")]
    pub port: u16,

    /// Base URL peers use to reach this party. Defaults to http://localhost:<port>
    #[arg(long, env = "CHAT_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Role identifier of the designated partner
    #[arg(long, default_value = "bob", env = "CHAT_PEER_NAME")]
    pub peer_name: String,

    /// Base URL of the designated partner
    #[arg(long, default_value = "http://localhost:5001", env = "CHAT_PEER_URL")]
    pub peer_url: String,

    /// Lower bound for generated primes
    #[arg(long, default_value_t = 100_000, env = "CHAT_PRIME_MIN")]
    pub prime_min: u64,

    /// Upper bound for generated primes
    #[arg(long, default_value_t = 500_000, env = "CHAT_PRIME_MAX")]
    pub prime_max: u64,

    /// Timeout for handshake, key fetch and message relay calls
    #[arg(long, default_value_t = 5, env = "CHAT_HANDSHAKE_TIMEOUT_SECS")]
    pub handshake_timeout_secs: u64,

    /// Timeout for webhook notifications
    #[arg(long, default_value_t = 3, env = "CHAT_WEBHOOK_TIMEOUT_SECS")]
    pub webhook_timeout_secs: u64,

    /// Emit JSON log lines
    #[arg(long, env = "CHAT_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn public_base_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
            .trim_end_matches('/')
            .to_string()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn key_range(&self) -> shared_crypto::Result<KeyRange> {
        KeyRange::new(self.prime_min, self.prime_max)
    }

    pub fn local_endpoints(&self) -> LocalEndpoints {
        let base = self.public_base_url();
        LocalEndpoints {
            id: PeerId::new(self.name.clone()),
            public_key_url: format!("{base}/public_key"),
            webhook_url: Some(format!("{base}/webhook_callback")),
        }
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig::from_base_url(PeerId::new(self.peer_name.clone()), &self.peer_url)
    }

    pub fn timeouts(&self) -> Timeouts {
        let call = Duration::from_secs(self.handshake_timeout_secs);
        Timeouts {
            handshake: call,
            key_fetch: call,
            relay: call,
            webhook: Duration::from_secs(self.webhook_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_alice_side() {
        let args = Args::parse_from(["chat_peer"]);
        assert_eq!(args.bind_addr(), "127.0.0.1:5000");
        let local = args.local_endpoints();
        assert_eq!(local.id, PeerId::from("alice"));
        assert_eq!(local.public_key_url, "http://localhost:5000/public_key");
        assert_eq!(
            local.webhook_url.as_deref(),
            Some("http://localhost:5000/webhook_callback")
        );
        let peer = args.peer_config();
        assert_eq!(peer.id, PeerId::from("bob"));
        assert_eq!(peer.handshake_url, "http://localhost:5001/handshake");
        assert_eq!(peer.public_key_url, "http://localhost:5001/public_key");
        assert_eq!(peer.receive_url, "http://localhost:5001/receive");
        assert_eq!(args.key_range().unwrap(), KeyRange::default());
        assert_eq!(args.timeouts(), Timeouts::default());
    }

    #[test]
    fn bob_side_from_flags() {
        let args = Args::parse_from([
            "chat_peer",
            "--name",
            "bob",
            "--port",
            "5001",
            "--public-url",
            "http://bob.internal:5001/",
            "--peer-name",
            "alice",
            "--peer-url",
            "http://alice.internal:5000",
        ]);
        assert_eq!(
            args.local_endpoints().public_key_url,
            "http://bob.internal:5001/public_key"
        );
        assert_eq!(
            args.peer_config().handshake_url,
            "http://alice.internal:5000/handshake"
        );
    }

    #[test]
    fn inverted_prime_range_is_rejected() {
        let args = Args::parse_from(["chat_peer", "--prime-min", "900", "--prime-max", "100"]);
        assert!(args.key_range().is_err());
    }
}
