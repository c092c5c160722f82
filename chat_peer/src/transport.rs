// rsa_handshake_chat/chat_peer/src/transport.rs

//! HTTP implementation of the peer transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared_crypto::{Error, PeerTransport, PublicKey, Result};

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::TransportFailure(format!("{url} timed out"))
    } else {
        Error::TransportFailure(format!("{url}: {err}"))
    }
}

async fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        Err(Error::AuthenticationFailure(format!(
            "{url} refused authentication: {body}"
        )))
    } else {
        Err(Error::TransportFailure(format!(
            "{url} answered {status}: {body}"
        )))
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn fetch_public_key(&self, url: &str, timeout: Duration) -> Result<PublicKey> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        let response = check_status(url, response).await?;
        response
            .json::<PublicKey>()
            .await
            .map_err(|e| Error::KeyUnavailable(format!("malformed public key from {url}: {e}")))
    }

    async fn post_json(&self, url: &str, body: Value, timeout: Duration) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        let response = check_status(url, response).await?;
        let bytes = response.bytes().await.map_err(|e| transport_error(url, e))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
