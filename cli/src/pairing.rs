//! HTTP calls to the relay: session creation, profile catalog, health

use couchpad_protocol::Catalog;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Could not reach the relay: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Relay rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),
}

/// A fresh room, as returned by `POST /api/session`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingSession {
    pub room_id: String,
    pub controller_url: String,
    pub websocket_url: String,
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSession<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayHealth {
    pub status: String,
    #[serde(default)]
    pub sessions: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct PairingClient {
    base: Url,
    client: reqwest::Client,
}

impl PairingClient {
    pub fn new(relay_url: &str) -> Result<Self, PairingError> {
        let base = http_base(relay_url)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("couchpad/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PairingError> {
        self.base
            .join(path)
            .map_err(|e| PairingError::InvalidUrl(format!("{}{}: {}", self.base, path, e)))
    }

    /// Create a room, optionally seeded with a profile
    pub async fn create_session(
        &self,
        profile: Option<&str>,
    ) -> Result<PairingSession, PairingError> {
        let response = self
            .client
            .post(self.endpoint("api/session")?)
            .json(&CreateSession { profile })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn profiles(&self) -> Result<Catalog, PairingError> {
        let response = self
            .client
            .get(self.endpoint("api/profiles")?)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn health(&self) -> Result<RelayHealth, PairingError> {
        let response = self
            .client
            .get(self.endpoint("health")?)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PairingError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let text = response.text().await.unwrap_or_default();
    Err(PairingError::Rejected {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

/// The relay's `{"error": ...}` body, or the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// The relay's http(s) base URL, ending in `/` so endpoints join beneath it.
/// `ws`/`wss` map to `http`/`https`; a bare host gets `https://`.
pub fn http_base(relay_url: &str) -> Result<Url, PairingError> {
    let invalid = || PairingError::InvalidUrl(relay_url.to_string());
    let raw = relay_url.trim();
    if raw.is_empty() {
        return Err(invalid());
    }
    let mut url = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{}", raw))
    }
    .map_err(|_| invalid())?;

    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|_| invalid())?;
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Socket URL for a room on the relay at `relay_url`
pub fn websocket_url(relay_url: &str, code: &str) -> Result<Url, PairingError> {
    let mut url = http_base(relay_url)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| PairingError::InvalidUrl(relay_url.to_string()))?;
    url.join(&format!("ws/{}", code))
        .map_err(|e| PairingError::InvalidUrl(format!("{}: {}", relay_url, e)))
}
