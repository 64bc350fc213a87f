// REST fallback client
//
// Thin wrapper over `reqwest::Client` for the three JSON endpoints the
// realtime layer leans on when the broadcast link is unavailable: the
// state snapshot, the event send path, and the agent status probe.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Response of `GET /state?period=...`.
///
/// The server always sends `success`; every other top-level field is
/// page-specific and kept verbatim in `data`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateSnapshot {
    pub success: bool,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Response of `GET /chat/agent-status`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct AgentStatus {
    #[serde(rename = "agentsOnline", default)]
    pub agents_online: u32,
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
    event: &'a str,
    data: &'a serde_json::Value,
}

/// Generic `{success, message | error}` acknowledgement.
#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// HTTP client for the JSON API that backs the realtime layer.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. `https://tickets.example.com/api/`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, mut base_url: Url) -> Self {
        // `Url::join` drops the last path segment unless it ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    /// The API root every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the aggregated state for `period` (e.g. `"24h"`).
    pub async fn fetch_state(&self, period: &str) -> Result<StateSnapshot, Error> {
        let mut url = self.url("state")?;
        url.query_pairs_mut().append_pair("period", period);
        debug!(%url, "fetching state snapshot");

        let resp = self.http.get(url).send().await?;
        let snapshot: StateSnapshot = parse_json(resp).await?;
        if !snapshot.success {
            let message = snapshot
                .data
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("state request was not successful")
                .to_owned();
            return Err(Error::Rejected { message });
        }
        Ok(snapshot)
    }

    /// Send a client event over HTTP (`POST /events`).
    pub async fn post_event(&self, event: &str, data: &serde_json::Value) -> Result<(), Error> {
        let url = self.url("events")?;
        debug!(%url, event, "posting event over REST fallback");

        let resp = self
            .http
            .post(url)
            .json(&EventBody { event, data })
            .send()
            .await?;
        let ack: Ack = parse_json(resp).await?;
        if ack.success {
            Ok(())
        } else {
            Err(Error::Rejected {
                message: ack
                    .message
                    .or(ack.error)
                    .unwrap_or_else(|| format!("event '{event}' was rejected")),
            })
        }
    }

    /// Ask the server how many support agents are online.
    pub async fn agent_status(&self) -> Result<AgentStatus, Error> {
        let url = self.url("chat/agent-status")?;
        let resp = self.http.get(url).send().await?;
        parse_json(resp).await
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }
}

/// Check the status code, then decode the body, keeping the raw text
/// around for the error message when decoding fails.
async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await?;
    trace!(status = status.as_u16(), body_len = body.len(), "REST response");

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            message: body,
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let client = RestClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://example.com/api").unwrap(),
        );
        assert_eq!(client.base_url().as_str(), "https://example.com/api/");
        assert_eq!(
            client.url("events").unwrap().as_str(),
            "https://example.com/api/events"
        );
    }

    #[test]
    fn state_snapshot_keeps_extra_fields() {
        let snap: StateSnapshot =
            serde_json::from_str(r#"{"success": true, "active_users": 12, "period": "24h"}"#)
                .unwrap();
        assert!(snap.success);
        assert_eq!(snap.data["active_users"], 12);
        assert_eq!(snap.data["period"], "24h");
    }
}
