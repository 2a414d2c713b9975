//! HTTP provider for ZVM.
//!
//! Registers getters for the `http` and `https` schemes, one per supported
//! media type. A getter fetches the URI with a blocking client and decodes
//! the body with the codec for its media type. Any status other than
//! `200 OK` fails the op.
//!
//! Getters accept an optional `headers` parameter:
//!
//! ```text
//! {"op": "get", "uri": "https://example.com/p.json", "mediaType": "application/json",
//!  "headers": {"Authorization": "Bearer token"}}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use zvm_core::{MediaType, Registry, Result, Value, VmError};

pub const SCHEMES: [&str; 2] = ["http", "https"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Client settings, read from the `[http]` table of `zvm.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

impl HttpConfig {
    fn client(&self) -> Result<Client> {
        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("zvm/{}", env!("CARGO_PKG_VERSION")));
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| VmError::provider("http:", format!("failed to build HTTP client: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Request schema
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetRequest {
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

fn fetch(client: &Client, uri: &str, media_type: MediaType, request: GetRequest) -> Result<Value> {
    let mut req = client.get(uri);
    for (key, value) in &request.headers {
        req = req.header(key, value);
    }
    tracing::debug!(uri, media_type = media_type.as_str(), "fetching");
    let response = req
        .send()
        .map_err(|e| VmError::provider(uri, format!("HTTP request failed: {e}")))?;
    let status = response.status();
    if status != StatusCode::OK {
        tracing::warn!(uri, %status, "unexpected HTTP status");
        return Err(VmError::provider(uri, format!("unexpected HTTP status {status}")));
    }
    let body = response
        .text()
        .map_err(|e| VmError::provider(uri, format!("failed to read response body: {e}")))?;
    media_type.decode(&body)
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Install the `http`/`https` getters, sharing one client built from `config`.
pub fn register(registry: &mut Registry, config: &HttpConfig) -> Result<()> {
    let client = config.client()?;
    for media_type in MediaType::ALL {
        let client = client.clone();
        registry.getter(&SCHEMES, Some(media_type.as_str()), move |state, uri, params| {
            let request: GetRequest = state.decode(params)?;
            fetch(&client, uri, media_type, request)
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
