//! Shared HTTP plumbing for provider clients.
//!
//! Keeps one `reqwest::Client` per base URL so connections, DNS lookups and TLS sessions
//! are reused across requests:
//! - `pool_idle_timeout`: idle connections stay alive for 90 seconds
//! - `pool_max_idle_per_host`: up to 10 idle connections per host
//! - `tcp_keepalive`: keepalive packets every 60 seconds

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create a shared HTTP client for the given base URL.
///
/// The `timeout` only applies when the client is first created; later callers for the
/// same base URL get the pooled instance.
pub fn get_http_client(base_url: &str, timeout: Duration) -> reqwest::Client {
    let mut pool = match HTTP_CLIENT_POOL.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!(
                "agentchat::clients::common::get_http_client(...): falling back to default client: {}",
                e
            );
            reqwest::Client::new()
        });

    pool.insert(base_url.to_string(), client.clone());
    client
}

#[cfg(test)]
pub(crate) fn is_pooled(base_url: &str) -> bool {
    match HTTP_CLIENT_POOL.lock() {
        Ok(pool) => pool.contains_key(base_url),
        Err(poisoned) => poisoned.into_inner().contains_key(base_url),
    }
}

/// Failure talking to a provider endpoint.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Connection, TLS, or timeout failure before a response arrived.
    Transport(String),
    /// The endpoint answered with a non-success status code.
    Status { status: u16, body: String },
    /// The body could not be decoded into the expected shape.
    MalformedResponse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ProviderError::Status { status, body } => {
                write!(f, "Provider returned HTTP {}: {}", status, body)
            }
            ProviderError::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// POST a JSON body and decode the JSON reply, mapping every failure into [`ProviderError`].
pub async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &Req,
) -> Result<Resp, ProviderError>
where
    Req: serde::Serialize + ?Sized,
    Resp: serde::de::DeserializeOwned,
{
    let mut request = client.post(url).json(body);
    if !api_key.is_empty() {
        request = request.bearer_auth(api_key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::error!(
            "agentchat::clients::common::post_json(...): {} answered {}: {}",
            url,
            status,
            body
        );
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}
