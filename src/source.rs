// Source module - fetches JSON statistics documents from Elasticsearch
//
// This module is responsible for:
// 1. Issuing one bounded-timeout GET per scrape against an endpoint
// 2. Applying HTTP basic auth when credentials are configured
// 3. Decoding the body into an untyped JSON tree
// 4. Splitting node-stats documents into per-node sub-documents

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while fetching a document
///
/// Every variant means the collection pass failed at the transport or
/// decode layer and liveness must be reported as down.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid JSON from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// True for failures below the JSON layer (unreachable, timeout, bad status)
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Status { .. })
    }
}

/// Anything that can produce a decoded JSON document for an endpoint path
///
/// `endpoint` is the path below the configured base URL, e.g.
/// `/_cluster/health`.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Returns the absolute URL requested for `endpoint` (used for logging)
    fn url_for(&self, endpoint: &str) -> String;

    /// Fetches and decodes the document at `endpoint`
    async fn fetch(&self, endpoint: &str) -> Result<Value, FetchError>;
}

/// Basic auth credentials for a secured cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Returns credentials only when both parts are non-empty
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some(Credentials {
                username: u.to_string(),
                password: p.to_string(),
            }),
            _ => None,
        }
    }
}

/// HTTP document source backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl HttpSource {
    /// Creates a source for the cluster at `base_url`
    ///
    /// # Arguments
    /// * `base_url` - Cluster URL, e.g. "http://localhost:9200" (trailing slashes are ignored)
    /// * `timeout` - Total time allowed for one request including the body
    /// * `credentials` - Optional basic auth credentials
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(HttpSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn fetch(&self, endpoint: &str) -> Result<Value, FetchError> {
        let url = self.url_for(endpoint);
        debug!("Fetching {}", url);

        let mut request = self.client.get(&url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        // Read the body first so a timeout while streaming stays a transport error
        let body = response.bytes().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url,
            reason: e.to_string(),
        })
    }
}

/// A node-stats response: opaque per-node documents keyed by node id
///
/// # Example
/// ```json
/// {"nodes": {"Xy3k...": {"host": "es-1", "jvm": {...}}}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatsDocument {
    pub nodes: BTreeMap<String, Value>,
}

impl NodeStatsDocument {
    /// Splits a decoded response into per-node documents
    ///
    /// # Errors
    /// Returns `FetchError::Decode` when the body has no `nodes` object.
    pub fn from_value(url: &str, value: Value) -> Result<Self, FetchError> {
        serde_json::from_value(value).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory document source for unit tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What a scripted fetch returns
    #[derive(Debug, Clone)]
    pub enum Reply {
        Document(Value),
        Status(u16),
        Garbage(String),
    }

    /// Replays scripted replies; the last reply repeats once the script runs out
    #[derive(Debug)]
    pub struct ScriptedSource {
        replies: Mutex<VecDeque<Reply>>,
        last: Mutex<Option<Reply>>,
        delay: Option<Duration>,
        pub fetches: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        pub fn new(replies: Vec<Reply>) -> Self {
            ScriptedSource {
                replies: Mutex::new(replies.into()),
                last: Mutex::new(None),
                delay: None,
                fetches: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn document(value: Value) -> Self {
            Self::new(vec![Reply::Document(value)])
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn next_reply(&self) -> Reply {
            let mut last = self.last.lock();
            if let Some(reply) = self.replies.lock().pop_front() {
                *last = Some(reply);
            }
            last.clone().unwrap_or(Reply::Status(503))
        }
    }

    #[async_trait]
    impl DocumentSource for ScriptedSource {
        fn url_for(&self, endpoint: &str) -> String {
            format!("http://fake{}", endpoint)
        }

        async fn fetch(&self, endpoint: &str) -> Result<Value, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let reply = self.next_reply();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let url = self.url_for(endpoint);
            match reply {
                Reply::Document(value) => Ok(value),
                Reply::Status(code) => Err(FetchError::Status {
                    url,
                    status: reqwest::StatusCode::from_u16(code)
                        .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
                }),
                Reply::Garbage(body) => serde_json::from_str(&body).map_err(|e| {
                    FetchError::Decode {
                        url,
                        reason: e.to_string(),
                    }
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credentials_require_both_parts() {
        assert!(Credentials::from_parts(Some("elastic"), Some("secret")).is_some());
        assert!(Credentials::from_parts(Some("elastic"), Some("")).is_none());
        assert!(Credentials::from_parts(Some(""), Some("secret")).is_none());
        assert!(Credentials::from_parts(None, Some("secret")).is_none());
    }

    #[test]
    fn test_url_ignores_trailing_slash() {
        let source =
            HttpSource::new("http://localhost:9200/", Duration::from_secs(1), None).unwrap();
        assert_eq!(source.base_url(), "http://localhost:9200");
        assert_eq!(
            source.url_for("/_cluster/health"),
            "http://localhost:9200/_cluster/health"
        );
    }

    #[test]
    fn test_node_stats_envelope() {
        let doc = json!({"cluster_name": "es", "nodes": {"a": {"host": "es-1"}, "b": {}}});
        let stats = NodeStatsDocument::from_value("http://x/_nodes/stats", doc).unwrap();
        assert_eq!(stats.nodes.len(), 2);
        assert_eq!(stats.nodes["a"]["host"], json!("es-1"));

        let err = NodeStatsDocument::from_value("http://x", json!({"status": "green"}));
        assert!(matches!(err, Err(FetchError::Decode { .. })));

        let err = NodeStatsDocument::from_value("http://x", json!({"nodes": [1, 2]}));
        assert!(matches!(err, Err(FetchError::Decode { .. })));
    }
}
