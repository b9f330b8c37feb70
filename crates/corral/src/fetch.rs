//! HTTP fetchers for app manifests, schemas, and deferred resources.
//!
//! Every fetch is a bounded-timeout GET against one of an app's discovery
//! endpoints. The same failure semantics apply everywhere: `Timeout` when
//! the deadline passes, `Status` on a non-success response, `Malformed` when
//! the body doesn't parse.

use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::error::RegistryError;

/// Fetch failures for manifest/schema/resource retrieval.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

/// Which of an app's two schemas to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Input,
    Output,
}

impl SchemaKind {
    /// Wire value for the `?type=` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::Input => "input",
            SchemaKind::Output => "output",
        }
    }
}

impl FromStr for SchemaKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(SchemaKind::Input),
            "output" => Ok(SchemaKind::Output),
            other => Err(RegistryError::InvalidArgument(other.to_string())),
        }
    }
}

/// Bounded-timeout HTTP client for one scheme.
///
/// One `Fetcher` is shared across every app the registry knows; the app id
/// is supplied per call and becomes the URL authority.
pub struct Fetcher {
    client: reqwest::Client,
    scheme: String,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(scheme: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            scheme: scheme.to_string(),
            timeout,
        }
    }

    /// Fetch an app's manifest document.
    pub async fn manifest(&self, app_id: &str) -> Result<Value, FetchError> {
        let url = format!("{}://{}/manifest", self.scheme, base(app_id));
        self.fetch_json(&url, &[]).await
    }

    /// Fetch an app's input or output schema.
    pub async fn schema(&self, app_id: &str, kind: SchemaKind) -> Result<Value, FetchError> {
        let url = format!("{}://{}/schema", self.scheme, base(app_id));
        self.fetch_json(&url, &[("type", kind.as_str())]).await
    }

    /// Dereference a resource id into its raw payload.
    pub async fn resource(&self, app_id: &str, reid: &str) -> Result<Bytes, FetchError> {
        let url = format!("{}://{}/resource", self.scheme, base(app_id));
        trace!(url = %url, reid = %reid, "fetching resource");

        let response = self
            .client
            .get(&url)
            .query(&[("reid", reid)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|e| FetchError::Transport {
            url,
            message: e.to_string(),
        })
    }

    async fn fetch_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        trace!(url = %url, "fetching document");

        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_send_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Malformed {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// App ids are URL authorities; tolerate trailing slashes from config.
fn base(app_id: &str) -> &str {
    app_id.trim_end_matches('/')
}

fn map_send_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_kind_parse() {
        assert_eq!("input".parse::<SchemaKind>().unwrap(), SchemaKind::Input);
        assert_eq!("output".parse::<SchemaKind>().unwrap(), SchemaKind::Output);
        assert!(matches!(
            "bogus".parse::<SchemaKind>(),
            Err(RegistryError::InvalidArgument(k)) if k == "bogus"
        ));
    }

    #[test]
    fn test_base_trims_trailing_slash() {
        assert_eq!(base("app-one.example.net/"), "app-one.example.net");
        assert_eq!(base("app-one.example.net"), "app-one.example.net");
    }
}
