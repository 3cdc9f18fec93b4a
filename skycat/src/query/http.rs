//! HTTP-backed remote resolver.
//!
//! Speaks a minimal JSON lookup protocol: `GET <base_url>/<identifier>`
//! returning an object of field name → value. The concrete astronomical
//! database behind the endpoint is a deployment concern; anything that
//! answers this shape can serve as the remote collaborator.

use super::resolver::{FieldSet, RemoteResolver, Resolution};
use crate::catalog::{AttrValue, Identifier};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("skycat/", env!("CARGO_PKG_VERSION"));

/// Remote resolver over HTTP.
///
/// Maps HTTP semantics onto [`Resolution`]: 404 is an authoritative
/// not-found, any other non-success status and every transport error
/// (including timeouts) is transient and left to the orchestrator's
/// retry policy.
pub struct HttpResolver {
    client: reqwest::Client,
    base_url: String,
    source: String,
}

impl HttpResolver {
    /// Create a resolver against `base_url` with a per-call timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Endpoint prefix; the identifier is appended as one
    ///   URL-encoded path segment.
    /// * `source` - Service name recorded as record provenance.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            source: source.into(),
        })
    }

    fn lookup_url(&self, id: &Identifier) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(id.as_str()))
    }
}

#[async_trait]
impl RemoteResolver for HttpResolver {
    async fn resolve(&self, id: &Identifier) -> Resolution {
        let url = self.lookup_url(id);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(id = %id, error = %e, "lookup request failed");
                return Resolution::Transient(format!("request failed: {}", e));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(id = %id, "remote catalog does not know this identifier");
            return Resolution::NotFound;
        }
        if !status.is_success() {
            warn!(id = %id, status = status.as_u16(), "lookup returned error status");
            return Resolution::Transient(format!("HTTP {} from {}", status, url));
        }

        match response.json::<serde_json::Map<String, serde_json::Value>>().await {
            Ok(body) => Resolution::Found(fields_from_json(body)),
            Err(e) => {
                warn!(id = %id, error = %e, "lookup response was not a JSON object");
                Resolution::Transient(format!("malformed response: {}", e))
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.source
    }
}

/// Convert a JSON field bag into typed attribute values.
///
/// Nulls and nested structures are dropped; the remote's field names are
/// taken as-is.
fn fields_from_json(body: serde_json::Map<String, serde_json::Value>) -> FieldSet {
    let mut fields = FieldSet::new();
    for (name, value) in body {
        let attr = match value {
            serde_json::Value::String(s) => AttrValue::Text(s),
            serde_json::Value::Bool(b) => AttrValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttrValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    AttrValue::Float(f)
                } else {
                    continue;
                }
            }
            _ => continue,
        };
        fields.insert(name, attr);
    }
    fields
}
