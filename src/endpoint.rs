//! Endpoint resolution
//!
//! Decides the API base URL for one outer-loop iteration: either the static
//! configured URL, or whatever a remote manifest currently names.

use crate::config::ApiConfig;
use crate::error::Result;
use crate::types::ResolvedEndpoint;
use serde_json::Value;

/// Message returned alongside a statically configured endpoint
pub const STATIC_MESSAGE: &str = "using configured API endpoint";

/// Message returned when the manifest cannot be used
pub const FALLBACK_MESSAGE: &str = "endpoint manifest unavailable, the service may be down or moved";

#[derive(Debug)]
enum Source {
    Static(String),
    Manifest {
        client: reqwest::Client,
        url: String,
        endpoint_field: String,
        message_field: String,
    },
}

/// Resolves the active API base URL
#[derive(Debug)]
pub struct EndpointResolver {
    source: Source,
}

impl EndpointResolver {
    /// Build a resolver from the API settings
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let source = match (&api.manifest_url, api.dynamic_endpoint) {
            (Some(url), true) => Source::Manifest {
                client: reqwest::Client::builder()
                    .timeout(api.manifest_timeout)
                    .build()?,
                url: url.clone(),
                endpoint_field: api.manifest_field.clone(),
                message_field: api.manifest_message_field.clone(),
            },
            _ => Source::Static(api.base_url.clone()),
        };
        Ok(Self { source })
    }

    /// Resolve the endpoint for this iteration
    ///
    /// Never fails: any manifest trouble yields a `None` endpoint with
    /// [`FALLBACK_MESSAGE`].
    pub async fn resolve(&self) -> ResolvedEndpoint {
        match &self.source {
            Source::Static(base_url) => ResolvedEndpoint {
                endpoint: Some(base_url.clone()),
                message: STATIC_MESSAGE.to_string(),
            },
            Source::Manifest {
                client,
                url,
                endpoint_field,
                message_field,
            } => match fetch_manifest(client, url).await {
                Ok(manifest) => read_manifest(&manifest, endpoint_field, message_field),
                Err(reason) => {
                    tracing::warn!(manifest = %url, reason = %reason, "endpoint manifest fetch failed");
                    fallback()
                }
            },
        }
    }
}

async fn fetch_manifest(client: &reqwest::Client, url: &str) -> std::result::Result<Value, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }
    response.json::<Value>().await.map_err(|e| e.to_string())
}

fn read_manifest(manifest: &Value, endpoint_field: &str, message_field: &str) -> ResolvedEndpoint {
    let endpoint = manifest
        .get(endpoint_field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match endpoint {
        Some(endpoint) => ResolvedEndpoint {
            endpoint: Some(endpoint.to_string()),
            message: manifest
                .get(message_field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        None => {
            tracing::warn!(field = endpoint_field, "endpoint manifest is missing the endpoint field");
            fallback()
        }
    }
}

fn fallback() -> ResolvedEndpoint {
    ResolvedEndpoint {
        endpoint: None,
        message: FALLBACK_MESSAGE.to_string(),
    }
}
