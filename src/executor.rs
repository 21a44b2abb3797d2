//! Request executor
//!
//! One [`RequestExecutor`] exists per session. It owns the session's HTTP
//! client (timeout, proxy, header set) and the bearer token once one is held.
//! Every call returns a [`RequestOutcome`]; transport and protocol errors never
//! escape as `Err`.

use crate::config::RequestConfig;
use crate::error::{FailureKind, Result};
use crate::retry::{IsRetryable, RetryPolicy, with_retry};
use crate::token::Token;
use crate::types::{ProxyBinding, RequestOutcome};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde_json::Value;

/// Per-call options
#[derive(Clone, Copy, Debug)]
pub struct RequestOptions {
    /// Override the configured retry budget
    pub retries: Option<u32>,
    /// Attach the bearer token when one is held
    pub authenticated: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            retries: None,
            authenticated: true,
        }
    }
}

impl RequestOptions {
    /// No bearer token, configured retry budget
    pub fn anonymous() -> Self {
        Self {
            retries: None,
            authenticated: false,
        }
    }

    /// Same options with a fixed retry budget
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// One failed attempt, as seen by the retry loop
#[derive(Debug)]
struct AttemptFailure {
    kind: FailureKind,
    status: Option<u16>,
    message: String,
    body: Option<Value>,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl IsRetryable for AttemptFailure {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn is_rate_limited(&self) -> bool {
        self.kind.is_rate_limited()
    }
}

/// HTTP client bound to one session's proxy, headers, and token
#[derive(Debug)]
pub struct RequestExecutor {
    client: reqwest::Client,
    policy: RetryPolicy,
    token: Option<Token>,
}

impl RequestExecutor {
    /// Build the session client
    ///
    /// Fails only on configuration trouble: an unparsable proxy URL or a
    /// client that cannot be constructed.
    pub fn new(
        config: &RequestConfig,
        headers: HeaderMap,
        proxy: Option<&ProxyBinding>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers);

        if let Some(binding) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(&binding.url)?);
        }

        Ok(Self {
            client: builder.build()?,
            policy: RetryPolicy::from(config),
            token: None,
        })
    }

    /// Hold `token` for authenticated requests
    pub fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    /// Currently held token
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Issue one call under the retry policy
    ///
    /// Non-GET requests always carry a JSON body, `{}` when none is given.
    pub async fn execute(
        &self,
        url: &str,
        method: Method,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> RequestOutcome {
        let policy = match options.retries {
            Some(retries) => self.policy.with_retries(retries),
            None => self.policy,
        };

        let empty = Value::Object(serde_json::Map::new());
        let body = if method == Method::GET {
            None
        } else {
            Some(body.unwrap_or(&empty))
        };

        let result = with_retry(&policy, || {
            self.attempt(url, method.clone(), body, options.authenticated)
        })
        .await;

        match result {
            Ok(((status, data), attempts)) => RequestOutcome::ok(status, data, attempts),
            Err((failure, attempts)) => {
                match failure.kind {
                    FailureKind::BadRequest => tracing::error!(
                        url,
                        status = failure.status,
                        error = %failure.message,
                        "invalid request, the remote API may have changed"
                    ),
                    FailureKind::Unauthorized => tracing::warn!(
                        url,
                        error = %failure.message,
                        "request unauthorized"
                    ),
                    _ => tracing::debug!(
                        url,
                        attempts,
                        error = %failure,
                        "request failed"
                    ),
                }
                RequestOutcome {
                    attempts,
                    ..RequestOutcome::failure(
                        failure.kind,
                        failure.status,
                        failure.message,
                        failure.body,
                    )
                }
            }
        }
    }

    /// Single GET with no retry and no bearer token
    pub async fn get_once(&self, url: &str) -> RequestOutcome {
        self.execute(url, Method::GET, None, RequestOptions::anonymous().with_retries(0))
            .await
    }

    async fn attempt(
        &self,
        url: &str,
        method: Method,
        body: Option<&Value>,
        authenticated: bool,
    ) -> std::result::Result<(u16, Value), AttemptFailure> {
        let mut request = self.client.request(method, url);

        if authenticated && let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.as_str()));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_failure)?;
        let decoded = decode_body(&text);

        if status.is_success() {
            return Ok((status.as_u16(), unwrap_payload(decoded)));
        }

        let message = remote_error_message(&decoded).unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        });

        Err(AttemptFailure {
            kind: FailureKind::from_status(status.as_u16()),
            status: Some(status.as_u16()),
            message,
            body: Some(decoded),
        })
    }
}

fn transport_failure(error: reqwest::Error) -> AttemptFailure {
    AttemptFailure {
        kind: FailureKind::from_transport(&error),
        status: error.status().map(|s| s.as_u16()),
        message: error.to_string(),
        body: None,
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Success payload: the nested `data` field when it is truthy, else the whole body
pub fn unwrap_payload(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner) if is_truthy(&inner) => inner,
            Some(inner) => {
                map.insert("data".to_string(), inner);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Error text from a failed response body (`error`, then `message`)
fn remote_error_message(body: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|field| match body.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}
