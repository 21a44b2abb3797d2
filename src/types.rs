//! Core types for session-fleet

use crate::error::{FailureKind, SessionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One account, derived once at startup from an input record
#[derive(Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    /// Public account address, the key for every persisted mapping
    pub address: String,
    /// Optional signing secret; never logged
    pub secret_key: Option<String>,
}

impl AccountIdentity {
    /// Create an identity without a secret
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secret_key: None,
        }
    }

    /// Shortened address for log lines (`0x1234...abcd`)
    pub fn short_address(&self) -> String {
        let chars: Vec<char> = self.address.chars().collect();
        if chars.len() <= 12 {
            return self.address.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl std::fmt::Debug for AccountIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountIdentity")
            .field("address", &self.address)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A proxy assigned to an account by index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyBinding {
    /// Index of the account (and proxy line) this binding belongs to
    pub index: usize,
    /// Proxy URL as written in the proxy file
    pub url: String,
}

impl std::fmt::Display for ProxyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::utils::mask_proxy(&self.url))
    }
}

/// Uniform result of one remote operation
///
/// Every call through the request executor ends up here, success or not.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    /// Whether the call produced a 2xx response
    pub success: bool,
    /// HTTP status of the last attempt, if a response arrived
    pub status: Option<u16>,
    /// Unwrapped payload on success, raw body on failure when available
    pub data: Option<Value>,
    /// Error message from the remote body or the transport
    pub error: Option<String>,
    /// Classification of the failure
    pub kind: Option<FailureKind>,
    /// Number of attempts made
    pub attempts: u32,
}

impl RequestOutcome {
    /// Successful outcome with the given payload
    pub fn ok(status: u16, data: Value, attempts: u32) -> Self {
        Self {
            success: true,
            status: Some(status),
            data: Some(data),
            error: None,
            kind: None,
            attempts,
        }
    }

    /// Failed outcome
    pub fn failure(
        kind: FailureKind,
        status: Option<u16>,
        error: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            success: false,
            status,
            data,
            error: Some(error.into()),
            kind: Some(kind),
            attempts: 1,
        }
    }

    /// Error message, or a generic placeholder when none was captured
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Active API base URL plus the manifest message, fixed for one iteration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    /// Informational message from the manifest
    pub message: String,
}

/// Result of endpoint resolution; a `None` endpoint skips the iteration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Active base URL
    pub endpoint: Option<String>,
    /// Informational or fallback message
    pub message: String,
}

impl ResolvedEndpoint {
    /// Convert into an [`EndpointConfig`] when an endpoint was resolved
    pub fn into_config(self) -> Option<EndpointConfig> {
        let message = self.message;
        self.endpoint.map(|base_url| EndpointConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            message,
        })
    }
}

/// One entry in the fixed task catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Remote task id
    pub id: String,
    /// Human-readable title for logs
    pub title: String,
}

impl TaskRecord {
    /// Create a catalog entry
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Snapshot of the remote user, used for reporting and the task/node decisions
///
/// Every field is read leniently: `null`, a missing field, or a value of the
/// wrong type falls back to the default, so only a missing user object makes a
/// sync payload unusable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteUser {
    /// Address that referred this account
    #[serde(deserialize_with = "lenient::string")]
    pub referred_by: Option<String>,
    /// This account's own referral code
    #[serde(deserialize_with = "lenient::string")]
    pub referral_code: Option<String>,
    /// Confirmed referrals
    #[serde(deserialize_with = "lenient::count")]
    pub refer_counter: u64,
    /// Referrals not yet confirmed
    #[serde(deserialize_with = "lenient::count")]
    pub pending_refer_counter: u64,
    /// Days with an active node
    #[serde(deserialize_with = "lenient::count")]
    pub active_days: u64,
    /// Current score
    #[serde(deserialize_with = "lenient::amount")]
    pub score: f64,
    /// Lifetime points
    #[serde(deserialize_with = "lenient::amount")]
    pub total_points: f64,
    /// Task ids already claimed
    #[serde(deserialize_with = "lenient::ids")]
    pub claimed_tasks: Vec<String>,
    /// Last node start, in milliseconds since the epoch
    #[serde(deserialize_with = "lenient::timestamp")]
    pub start_time: Option<i64>,
}

/// Field readers that never fail on a badly typed value
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number(value: &Value) -> Option<f64> {
        let parsed: Option<f64> = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.filter(|n| n.is_finite())
    }

    pub(super) fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub(super) fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_u64()
            .or_else(|| number(&value).map(|n| n.max(0.0) as u64))
            .unwrap_or_default())
    }

    pub(super) fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(number(&Value::deserialize(d)?).unwrap_or_default())
    }

    pub(super) fn ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let Value::Array(items) = Value::deserialize(d)? else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect())
    }

    pub(super) fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_i64()
            .or_else(|| number(&value).map(|n| n as i64)))
    }
}

impl RemoteUser {
    /// Extract the user snapshot from an unwrapped sync payload
    ///
    /// The payload carries the user under `user`; a bare user object is
    /// accepted too.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let user = payload.get("user").unwrap_or(payload);
        if !user.is_object() {
            return None;
        }
        serde_json::from_value(user.clone()).ok()
    }

    /// Whether the catalog task has already been claimed
    pub fn has_claimed(&self, task_id: &str) -> bool {
        self.claimed_tasks.iter().any(|t| t == task_id)
    }
}

/// States of a session, in the order they are reached
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing done yet
    Init,
    /// User agent and platform headers bound
    IdentityBound,
    /// Proxy egress confirmed (or proxy mode off)
    ProxyVerified,
    /// A usable token is held (or authentication disabled)
    TokenValid,
    /// Remote user snapshot fetched
    Synced,
    /// Catalog and social tasks processed
    TasksEvaluated,
    /// Node started or found still running
    NodeTriggered,
    /// Session finished
    Done,
    /// Session stopped early
    Aborted,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Init => "init",
            SessionState::IdentityBound => "identity_bound",
            SessionState::ProxyVerified => "proxy_verified",
            SessionState::TokenValid => "token_valid",
            SessionState::Synced => "synced",
            SessionState::TasksEvaluated => "tasks_evaluated",
            SessionState::NodeTriggered => "node_triggered",
            SessionState::Done => "done",
            SessionState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// What the node step did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    /// A start call was issued and accepted
    Started,
    /// The last start is recent enough, no call issued
    StillRunning,
    /// The start call failed; earlier progress stands
    Failed,
}

/// Result of a session that reached `Done`
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    /// What the node step did
    pub node: NodeAction,
    /// Tasks claimed in this session
    pub tasks_claimed: usize,
    /// Task claims that failed
    pub tasks_failed: usize,
    /// Remote user snapshot at sync time
    pub snapshot: RemoteUser,
}

/// Terminal report of one session, handed back to the scheduler
#[derive(Clone, Debug)]
pub struct SessionReport {
    /// Account index in the input order
    pub index: usize,
    /// Account address
    pub address: String,
    /// Last state reached before finishing or aborting
    pub reached: SessionState,
    /// Summary on success, abort reason otherwise
    pub result: std::result::Result<SessionSummary, SessionError>,
}

impl SessionReport {
    /// Report for a session that stopped early
    pub fn aborted(
        index: usize,
        address: impl Into<String>,
        reached: SessionState,
        error: SessionError,
    ) -> Self {
        Self {
            index,
            address: address.into(),
            reached,
            result: Err(error),
        }
    }

    /// Whether the session reached `Done`
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-batch counts and diagnostics
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// 0-based batch number within the pass
    pub index: usize,
    /// Sessions started in this batch
    pub size: usize,
    /// Sessions that reached `Done`
    pub succeeded: usize,
    /// Sessions that aborted on their own
    pub aborted: usize,
    /// Sessions force-terminated by the wall-clock budget
    pub timed_out: usize,
    /// Workers that panicked or were cancelled
    pub crashed: usize,
    /// `(account index, error)` for every failed session
    pub errors: Vec<(usize, SessionError)>,
}

/// Totals for one pass of the scheduler over all accounts
#[derive(Clone, Debug, Default)]
pub struct PassReport {
    /// One entry per batch, in order
    pub batches: Vec<BatchReport>,
    /// Wall-clock time for the pass
    pub elapsed: Duration,
}

impl PassReport {
    /// Sessions started across all batches
    pub fn sessions(&self) -> usize {
        self.batches.iter().map(|b| b.size).sum()
    }

    /// Sessions that reached `Done`
    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.succeeded).sum()
    }

    /// Sessions that aborted on their own
    pub fn aborted(&self) -> usize {
        self.batches.iter().map(|b| b.aborted).sum()
    }

    /// Sessions force-terminated by the wall-clock budget
    pub fn timed_out(&self) -> usize {
        self.batches.iter().map(|b| b.timed_out).sum()
    }

    /// Workers that crashed
    pub fn crashed(&self) -> usize {
        self.batches.iter().map(|b| b.crashed).sum()
    }
}
