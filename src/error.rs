//! Error types for session-fleet
//!
//! This module provides error handling for the crate, including:
//! - The crate-wide [`Error`] for startup, configuration, and persistence failures
//! - The [`FailureKind`] taxonomy used to classify failed remote requests
//! - [`SessionError`] abort reasons reported by a session to the scheduler
//! - Process exit code mapping for fatal startup errors

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for session-fleet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for session-fleet
///
/// Remote request failures never surface as this type: the request executor
/// absorbs them into a [`RequestOutcome`](crate::types::RequestOutcome). What
/// remains here is configuration, input, and local persistence trouble.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// An input record could not be turned into an account identity
    #[error("invalid account record on line {line}: {reason}")]
    InvalidAccount {
        /// 1-based line number in the accounts file
        line: usize,
        /// Why the record was rejected
        reason: String,
    },

    /// The accounts file produced no accounts
    #[error("no accounts loaded")]
    NoAccounts,

    /// Proxy mode is enabled but there are fewer proxies than accounts
    #[error("proxy mode requires one proxy per account: {accounts} accounts, {proxies} proxies")]
    ProxyMismatch {
        /// Number of accounts loaded
        accounts: usize,
        /// Number of proxies loaded
        proxies: usize,
    },

    /// A persisted JSON store could not be read or written
    #[error("store error at {}: {reason}", .path.display())]
    Store {
        /// Path of the backing file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or transport error outside the request executor
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Map fatal errors to process exit codes
///
/// Codes follow the BSD `sysexits.h` conventions so wrappers (systemd, shell
/// loops) can tell a bad config apart from a bad input file.
pub trait ToExitCode {
    /// Get the process exit code for this error
    fn exit_code(&self) -> i32;
}

impl ToExitCode for Error {
    fn exit_code(&self) -> i32 {
        match self {
            // EX_CONFIG
            Error::Config { .. } => 78,
            // EX_DATAERR - input files disagree with what the run needs
            Error::InvalidAccount { .. } | Error::NoAccounts | Error::ProxyMismatch { .. } => 65,
            // EX_IOERR
            Error::Io(_) | Error::Store { .. } => 74,
            // EX_UNAVAILABLE
            Error::Network(_) => 69,
            Error::Serialization(_) | Error::Other(_) => 1,
        }
    }
}

/// Classification of a failed remote request
///
/// Derived from structured data only (HTTP status codes and reqwest error
/// flags), never from message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The response stream broke off mid-transfer
    TransportAborted,
    /// HTTP 401
    Unauthorized,
    /// HTTP 400, usually means the remote API changed shape
    BadRequest,
    /// HTTP 429
    RateLimited,
    /// Network errors, 5xx, and any other status
    Generic,
    /// A session exceeded its wall-clock budget
    Timeout,
}

impl FailureKind {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => FailureKind::BadRequest,
            401 => FailureKind::Unauthorized,
            429 => FailureKind::RateLimited,
            _ => FailureKind::Generic,
        }
    }

    /// Classify a transport-level reqwest error
    ///
    /// A timeout is generic even while reading the body; any other body
    /// failure means the stream was cut off.
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            FailureKind::Generic
        } else if error.is_body() {
            FailureKind::TransportAborted
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16())
        } else {
            FailureKind::Generic
        }
    }

    /// Stable label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransportAborted => "transport_aborted",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::BadRequest => "bad_request",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Generic => "generic",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session stopped before reaching `Done`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// The per-session HTTP client could not be built (bad proxy URL, bad header)
    #[error("client setup failed: {0}")]
    ClientSetup(String),

    /// The user-agent binding could not be loaded or persisted
    #[error("identity binding failed: {0}")]
    Identity(String),

    /// The outbound IP lookup through the bound proxy failed
    #[error("proxy check failed: {0}")]
    ProxyCheck(String),

    /// Login did not yield a usable token
    #[error("authentication failed (status {status:?}): {reason}")]
    Authentication {
        /// HTTP status of the last attempt, if any
        status: Option<u16>,
        /// Error message from the remote or transport
        reason: String,
    },

    /// The remote user snapshot could not be fetched
    #[error("sync failed (status {status:?}): {reason}")]
    Sync {
        /// HTTP status of the last attempt, if any
        status: Option<u16>,
        /// Error message from the remote or transport
        reason: String,
    },

    /// The session exceeded its wall-clock budget and was force-terminated
    #[error("session timed out after {0:?}")]
    Timeout(Duration),

    /// The worker task panicked or was cancelled
    #[error("worker crashed: {0}")]
    Crashed(String),
}

impl SessionError {
    /// Failure kind for the scheduler's counters
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            SessionError::Timeout(_) => Some(FailureKind::Timeout),
            SessionError::Authentication { status, .. } | SessionError::Sync { status, .. } => {
                status.map(FailureKind::from_status)
            }
            _ => None,
        }
    }
}
