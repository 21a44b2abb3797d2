//! # session-fleet
//!
//! Batched, proxy-isolated account session orchestration against a remote
//! JSON API.
//!
//! ## Design Philosophy
//!
//! session-fleet is designed to be:
//! - **Isolated per account** - Every session has its own HTTP client, proxy and user agent
//! - **Bounded** - Sessions run in fixed-size batches with a wall-clock budget each
//! - **Failure tolerant** - No failing account ever stops the others or the next pass
//! - **Restart safe** - Tokens and user agents persist to small JSON files
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_fleet::{Config, Controller, RecordDeriver, wait_for_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.json".as_ref())?;
//!     config.validate()?;
//!
//!     let controller = Controller::bootstrap(config, &RecordDeriver).await?;
//!     tokio::select! {
//!         _ = controller.run() => {}
//!         _ = wait_for_signal() => {}
//!     }
//!     controller.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote API operations
pub mod api;
/// Configuration types
pub mod config;
/// Outer loop controller
pub mod controller;
/// Endpoint resolution (static or manifest)
pub mod endpoint;
/// Error types
pub mod error;
/// Per-session request executor
pub mod executor;
/// User agents and client-hint headers
pub mod headers;
/// Account and proxy input files
pub mod input;
/// Retry logic with rate-limit cool-down
pub mod retry;
/// Batch scheduler (worker pool)
pub mod scheduler;
/// Account session state machine
pub mod session;
/// Persisted token and user-agent mappings
pub mod store;
/// Access tokens
pub mod token;
/// Core types and reports
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{AuthFlavor, Config};
pub use controller::{Controller, IterationReport};
pub use endpoint::EndpointResolver;
pub use error::{Error, FailureKind, Result, SessionError, ToExitCode};
pub use input::{IdentityDeriver, RecordDeriver};
pub use scheduler::BatchScheduler;
pub use session::{AccountSessionRunner, SessionJob, SessionRunner};
pub use types::{
    AccountIdentity, BatchReport, NodeAction, PassReport, ProxyBinding, RequestOutcome,
    SessionReport, SessionState,
};

/// Wait for a termination signal
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Handlers may fail to register in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, stopping");
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT, stopping");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "cannot register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("received SIGINT, stopping");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "cannot register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("received SIGTERM, stopping");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "cannot register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Wait for a termination signal (Ctrl+C)
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("received Ctrl+C, stopping");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        }
    }
}
