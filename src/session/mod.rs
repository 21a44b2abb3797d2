//! Account session execution: one account's pass through the state machine.
//!
//! Split into focused submodules:
//! - [`steps`] - The individual state transitions (identity, proxy, token, sync, tasks, node)
//!
//! A session walks `Init → IdentityBound → ProxyVerified → TokenValid →
//! Synced → TasksEvaluated → NodeTriggered → Done`. Any step may abort the
//! session; the abort is reported to the scheduler, never raised.

mod steps;


use crate::config::Config;
use crate::error::SessionError;
use crate::headers::PlatformDetector;
use crate::store::{TokenSnapshot, TokenWriter, UserAgentStore};
use crate::types::{
    AccountIdentity, EndpointConfig, ProxyBinding, SessionReport, SessionState, SessionSummary,
};
use std::sync::Arc;
use tracing::Instrument;

/// Everything one session needs from the current iteration
#[derive(Clone, Debug)]
pub struct SessionJob {
    /// Account index in input order
    pub index: usize,
    /// The account
    pub account: AccountIdentity,
    /// Bound proxy, `None` when proxy mode is off
    pub proxy: Option<ProxyBinding>,
    /// Endpoint resolved for this iteration
    pub endpoint: Arc<EndpointConfig>,
    /// Token file as read at the top of this iteration
    pub tokens: TokenSnapshot,
}

/// Runs one session to a terminal state
///
/// Abstraction over session execution, enabling testability of the scheduler.
#[async_trait::async_trait]
pub trait SessionRunner: Send + Sync + 'static {
    /// Drive `job` to `Done` or `Aborted`
    async fn run(&self, job: SessionJob) -> SessionReport;
}

/// Production [`SessionRunner`] talking to the remote API
#[derive(Debug, Clone)]
pub struct AccountSessionRunner {
    pub(crate) config: Arc<Config>,
    pub(crate) user_agents: Arc<UserAgentStore>,
    pub(crate) token_writer: TokenWriter,
    pub(crate) platforms: Arc<PlatformDetector>,
}

impl AccountSessionRunner {
    /// Create a runner sharing the process-wide stores
    pub fn new(
        config: Arc<Config>,
        user_agents: Arc<UserAgentStore>,
        token_writer: TokenWriter,
        platforms: Arc<PlatformDetector>,
    ) -> Self {
        Self {
            config,
            user_agents,
            token_writer,
            platforms,
        }
    }

    async fn drive(
        &self,
        job: &SessionJob,
        reached: &mut SessionState,
    ) -> Result<SessionSummary, SessionError> {
        let mut api = steps::bind_identity(self, job).await?;
        *reached = SessionState::IdentityBound;

        steps::verify_proxy(self, job, &api).await?;
        *reached = SessionState::ProxyVerified;

        steps::ensure_token(self, job, &mut api).await?;
        *reached = SessionState::TokenValid;

        let snapshot = steps::sync(self, job, &api).await?;
        *reached = SessionState::Synced;

        let (tasks_claimed, tasks_failed) = if self.config.session.auto_tasks {
            steps::evaluate_tasks(self, job, &api, &snapshot).await
        } else {
            (0, 0)
        };
        *reached = SessionState::TasksEvaluated;

        let node = steps::trigger_node(self, job, &api, &snapshot).await;
        *reached = SessionState::NodeTriggered;

        Ok(SessionSummary {
            node,
            tasks_claimed,
            tasks_failed,
            snapshot,
        })
    }
}

#[async_trait::async_trait]
impl SessionRunner for AccountSessionRunner {
    async fn run(&self, job: SessionJob) -> SessionReport {
        let span = tracing::info_span!(
            "session",
            account = job.index + 1,
            address = %job.account.short_address(),
            proxy_ip = tracing::field::Empty,
        );

        async {
            let mut reached = SessionState::Init;
            let result = self.drive(&job, &mut reached).await;

            match &result {
                Ok(summary) => {
                    reached = SessionState::Done;
                    tracing::info!(
                        node = ?summary.node,
                        tasks_claimed = summary.tasks_claimed,
                        tasks_failed = summary.tasks_failed,
                        "session done"
                    );
                }
                Err(e) => {
                    tracing::warn!(state = %reached, error = %e, "session aborted");
                }
            }

            SessionReport {
                index: job.index,
                address: job.account.address.clone(),
                reached,
                result,
            }
        }
        .instrument(span)
        .await
    }
}
