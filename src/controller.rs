//! Outer loop controller
//!
//! Startup preparation (inputs, stores, user agents, token writer) followed by
//! the forever loop: reload tokens, resolve the endpoint, run one pass of the
//! batch scheduler over every account, sleep, repeat.
//!
//! # Example
//!
//! ```no_run
//! use session_fleet::{Config, Controller, RecordDeriver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.json".as_ref())?;
//! config.validate()?;
//!
//! let controller = Controller::bootstrap(config, &RecordDeriver).await?;
//! controller.run().await;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::endpoint::EndpointResolver;
use crate::error::{Error, Result};
use crate::headers::{PlatformDetector, random_user_agent};
use crate::input::{IdentityDeriver, bind_proxies, load_accounts, load_lines};
use crate::scheduler::BatchScheduler;
use crate::session::{AccountSessionRunner, SessionJob, SessionRunner};
use crate::store::{TokenSnapshot, TokenStore, UserAgentStore, spawn_token_writer};
use crate::types::{AccountIdentity, PassReport, ProxyBinding};
use crate::utils::format_duration;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Concurrent user-agent lookups during startup provisioning
const PROVISION_CONCURRENCY: usize = 8;

/// What one outer-loop iteration did
#[derive(Clone, Debug)]
pub struct IterationReport {
    /// Message from endpoint resolution
    pub endpoint_message: String,
    /// The scheduler pass, `None` when no endpoint was available
    pub pass: Option<PassReport>,
}

impl IterationReport {
    /// Sessions started in this iteration
    pub fn sessions(&self) -> usize {
        self.pass.as_ref().map_or(0, PassReport::sessions)
    }

    /// Whether the pass was skipped
    pub fn skipped(&self) -> bool {
        self.pass.is_none()
    }
}

/// Drives repeated passes over every account
pub struct Controller<R: SessionRunner> {
    config: Arc<Config>,
    accounts: Vec<(AccountIdentity, Option<ProxyBinding>)>,
    tokens: TokenStore,
    resolver: EndpointResolver,
    scheduler: BatchScheduler<R>,
    shutdown: CancellationToken,
    writer: Option<JoinHandle<()>>,
}

impl Controller<AccountSessionRunner> {
    /// Prepare a run from configuration
    ///
    /// Loads accounts and proxies, validates their pairing, binds a user agent
    /// to every account and starts the token writer. Any failure here is fatal
    /// for the process.
    pub async fn bootstrap(config: Config, deriver: &dyn IdentityDeriver) -> Result<Self> {
        let persistence = &config.persistence;

        let accounts = load_accounts(&persistence.accounts_path, deriver).await?;
        let proxies = if config.proxy.enabled {
            load_lines(&persistence.proxies_path).await?
        } else {
            Vec::new()
        };
        let bindings = bind_proxies(&accounts, &proxies, config.proxy.enabled)?;

        tracing::info!(
            accounts = accounts.len(),
            proxies = proxies.len(),
            proxy_mode = config.proxy.enabled,
            "inputs loaded"
        );
        if !config.proxy.enabled {
            tracing::warn!("running without proxies, every session shares the local IP");
        }

        let user_agents = Arc::new(UserAgentStore::new(&persistence.user_agents_path));
        provision_user_agents(&user_agents, &accounts).await?;

        let tokens = TokenStore::new(&persistence.tokens_path);
        let shutdown = CancellationToken::new();
        let (token_writer, writer) = spawn_token_writer(tokens.clone(), shutdown.clone());

        let config = Arc::new(config);
        let runner = AccountSessionRunner::new(
            Arc::clone(&config),
            user_agents,
            token_writer,
            Arc::new(PlatformDetector::new()?),
        );

        let mut controller = Self::new(config, accounts, bindings, Arc::new(runner))?;
        controller.shutdown = shutdown;
        controller.writer = Some(writer);
        Ok(controller)
    }
}

impl<R: SessionRunner> Controller<R> {
    /// Controller over already loaded accounts, running sessions with `runner`
    ///
    /// `proxies` must hold one entry per account (`None` without proxy mode).
    pub fn new(
        config: Arc<Config>,
        accounts: Vec<AccountIdentity>,
        proxies: Vec<Option<ProxyBinding>>,
        runner: Arc<R>,
    ) -> Result<Self> {
        if accounts.is_empty() {
            return Err(Error::NoAccounts);
        }
        if proxies.len() != accounts.len() {
            return Err(Error::ProxyMismatch {
                accounts: accounts.len(),
                proxies: proxies.len(),
            });
        }

        let resolver = EndpointResolver::new(&config.api)?;
        let scheduler = BatchScheduler::from_config(runner, &config);
        let tokens = TokenStore::new(&config.persistence.tokens_path);

        Ok(Self {
            accounts: accounts.into_iter().zip(proxies).collect(),
            tokens,
            resolver,
            scheduler,
            shutdown: CancellationToken::new(),
            writer: None,
            config,
        })
    }

    /// Number of accounts processed per pass
    pub fn accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Run one iteration: reload tokens, resolve the endpoint, run the pass
    ///
    /// Never fails. Without an endpoint no session is started.
    pub async fn run_iteration(&self) -> IterationReport {
        let tokens = match self.tokens.reload().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read token file, every session will sign in");
                TokenSnapshot::default()
            }
        };

        let resolved = self.resolver.resolve().await;
        let endpoint_message = resolved.message.clone();
        tracing::info!(message = %endpoint_message, "endpoint manifest");

        let Some(endpoint) = resolved.into_config() else {
            tracing::error!("no API endpoint available, skipping this iteration");
            return IterationReport {
                endpoint_message,
                pass: None,
            };
        };

        tracing::info!(
            base_url = %endpoint.base_url,
            accounts = self.accounts.len(),
            cached_tokens = tokens.len(),
            "starting pass"
        );

        let endpoint = Arc::new(endpoint);
        let jobs = self
            .accounts
            .iter()
            .enumerate()
            .map(|(index, (account, proxy))| SessionJob {
                index,
                account: account.clone(),
                proxy: proxy.clone(),
                endpoint: Arc::clone(&endpoint),
                tokens: tokens.clone(),
            })
            .collect();

        let pass = self.scheduler.run_pass(jobs).await;
        tracing::info!(
            batches = pass.batches.len(),
            sessions = pass.sessions(),
            succeeded = pass.succeeded(),
            aborted = pass.aborted(),
            timed_out = pass.timed_out(),
            crashed = pass.crashed(),
            elapsed = %format_duration(pass.elapsed),
            "pass finished"
        );

        IterationReport {
            endpoint_message,
            pass: Some(pass),
        }
    }

    /// Run iterations forever, sleeping `scheduler.loop_interval` between them
    ///
    /// Only returns when the future is dropped (process termination).
    pub async fn run(&self) {
        let interval = self.config.scheduler.loop_interval;
        tracing::info!(
            accounts = self.accounts.len(),
            batch_size = self.scheduler.limit(),
            interval = %format_duration(interval),
            "controller started"
        );

        loop {
            self.run_iteration().await;

            let next_run = chrono::TimeDelta::from_std(interval)
                .ok()
                .and_then(|delta| chrono::Local::now().checked_add_signed(delta))
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::info!(
                next_run = %next_run,
                sleep = %format_duration(interval),
                "iteration done, sleeping"
            );

            tokio::time::sleep(interval).await;
        }
    }

    /// Stop the token writer task and wait for it to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Some(writer) = self.writer
            && let Err(e) = writer.await
        {
            tracing::error!(error = %e, "token writer task failed");
        }
        tracing::info!("controller stopped");
    }
}

/// Bind a user agent to every account before the first iteration
async fn provision_user_agents(
    user_agents: &UserAgentStore,
    accounts: &[AccountIdentity],
) -> Result<()> {
    stream::iter(accounts)
        .map(|account| user_agents.get_or_create(&account.address, random_user_agent))
        .buffer_unordered(PROVISION_CONCURRENCY)
        .try_collect::<Vec<_>>()
        .await?;

    tracing::info!(bound = user_agents.len().await?, "user agents provisioned");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
