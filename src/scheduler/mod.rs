//! Batch scheduler -- runs sessions in consecutive, fully parallel batches.
//!
//! The account list is cut into batches of at most `limit` sessions. Every
//! session of a batch is spawned as its own task; the next batch starts only
//! after each of them has reached a terminal state (done, aborted, timed out,
//! or crashed). A short pause separates batches.

use crate::config::Config;
use crate::error::SessionError;
use crate::session::{SessionJob, SessionRunner};
use crate::types::{BatchReport, PassReport, SessionReport, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Worker pool running sessions batch by batch
pub struct BatchScheduler<R: SessionRunner> {
    runner: Arc<R>,
    limit: usize,
    batch_pause: Duration,
    session_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl<R: SessionRunner> BatchScheduler<R> {
    /// Create a scheduler; a zero limit is treated as one
    pub fn new(
        runner: Arc<R>,
        limit: usize,
        batch_pause: Duration,
        session_timeout: Duration,
    ) -> Self {
        let limit = limit.max(1);
        Self {
            runner,
            limit,
            batch_pause,
            session_timeout,
            permits: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Scheduler sized from configuration (limit depends on proxy mode)
    pub fn from_config(runner: Arc<R>, config: &Config) -> Self {
        Self::new(
            runner,
            config.concurrency_limit(),
            config.scheduler.batch_pause,
            config.session.timeout,
        )
    }

    /// Batch size limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every job once, in input order, batch by batch
    ///
    /// Never fails: per-session problems are counted in the report.
    pub async fn run_pass(&self, jobs: Vec<SessionJob>) -> PassReport {
        let started = tokio::time::Instant::now();
        let total = jobs.len();
        let mut remaining = jobs.into_iter().peekable();
        let mut batches = Vec::new();

        while remaining.peek().is_some() {
            let batch: Vec<SessionJob> = remaining.by_ref().take(self.limit).collect();
            let index = batches.len();

            tracing::info!(
                batch = index + 1,
                size = batch.len(),
                total,
                "starting batch"
            );
            let report = self.run_batch(index, batch).await;
            tracing::info!(
                batch = index + 1,
                succeeded = report.succeeded,
                aborted = report.aborted,
                timed_out = report.timed_out,
                crashed = report.crashed,
                "batch finished"
            );
            batches.push(report);

            if remaining.peek().is_some() && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        PassReport {
            batches,
            elapsed: started.elapsed(),
        }
    }

    async fn run_batch(&self, index: usize, batch: Vec<SessionJob>) -> BatchReport {
        let mut report = BatchReport {
            index,
            size: batch.len(),
            ..Default::default()
        };
        let mut set = JoinSet::new();
        let mut owners = HashMap::new();

        for job in batch {
            let runner = Arc::clone(&self.runner);
            let permits = Arc::clone(&self.permits);
            let budget = self.session_timeout;
            let account = (job.index, job.account.address.clone());

            let handle = set.spawn(async move {
                // Caps running sessions at the pool size
                let _permit = permits.acquire_owned().await;
                let index = job.index;
                let address = job.account.address.clone();

                match tokio::time::timeout(budget, runner.run(job)).await {
                    Ok(report) => report,
                    Err(_) => {
                        tracing::warn!(
                            account = index + 1,
                            budget_secs = budget.as_secs(),
                            "session exceeded its time budget, terminated"
                        );
                        SessionReport::aborted(
                            index,
                            address,
                            SessionState::Aborted,
                            SessionError::Timeout(budget),
                        )
                    }
                }
            });
            owners.insert(handle.id(), account);
        }

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, session)) => tally(&mut report, session),
                Err(e) => {
                    let (account, address) = owners.remove(&e.id()).unwrap_or_default();
                    let reason = if e.is_panic() {
                        "worker panicked".to_string()
                    } else {
                        e.to_string()
                    };
                    tracing::error!(account = account + 1, address = %address, error = %reason, "session worker crashed");
                    report.crashed += 1;
                    report.errors.push((account, SessionError::Crashed(reason)));
                }
            }
        }

        for (account, error) in &report.errors {
            tracing::debug!(account = account + 1, error = %error, "session failure");
        }

        report
    }
}

fn tally(report: &mut BatchReport, session: SessionReport) {
    match session.result {
        Ok(_) => report.succeeded += 1,
        Err(error @ SessionError::Timeout(_)) => {
            report.timed_out += 1;
            report.errors.push((session.index, error));
        }
        Err(error) => {
            report.aborted += 1;
            report.errors.push((session.index, error));
        }
    }
}
