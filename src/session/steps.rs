//! Session state transitions

use super::{AccountSessionRunner, SessionJob};
use crate::api::{ApiClient, claimable_social_tasks, extract_token};
use crate::error::SessionError;
use crate::executor::RequestExecutor;
use crate::headers::{build_headers, random_user_agent};
use crate::token::Token;
use crate::types::{NodeAction, RemoteUser};
use crate::utils::{format_duration, jitter_between, now_ms};

/// Bind the persistent user agent and build the session's API client
pub(super) async fn bind_identity(
    runner: &AccountSessionRunner,
    job: &SessionJob,
) -> Result<ApiClient, SessionError> {
    let config = &runner.config;
    let address = &job.account.address;

    let user_agent = runner
        .user_agents
        .get_or_create(address, random_user_agent)
        .await
        .map_err(|e| SessionError::Identity(e.to_string()))?;
    let platform = runner.platforms.detect(&user_agent);

    let headers = build_headers(&config.api.headers, &user_agent, platform)
        .map_err(|e| SessionError::ClientSetup(e.to_string()))?;
    let executor = RequestExecutor::new(&config.request, headers, job.proxy.as_ref())
        .map_err(|e| SessionError::ClientSetup(e.to_string()))?;

    tracing::debug!(%platform, "identity bound");
    Ok(ApiClient::new(executor, &job.endpoint, &config.api))
}

/// Confirm the proxy egress, then wait a random start delay
///
/// Without proxy mode this is a no-op and the session starts immediately.
pub(super) async fn verify_proxy(
    runner: &AccountSessionRunner,
    job: &SessionJob,
    api: &ApiClient,
) -> Result<(), SessionError> {
    let config = &runner.config;
    let span = tracing::Span::current();

    let Some(proxy) = job.proxy.as_ref().filter(|_| config.proxy.enabled) else {
        span.record("proxy_ip", "local");
        return Ok(());
    };

    let ip = api
        .lookup_ip(&config.proxy.ip_lookup_url)
        .await
        .map_err(|reason| {
            tracing::warn!(proxy = %proxy, reason = %reason, "cannot check proxy IP");
            SessionError::ProxyCheck(reason)
        })?;
    span.record("proxy_ip", ip.as_str());

    let delay = jitter_between(config.session.start_delay_min, config.session.start_delay_max);
    tracing::info!(delay = %format_duration(delay), "proxy verified, starting after delay");
    tokio::time::sleep(delay).await;

    Ok(())
}

/// Reuse the cached token while it is valid, otherwise sign in and persist a new one
pub(super) async fn ensure_token(
    runner: &AccountSessionRunner,
    job: &SessionJob,
    api: &mut ApiClient,
) -> Result<(), SessionError> {
    if !runner.config.session.authenticate {
        return Ok(());
    }

    let address = &job.account.address;

    if let Some(cached) = job.tokens.get(address) {
        let expired = cached.is_expired();
        tracing::info!(
            status = if expired { "expired" } else { "valid" },
            expires_at = %cached
                .expires_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
            "access token status"
        );
        if !expired {
            api.executor_mut().set_token(cached);
            return Ok(());
        }
    }

    tracing::info!("no valid token, signing in");
    let outcome = api.authenticate(address).await;
    if !outcome.success {
        return Err(SessionError::Authentication {
            status: outcome.status,
            reason: outcome.error_message().to_string(),
        });
    }

    let raw = outcome
        .data
        .as_ref()
        .and_then(extract_token)
        .ok_or_else(|| SessionError::Authentication {
            status: outcome.status,
            reason: "sign-in response carries no token".to_string(),
        })?;
    let token = Token::parse(raw);

    let expires_at = token
        .expires_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());

    // The fresh token is used for this session even when it cannot be saved
    match runner.token_writer.persist(address, &token).await {
        Ok(()) => tracing::info!(expires_at = %expires_at, "signed in, token saved"),
        Err(e) => tracing::warn!(
            expires_at = %expires_at,
            error = %e,
            "signed in, but the token could not be saved; next iteration signs in again"
        ),
    }

    api.executor_mut().set_token(token);
    Ok(())
}

/// Fetch the remote user snapshot, with one extra try unless the request itself is bad
pub(super) async fn sync(
    runner: &AccountSessionRunner,
    job: &SessionJob,
    api: &ApiClient,
) -> Result<RemoteUser, SessionError> {
    let address = &job.account.address;
    let max_tries = runner.config.session.sync_retries + 1;
    let mut tries = 0;

    let outcome = loop {
        tries += 1;
        let outcome = api.get_user(address).await;
        if outcome.success {
            break outcome;
        }

        let hopeless = matches!(outcome.status, Some(400) | Some(404));
        if hopeless || tries >= max_tries {
            tracing::warn!(
                status = outcome.status,
                tries,
                error = %outcome.error_message(),
                "cannot sync user data"
            );
            return Err(SessionError::Sync {
                status: outcome.status,
                reason: outcome.error_message().to_string(),
            });
        }
        tracing::debug!(status = outcome.status, tries, "sync failed, trying again");
    };

    let user = outcome
        .data
        .as_ref()
        .and_then(RemoteUser::from_payload)
        .ok_or_else(|| SessionError::Sync {
            status: outcome.status,
            reason: "sync payload carries no user object".to_string(),
        })?;

    let referral_fallback = runner.config.api.referral_code.as_deref().unwrap_or("-");
    tracing::info!(
        referred_by = user.referred_by.as_deref().unwrap_or(referral_fallback),
        referral_code = user.referral_code.as_deref().unwrap_or("-"),
        refer_counter = user.refer_counter,
        pending_refer_counter = user.pending_refer_counter,
        active_days = user.active_days,
        score = user.score,
        total_points = user.total_points,
        "user synced"
    );

    Ok(user)
}

/// Claim every uncompleted catalog task, then any claimable social task
///
/// Returns `(claimed, failed)`. One failed claim never stops the others.
pub(super) async fn evaluate_tasks(
    runner: &AccountSessionRunner,
    job: &SessionJob,
    api: &ApiClient,
    user: &RemoteUser,
) -> (usize, usize) {
    let session = &runner.config.session;
    let address = &job.account.address;
    let mut claimed = 0;
    let mut failed = 0;

    let pending: Vec<_> = session
        .tasks
        .iter()
        .filter(|task| !user.has_claimed(&task.id) && !session.skip_tasks.contains(&task.id))
        .collect();

    if pending.is_empty() {
        tracing::info!("no catalog tasks available");
    }

    for task in pending {
        tokio::time::sleep(session.step_delay).await;
        tracing::info!(task = %task.id, title = %task.title, "completing task");

        let outcome = api.complete_task(address, &task.id).await;
        if outcome.success {
            claimed += 1;
            tracing::info!(task = %task.id, "task completed");
        } else {
            failed += 1;
            tracing::warn!(
                task = %task.id,
                status = outcome.status,
                error = %outcome.error_message(),
                "cannot complete task"
            );
        }
    }

    for category in &session.social_categories {
        let listing = api.social_tasks(address, category).await;
        let Some(payload) = listing.data.as_ref().filter(|_| listing.success) else {
            tracing::warn!(
                category = %category,
                error = %listing.error_message(),
                "cannot list social tasks"
            );
            continue;
        };

        for task in claimable_social_tasks(payload, &session.skip_tasks) {
            tokio::time::sleep(session.step_delay).await;

            let outcome = api.claim_social_task(address, &task.id).await;
            if outcome.success {
                claimed += 1;
                tracing::info!(category = %category, task = %task.id, "social task claimed");
            } else {
                failed += 1;
                tracing::warn!(
                    category = %category,
                    task = %task.id,
                    error = %outcome.error_message(),
                    "cannot claim social task"
                );
            }
        }
    }

    (claimed, failed)
}

/// Start the node unless the last start is more recent than the restart threshold
pub(super) async fn trigger_node(
    runner: &AccountSessionRunner,
    job: &SessionJob,
    api: &ApiClient,
    user: &RemoteUser,
) -> NodeAction {
    let session = &runner.config.session;
    tokio::time::sleep(session.step_delay).await;

    let now = now_ms();
    let threshold_ms = i64::try_from(session.node_restart_after.as_millis()).unwrap_or(i64::MAX);

    if let Some(started) = user.start_time.filter(|&t| t > 0)
        && now.saturating_sub(started) < threshold_ms
    {
        tracing::info!(started_ms = started, "node still running");
        return NodeAction::StillRunning;
    }

    let outcome = api.start_node(&job.account.address, now).await;
    if outcome.success {
        tracing::info!("node started");
        NodeAction::Started
    } else {
        tracing::warn!(
            status = outcome.status,
            error = %outcome.error_message(),
            "cannot start node"
        );
        NodeAction::Failed
    }
}
