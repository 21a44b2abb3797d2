//! Remote API operations
//!
//! Thin wrappers that turn each remote operation into a request on the
//! session's [`RequestExecutor`]. Payload interpretation helpers live here
//! too, so the session code only deals with typed values.

use crate::config::{ApiConfig, AuthFlavor};
use crate::executor::{RequestExecutor, RequestOptions};
use crate::types::{EndpointConfig, RequestOutcome};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

/// Client for one session against one resolved endpoint
#[derive(Debug)]
pub struct ApiClient {
    executor: RequestExecutor,
    base_url: String,
    auth_flavor: AuthFlavor,
    referral_code: Option<String>,
}

impl ApiClient {
    /// Bind a session executor to the resolved endpoint
    pub fn new(executor: RequestExecutor, endpoint: &EndpointConfig, api: &ApiConfig) -> Self {
        Self {
            executor,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            auth_flavor: api.auth_flavor,
            referral_code: api.referral_code.clone(),
        }
    }

    /// Underlying executor
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Underlying executor, for installing a token
    pub fn executor_mut(&mut self) -> &mut RequestExecutor {
        &mut self.executor
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn wallet_payload(&self, address: &str) -> Value {
        json!({
            "wallet": address,
            "invite": self.referral_code,
        })
    }

    /// Sign in and obtain a token (`POST /user` or `POST /user/login`)
    pub async fn authenticate(&self, address: &str) -> RequestOutcome {
        self.executor
            .execute(
                &self.url(self.auth_flavor.path()),
                Method::POST,
                Some(&self.wallet_payload(address)),
                RequestOptions::anonymous(),
            )
            .await
    }

    /// Fetch the current user snapshot (`POST /user`)
    ///
    /// Uses the executor's retry budget; the session applies its own outer
    /// retry on top.
    pub async fn get_user(&self, address: &str) -> RequestOutcome {
        self.executor
            .execute(
                &self.url("/user"),
                Method::POST,
                Some(&self.wallet_payload(address)),
                RequestOptions::default(),
            )
            .await
    }

    /// Start the long-running node (`PUT /user/update-start-time`)
    pub async fn start_node(&self, address: &str, start_time_ms: i64) -> RequestOutcome {
        self.executor
            .execute(
                &self.url("/user/update-start-time"),
                Method::PUT,
                Some(&json!({ "wallet": address, "startTime": start_time_ms })),
                RequestOptions::default(),
            )
            .await
    }

    /// Claim a catalog task (`POST /user/claim-task`)
    pub async fn complete_task(&self, address: &str, task_id: &str) -> RequestOutcome {
        self.executor
            .execute(
                &self.url("/user/claim-task"),
                Method::POST,
                Some(&json!({ "wallet": address, "taskId": task_id })),
                RequestOptions::default(),
            )
            .await
    }

    /// List social tasks of one category (`GET /v1/social/{address}?category=`)
    pub async fn social_tasks(&self, address: &str, category: &str) -> RequestOutcome {
        let url = self.url(&format!(
            "/v1/social/{}?category={}",
            urlencoding::encode(address),
            urlencoding::encode(category)
        ));
        self.executor
            .execute(&url, Method::GET, None, RequestOptions::default())
            .await
    }

    /// Claim a social task (`POST /v1/social/claim`)
    pub async fn claim_social_task(&self, address: &str, task_id: &str) -> RequestOutcome {
        self.executor
            .execute(
                &self.url("/v1/social/claim"),
                Method::POST,
                Some(&json!({ "wallet": address, "taskId": task_id })),
                RequestOptions::default(),
            )
            .await
    }

    /// Outbound IP as seen by an IP echo service, single attempt
    pub async fn lookup_ip(&self, lookup_url: &str) -> Result<String, String> {
        let outcome = self.executor.get_once(lookup_url).await;
        if !outcome.success {
            return Err(outcome.error_message().to_string());
        }
        outcome
            .data
            .as_ref()
            .and_then(|d| d.get("ip"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| "IP lookup response has no `ip` field".to_string())
    }
}

/// Token from an unwrapped sign-in payload
///
/// Looks at `token`, then `accessToken`, at the top level and under `user`.
pub fn extract_token(payload: &Value) -> Option<String> {
    let scopes = [Some(payload), payload.get("user")];
    scopes.into_iter().flatten().find_map(|scope| {
        ["token", "accessToken"].iter().find_map(|field| {
            scope
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    })
}

/// One entry from the social task listing
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialTask {
    /// Remote task id
    pub id: String,
    /// Title for logs
    #[serde(default)]
    pub title: String,
    /// Whether the task can currently be claimed
    #[serde(default)]
    pub is_active: bool,
    /// Whether this account already claimed it
    #[serde(default)]
    pub claimed: bool,
}

/// Social tasks that are active, unclaimed, and not skipped
///
/// Accepts the listing under `socialActions` or as a bare array; entries that
/// do not parse are ignored.
pub fn claimable_social_tasks(payload: &Value, skip: &[String]) -> Vec<SocialTask> {
    let entries = payload
        .get("socialActions")
        .unwrap_or(payload)
        .as_array()
        .cloned()
        .unwrap_or_default();

    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<SocialTask>(entry).ok())
        .filter(|task| task.is_active && !task.claimed && !skip.contains(&task.id))
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use reqwest::header::HeaderMap;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADDR: &str = "0x1111111111111111111111111111111111111111";

    fn client(server: &MockServer, flavor: AuthFlavor) -> ApiClient {
        let request = RequestConfig {
            timeout: Duration::from_secs(5),
            retries: 0,
            delay_between_requests: Duration::from_millis(1),
            rate_limit_cooldown: Duration::from_millis(1),
        };
        let executor = RequestExecutor::new(&request, HeaderMap::new(), None).unwrap();
        let endpoint = EndpointConfig {
            base_url: format!("{}/", server.uri()),
            message: String::new(),
        };
        let api = ApiConfig {
            auth_flavor: flavor,
            referral_code: Some("REF42".to_string()),
            ..ApiConfig::default()
        };
        ApiClient::new(executor, &endpoint, &api)
    }

    #[tokio::test]
    async fn authenticate_uses_flavor_path_and_wallet_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/login"))
            .and(body_json(json!({ "wallet": ADDR, "invite": "REF42" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "token": "t" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server, AuthFlavor::Login).authenticate(ADDR).await;
        assert!(outcome.success);
        assert_eq!(extract_token(outcome.data.as_ref().unwrap()).as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn start_node_sends_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/user/update-start-time"))
            .and(body_json(json!({ "wallet": ADDR, "startTime": 1_700_000_000_000i64 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server, AuthFlavor::UserUpsert)
            .start_node(ADDR, 1_700_000_000_000)
            .await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn social_listing_encodes_category() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/social/{ADDR}")))
            .and(query_param("category", "PARTNERS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "socialActions": [
                    { "id": "s1", "title": "Join", "isActive": true, "claimed": false },
                    { "id": "s2", "isActive": true, "claimed": true },
                    { "id": "s3", "isActive": false, "claimed": false },
                    { "id": "s4", "isActive": true, "claimed": false }
                ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server, AuthFlavor::UserUpsert)
            .social_tasks(ADDR, "PARTNERS")
            .await;
        let tasks = claimable_social_tasks(outcome.data.as_ref().unwrap(), &["s4".to_string()]);

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "s1");
        assert_eq!(tasks[0].title, "Join");
    }

    #[tokio::test]
    async fn lookup_ip_reads_ip_field() {
        let server = MockServer::start().await;
        Mock::given(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ip": "203.0.113.7" })))
            .mount(&server)
            .await;
        Mock::given(path("/noip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "addr": "x" })))
            .mount(&server)
            .await;

        let api = client(&server, AuthFlavor::UserUpsert);
        assert_eq!(
            api.lookup_ip(&format!("{}/ip", server.uri())).await.unwrap(),
            "203.0.113.7"
        );
        assert!(api.lookup_ip(&format!("{}/noip", server.uri())).await.is_err());
    }

    #[test]
    fn extract_token_checks_both_names_and_user_scope() {
        assert_eq!(extract_token(&json!({ "token": "a" })).as_deref(), Some("a"));
        assert_eq!(extract_token(&json!({ "accessToken": "b" })).as_deref(), Some("b"));
        assert_eq!(
            extract_token(&json!({ "user": { "token": "c" } })).as_deref(),
            Some("c")
        );
        assert!(extract_token(&json!({ "token": "" })).is_none());
        assert!(extract_token(&json!("raw")).is_none());
    }

    #[test]
    fn claimable_social_tasks_accepts_bare_array() {
        let payload = json!([{ "id": "x", "isActive": true }, { "bogus": 1 }]);
        let tasks = claimable_social_tasks(&payload, &[]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "x");
    }
}
