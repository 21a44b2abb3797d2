//! Configuration types for session-fleet

use crate::error::{Error, Result};
use crate::types::TaskRecord;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, path::PathBuf, time::Duration};

/// Which request shape authenticates an account
///
/// The remote service has shipped two variants of its sign-in call. Both are
/// the same session flow with a different path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlavor {
    /// `POST /user` upserts the account and returns the user plus token (default)
    #[default]
    UserUpsert,
    /// `POST /user/login`
    Login,
}

impl AuthFlavor {
    /// Path appended to the base URL for the sign-in call
    pub fn path(&self) -> &'static str {
        match self {
            AuthFlavor::UserUpsert => "/user",
            AuthFlavor::Login => "/user/login",
        }
    }
}

/// Remote API and endpoint resolution settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL used when dynamic endpoint resolution is disabled
    #[serde(default)]
    pub base_url: String,

    /// Fetch the active base URL from a manifest before every iteration (default: false)
    #[serde(default)]
    pub dynamic_endpoint: bool,

    /// Location of the endpoint manifest (required when `dynamic_endpoint` is on)
    #[serde(default)]
    pub manifest_url: Option<String>,

    /// Manifest field holding the base URL (default: "endpoint")
    #[serde(default = "default_manifest_field")]
    pub manifest_field: String,

    /// Manifest field holding the informational message (default: "message")
    #[serde(default = "default_manifest_message_field")]
    pub manifest_message_field: String,

    /// Timeout for the manifest fetch (default: 30 seconds)
    #[serde(default = "default_manifest_timeout", with = "duration_serde")]
    pub manifest_timeout: Duration,

    /// Sign-in request shape
    #[serde(default)]
    pub auth_flavor: AuthFlavor,

    /// Referral code sent with sign-in and sync calls
    #[serde(default)]
    pub referral_code: Option<String>,

    /// Static headers added to every request (user agent and client hints are added per session)
    #[serde(default = "default_headers")]
    pub headers: HashMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            dynamic_endpoint: false,
            manifest_url: None,
            manifest_field: default_manifest_field(),
            manifest_message_field: default_manifest_message_field(),
            manifest_timeout: default_manifest_timeout(),
            auth_flavor: AuthFlavor::default(),
            referral_code: None,
            headers: default_headers(),
        }
    }
}

/// Request executor settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Retry budget for retryable failures; total attempts are `retries + 1` (default: 1)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before each retry (default: 3 seconds)
    #[serde(default = "default_request_delay", with = "duration_serde")]
    pub delay_between_requests: Duration,

    /// Extra cool-down after an HTTP 429, on top of the regular delay (default: 60 seconds)
    #[serde(default = "default_rate_limit_cooldown", with = "duration_serde")]
    pub rate_limit_cooldown: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: default_request_timeout(),
            retries: default_retries(),
            delay_between_requests: default_request_delay(),
            rate_limit_cooldown: default_rate_limit_cooldown(),
        }
    }
}

/// Per-account proxy settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Route every session through its own proxy (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// IP echo service used to verify each proxy before the session starts
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip_lookup_url: default_ip_lookup_url(),
        }
    }
}

/// Session state machine settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Acquire and cache a bearer token before syncing (default: true)
    #[serde(default = "default_true")]
    pub authenticate: bool,

    /// Claim uncompleted catalog tasks (default: true)
    #[serde(default = "default_true")]
    pub auto_tasks: bool,

    /// Fixed task catalog compared against the remote claimed-task list
    #[serde(default = "default_task_catalog")]
    pub tasks: Vec<TaskRecord>,

    /// Social task categories to list and claim (empty disables the social path)
    #[serde(default)]
    pub social_categories: Vec<String>,

    /// Task ids never claimed
    #[serde(default)]
    pub skip_tasks: Vec<String>,

    /// Lower bound of the randomized start delay in proxy mode (default: 1 second)
    #[serde(default = "default_start_delay_min", with = "duration_serde")]
    pub start_delay_min: Duration,

    /// Upper bound of the randomized start delay in proxy mode (default: 15 seconds)
    #[serde(default = "default_start_delay_max", with = "duration_serde")]
    pub start_delay_max: Duration,

    /// Pause before each task claim and before the node trigger (default: 1 second)
    #[serde(default = "default_step_delay", with = "duration_serde")]
    pub step_delay: Duration,

    /// Minimum age of the remote start timestamp before the node is restarted (default: 9 hours)
    #[serde(default = "default_node_restart_after", with = "duration_serde")]
    pub node_restart_after: Duration,

    /// Extra attempts for the user sync step (default: 1)
    #[serde(default = "default_sync_retries")]
    pub sync_retries: u32,

    /// Wall-clock budget for one session (default: 24 hours)
    #[serde(default = "default_session_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authenticate: true,
            auto_tasks: true,
            tasks: default_task_catalog(),
            social_categories: Vec::new(),
            skip_tasks: Vec::new(),
            start_delay_min: default_start_delay_min(),
            start_delay_max: default_start_delay_max(),
            step_delay: default_step_delay(),
            node_restart_after: default_node_restart_after(),
            sync_retries: default_sync_retries(),
            timeout: default_session_timeout(),
        }
    }
}

/// Batch scheduler and outer loop settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sessions per batch when proxy mode is on (default: 10)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Sessions per batch when running without proxies (default: 10)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_no_proxy: usize,

    /// Pause between consecutive batches (default: 3 seconds)
    #[serde(default = "default_batch_pause", with = "duration_serde")]
    pub batch_pause: Duration,

    /// Sleep between full passes over all accounts (default: 60 minutes)
    #[serde(default = "default_loop_interval", with = "duration_serde")]
    pub loop_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_concurrent_no_proxy: default_max_concurrent(),
            batch_pause: default_batch_pause(),
            loop_interval: default_loop_interval(),
        }
    }
}

/// Local file locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Token mapping keyed by address (default: "tokens.json")
    #[serde(default = "default_tokens_path")]
    pub tokens_path: PathBuf,

    /// User-agent binding keyed by address (default: "session_user_agents.json")
    #[serde(default = "default_user_agents_path")]
    pub user_agents_path: PathBuf,

    /// One account record per line (default: "accounts.txt")
    #[serde(default = "default_accounts_path")]
    pub accounts_path: PathBuf,

    /// One proxy URL per line (default: "proxy.txt")
    #[serde(default = "default_proxies_path")]
    pub proxies_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            tokens_path: default_tokens_path(),
            user_agents_path: default_user_agents_path(),
            accounts_path: default_accounts_path(),
            proxies_path: default_proxies_path(),
        }
    }
}

/// Main configuration
///
/// Every field has a default, so an empty JSON object is a valid config file
/// apart from the base URL, which [`Config::validate`] insists on when
/// dynamic endpoint resolution is off.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API and endpoint resolution
    #[serde(default)]
    pub api: ApiConfig,

    /// Request executor policy
    #[serde(default)]
    pub request: RequestConfig,

    /// Proxy mode
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Session behavior
    #[serde(default)]
    pub session: SessionConfig,

    /// Batching and the outer loop
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// File locations
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load a config file, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| Error::Config {
                message: format!("failed to parse {}: {}", path.display(), e),
                key: None,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Reject settings the run cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent == 0 {
            return Err(Error::config(
                "scheduler.max_concurrent",
                "concurrency limit must be at least 1",
            ));
        }
        if self.scheduler.max_concurrent_no_proxy == 0 {
            return Err(Error::config(
                "scheduler.max_concurrent_no_proxy",
                "concurrency limit must be at least 1",
            ));
        }
        if self.session.start_delay_min > self.session.start_delay_max {
            return Err(Error::config(
                "session.start_delay_min",
                "start delay lower bound exceeds upper bound",
            ));
        }
        if self.api.dynamic_endpoint {
            match &self.api.manifest_url {
                Some(manifest) => {
                    url::Url::parse(manifest).map_err(|e| {
                        Error::config("api.manifest_url", format!("invalid URL: {}", e))
                    })?;
                }
                None => {
                    return Err(Error::config(
                        "api.manifest_url",
                        "dynamic endpoint resolution needs a manifest URL",
                    ));
                }
            }
        } else {
            url::Url::parse(&self.api.base_url)
                .map_err(|e| Error::config("api.base_url", format!("invalid URL: {}", e)))?;
        }
        if self.proxy.enabled {
            url::Url::parse(&self.proxy.ip_lookup_url)
                .map_err(|e| Error::config("proxy.ip_lookup_url", format!("invalid URL: {}", e)))?;
        }
        Ok(())
    }

    /// Batch size for the current proxy mode
    pub fn concurrency_limit(&self) -> usize {
        if self.proxy.enabled {
            self.scheduler.max_concurrent
        } else {
            self.scheduler.max_concurrent_no_proxy
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_manifest_field() -> String {
    "endpoint".to_string()
}

fn default_manifest_message_field() -> String {
    "message".to_string()
}

fn default_manifest_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_headers() -> HashMap<String, String> {
    HashMap::from([
        (
            "accept".to_string(),
            "application/json, text/plain, */*".to_string(),
        ),
        ("accept-language".to_string(), "en-US,en;q=0.9".to_string()),
        ("content-type".to_string(), "application/json".to_string()),
    ])
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_retries() -> u32 {
    1
}

fn default_request_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_rate_limit_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_ip_lookup_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

fn default_task_catalog() -> Vec<TaskRecord> {
    vec![
        TaskRecord::new("task001", "Follow on X"),
        TaskRecord::new("task002", "Like this post"),
        TaskRecord::new("task003", "Retweet this post"),
    ]
}

fn default_start_delay_min() -> Duration {
    Duration::from_secs(1)
}

fn default_start_delay_max() -> Duration {
    Duration::from_secs(15)
}

fn default_step_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_node_restart_after() -> Duration {
    Duration::from_secs(9 * 60 * 60)
}

fn default_sync_retries() -> u32 {
    1
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_max_concurrent() -> usize {
    10
}

fn default_batch_pause() -> Duration {
    Duration::from_secs(3)
}

fn default_loop_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_tokens_path() -> PathBuf {
    PathBuf::from("tokens.json")
}

fn default_user_agents_path() -> PathBuf {
    PathBuf::from("session_user_agents.json")
}

fn default_accounts_path() -> PathBuf {
    PathBuf::from("accounts.txt")
}

fn default_proxies_path() -> PathBuf {
    PathBuf::from("proxy.txt")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn static_config() -> Config {
        let mut config = Config::default();
        config.api.base_url = "https://api.example.com".to_string();
        config
    }

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.request.timeout, Duration::from_secs(60));
        assert_eq!(config.request.retries, 1);
        assert_eq!(config.request.rate_limit_cooldown, Duration::from_secs(60));
        assert_eq!(
            config.session.node_restart_after,
            Duration::from_secs(9 * 3600)
        );
        assert_eq!(config.session.timeout, Duration::from_secs(24 * 3600));
        assert_eq!(config.scheduler.batch_pause, Duration::from_secs(3));
        assert_eq!(config.session.tasks.len(), 3);
        assert!(!config.proxy.enabled);
        assert_eq!(config.api.auth_flavor, AuthFlavor::UserUpsert);
    }

    #[test]
    fn durations_are_read_as_seconds() {
        let json = r#"{
            "request": { "timeout": 5, "delay_between_requests": 0 },
            "scheduler": { "loop_interval": 120 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.request.timeout, Duration::from_secs(5));
        assert_eq!(config.request.delay_between_requests, Duration::ZERO);
        assert_eq!(config.scheduler.loop_interval, Duration::from_secs(120));
    }

    #[test]
    fn duration_serde_rejects_string_instead_of_integer() {
        let json = r#"{ "request": { "timeout": "60s" } }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn auth_flavor_selects_path() {
        let config: Config = serde_json::from_str(r#"{ "api": { "auth_flavor": "login" } }"#).unwrap();
        assert_eq!(config.api.auth_flavor, AuthFlavor::Login);
        assert_eq!(AuthFlavor::Login.path(), "/user/login");
        assert_eq!(AuthFlavor::UserUpsert.path(), "/user");
    }

    #[test]
    fn validate_accepts_static_base_url() {
        static_config().validate().unwrap();
    }

    #[test]
    fn validate_rejects_missing_base_url() {
        let err = Config::default().validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("api.base_url")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_requires_manifest_url_in_dynamic_mode() {
        let mut config = static_config();
        config.api.dynamic_endpoint = true;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "api.manifest_url"));

        config.api.manifest_url = Some("https://example.com/endpoints.json".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = static_config();
        config.scheduler.max_concurrent_no_proxy = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_start_delay() {
        let mut config = static_config();
        config.session.start_delay_min = Duration::from_secs(10);
        config.session.start_delay_max = Duration::from_secs(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn concurrency_limit_follows_proxy_mode() {
        let mut config = static_config();
        config.scheduler.max_concurrent = 4;
        config.scheduler.max_concurrent_no_proxy = 2;

        assert_eq!(config.concurrency_limit(), 2);
        config.proxy.enabled = true;
        assert_eq!(config.concurrency_limit(), 4);
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.request.retries, 1);
    }

    #[test]
    fn load_reports_parse_errors_as_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = static_config();
        config.session.social_categories = vec!["PARTNERS".to_string()];
        config.api.referral_code = Some("REF123".to_string());

        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(back.api.base_url, config.api.base_url);
        assert_eq!(back.session.social_categories, vec!["PARTNERS".to_string()]);
        assert_eq!(back.api.referral_code.as_deref(), Some("REF123"));
    }
}
