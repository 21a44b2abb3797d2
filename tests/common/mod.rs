//! Common test utilities for session-fleet integration tests

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use session_fleet::Config;
use std::path::Path;
use std::time::Duration;

/// Three well-formed account addresses
pub const ACCOUNTS: [&str; 3] = [
    "0x1000000000000000000000000000000000000001",
    "0x2000000000000000000000000000000000000002",
    "0x3000000000000000000000000000000000000003",
];

/// Unsigned JWT whose `exp` claim is `exp` (unix seconds)
pub fn jwt_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(json!({ "exp": exp }).to_string());
    format!("{header}.{claims}.sig")
}

/// Config pointing every file into `dir` and the API at `base_url`, with no pacing delays
pub fn fast_config(dir: &Path, base_url: &str) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.request.timeout = Duration::from_secs(5);
    config.request.retries = 0;
    config.request.delay_between_requests = Duration::ZERO;
    config.request.rate_limit_cooldown = Duration::ZERO;
    config.session.step_delay = Duration::ZERO;
    config.session.start_delay_min = Duration::ZERO;
    config.session.start_delay_max = Duration::ZERO;
    config.scheduler.batch_pause = Duration::ZERO;
    config.persistence.tokens_path = dir.join("tokens.json");
    config.persistence.user_agents_path = dir.join("session_user_agents.json");
    config.persistence.accounts_path = dir.join("accounts.txt");
    config.persistence.proxies_path = dir.join("proxy.txt");
    config
}

/// Write the account input file
pub fn write_accounts(config: &Config, accounts: &[&str]) {
    std::fs::write(&config.persistence.accounts_path, accounts.join("\n"))
        .expect("write accounts file");
}

/// Parsed content of a JSON store file
pub fn read_store(path: &Path) -> serde_json::Map<String, Value> {
    let content = std::fs::read_to_string(path).expect("read store file");
    match serde_json::from_str(&content).expect("store file is JSON") {
        Value::Object(map) => map,
        other => panic!("store file is not an object: {other}"),
    }
}
