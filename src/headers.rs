//! User-agent catalog, device platform detection, and client-hint headers

use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use regex::{Regex, RegexBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Mobile WebView user agents a new account binding is drawn from
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (iPad; CPU OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8 Build/AP2A.240805.005; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.103 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-S918B Build/TP1A.220624.014; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.64 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; M2101K20G Build/SKQ1.211006.001; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/126.0.6478.134 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; SM-A546E Build/UP1A.231005.007; wv) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.103 Mobile Safari/537.36",
];

/// Pick a random user agent from [`USER_AGENTS`]
pub fn random_user_agent() -> String {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

/// Device platform advertised in the client-hint headers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    /// iPhone or iPad
    Ios,
    /// Android phone or tablet
    Android,
    /// Anything else
    Unknown,
}

impl Platform {
    /// Tag used in the `sec-ch-ua` headers
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive user-agent pattern matcher
///
/// Rules are checked in order; the first match wins.
#[derive(Debug)]
pub struct PlatformDetector {
    rules: Vec<(Regex, Platform)>,
}

impl PlatformDetector {
    /// Build the detector with the default iPhone / Android / iPad rules
    pub fn new() -> Result<Self> {
        let patterns = [
            ("iPhone", Platform::Ios),
            ("Android", Platform::Android),
            ("iPad", Platform::Ios),
        ];

        let rules = patterns
            .into_iter()
            .map(|(pattern, platform)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, platform))
                    .map_err(|e| Error::Other(format!("invalid platform pattern {pattern}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Platform for a user-agent string
    pub fn detect(&self, user_agent: &str) -> Platform {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(user_agent))
            .map(|(_, platform)| *platform)
            .unwrap_or(Platform::Unknown)
    }
}

/// Synthesized `sec-ch-ua` value for a WebView on the given platform
pub fn client_hint(platform: Platform) -> String {
    format!(
        r#""Not)A;Brand";v="99", "{platform} WebView";v="127", "Chromium";v="127""#
    )
}

/// Full outgoing header set for one session
///
/// Static headers from configuration come first; the user agent and the
/// client-hint headers always override them.
pub fn build_headers(
    static_headers: &HashMap<String, String>,
    user_agent: &str,
    platform: Platform,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in static_headers {
        insert_header(&mut headers, name, value)?;
    }

    insert_header(&mut headers, "user-agent", user_agent)?;
    insert_header(&mut headers, "sec-ch-ua", &client_hint(platform))?;
    insert_header(&mut headers, "sec-ch-ua-mobile", "?1")?;
    insert_header(
        &mut headers,
        "sec-ch-ua-platform",
        &format!("\"{platform}\""),
    )?;

    Ok(headers)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::config("api.headers", format!("invalid header name {name}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::config("api.headers", format!("invalid value for {name}: {e}")))?;
    headers.insert(name, value);
    Ok(())
}
