//! Startup input: account records, proxies, and their pairing
//!
//! Turning a raw account record into an address is left to an
//! [`IdentityDeriver`]. The built-in [`RecordDeriver`] only splits records that
//! already carry the address; key-based derivation belongs to a deriver
//! supplied by the embedding program.

use crate::error::{Error, Result};
use crate::types::{AccountIdentity, ProxyBinding};
use std::path::Path;

/// Read non-empty, trimmed lines from a text file
///
/// A missing file yields no lines. Lines starting with `#` are skipped.
pub async fn load_lines(path: &Path) -> Result<Vec<String>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "input file not found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Turns one input record into an account identity
pub trait IdentityDeriver: Send + Sync {
    /// Derive the identity for `record`, found on 1-based `line`
    fn derive(&self, line: usize, record: &str) -> Result<AccountIdentity>;
}

/// Accepts `address`, `address,secret`, or `address:secret` records
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordDeriver;

impl IdentityDeriver for RecordDeriver {
    fn derive(&self, line: usize, record: &str) -> Result<AccountIdentity> {
        let (address, secret) = match record.split_once([',', ':']) {
            Some((address, secret)) => (address.trim(), Some(secret.trim())),
            None => (record.trim(), None),
        };

        if address.is_empty() {
            return Err(Error::InvalidAccount {
                line,
                reason: "empty address".to_string(),
            });
        }

        if !is_hex_address(address) {
            let reason = if is_hex_key(address) {
                "looks like a private key; supply `address,key` or plug in a key-based deriver"
            } else {
                "expected a 0x-prefixed 40-digit hex address"
            };
            return Err(Error::InvalidAccount {
                line,
                reason: reason.to_string(),
            });
        }

        Ok(AccountIdentity {
            address: address.to_string(),
            secret_key: secret.filter(|s| !s.is_empty()).map(str::to_string),
        })
    }
}

fn is_hex_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_hex_key(s: &str) -> bool {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Load and derive every account in `path`
pub async fn load_accounts(path: &Path, deriver: &dyn IdentityDeriver) -> Result<Vec<AccountIdentity>> {
    let lines = load_lines(path).await?;
    let accounts = lines
        .iter()
        .enumerate()
        .map(|(i, record)| deriver.derive(i + 1, record))
        .collect::<Result<Vec<_>>>()?;

    if accounts.is_empty() {
        return Err(Error::NoAccounts);
    }
    Ok(accounts)
}

/// Pair accounts with proxies by index
///
/// With proxy mode off every account runs without a proxy. With it on there
/// must be at least one proxy per account; surplus proxies are ignored.
pub fn bind_proxies(
    accounts: &[AccountIdentity],
    proxies: &[String],
    enabled: bool,
) -> Result<Vec<Option<ProxyBinding>>> {
    if accounts.is_empty() {
        return Err(Error::NoAccounts);
    }

    if !enabled {
        return Ok(vec![None; accounts.len()]);
    }

    if proxies.len() < accounts.len() {
        return Err(Error::ProxyMismatch {
            accounts: accounts.len(),
            proxies: proxies.len(),
        });
    }

    Ok(proxies
        .iter()
        .take(accounts.len())
        .enumerate()
        .map(|(index, url)| {
            Some(ProxyBinding {
                index,
                url: url.clone(),
            })
        })
        .collect())
}
