//! Persistent user-agent binding per account

use super::JsonStore;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Address to user-agent mapping, stable across restarts
///
/// The first lookup loads the file into memory; every new binding is written
/// back before it is returned. The cache lock is held across the
/// load-create-save sequence, so two sessions can never bind different agents
/// to the same address.
#[derive(Debug)]
pub struct UserAgentStore {
    file: JsonStore<String>,
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl UserAgentStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonStore::new(path),
            cache: Mutex::new(None),
        }
    }

    /// Bound user agent for `address`, if any
    pub async fn get(&self, address: &str) -> Result<Option<String>> {
        let mut cache = self.cache.lock().await;
        let entries = self.loaded(&mut cache).await?;
        Ok(entries.get(address).cloned())
    }

    /// Bind `user_agent` to `address` and persist the whole mapping
    pub async fn set(&self, address: &str, user_agent: impl Into<String>) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let entries = self.loaded(&mut cache).await?;
        entries.insert(address.to_string(), user_agent.into());
        self.file.save(entries).await
    }

    /// Bound user agent for `address`, creating and persisting one on first use
    pub async fn get_or_create<F>(&self, address: &str, create: F) -> Result<String>
    where
        F: FnOnce() -> String,
    {
        let mut cache = self.cache.lock().await;
        let entries = self.loaded(&mut cache).await?;

        if let Some(existing) = entries.get(address) {
            return Ok(existing.clone());
        }

        let user_agent = create();
        entries.insert(address.to_string(), user_agent.clone());
        self.file.save(entries).await?;
        tracing::debug!(address, "bound new user agent");
        Ok(user_agent)
    }

    /// Number of bound addresses
    pub async fn len(&self) -> Result<usize> {
        let mut cache = self.cache.lock().await;
        Ok(self.loaded(&mut cache).await?.len())
    }

    /// Whether no address is bound yet
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn loaded<'a>(
        &self,
        cache: &'a mut Option<BTreeMap<String, String>>,
    ) -> Result<&'a mut BTreeMap<String, String>> {
        if cache.is_none() {
            *cache = Some(self.file.load().await?);
        }
        Ok(cache.get_or_insert_with(BTreeMap::new))
    }
}
