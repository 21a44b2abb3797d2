//! File-backed keyed stores
//!
//! Both persisted mappings (tokens and user agents) are JSON objects keyed by
//! account address. [`JsonStore`] owns the file format; the typed stores on
//! top of it define when the file is read and written:
//!
//! - [`UserAgentStore`] is read-through and write-through with an in-memory
//!   cache, shared by every session of the process.
//! - [`TokenStore`] is reloaded into an immutable [`TokenSnapshot`] once per
//!   outer-loop iteration. Writes go through a single [`TokenWriter`] task so
//!   concurrent sessions never interleave file rewrites.

mod tokens;
mod user_agents;

pub use tokens::{TokenSnapshot, TokenStore, TokenWriter, spawn_token_writer};
pub use user_agents::UserAgentStore;

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A JSON object on disk mapping address to `V`
#[derive(Debug, Clone)]
pub struct JsonStore<V> {
    path: PathBuf,
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Store backed by `path`; the file is not touched until first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _value: PhantomData,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole mapping
    ///
    /// A missing or blank file is an empty mapping.
    pub async fn load(&self) -> Result<BTreeMap<String, V>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.error(format!("read failed: {e}"))),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| self.error(format!("invalid JSON: {e}")))
    }

    /// Replace the whole mapping
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// never see a half-written file.
    pub async fn save(&self, entries: &BTreeMap<String, V>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(format!("create directory failed: {e}")))?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.error(format!("write failed: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error(format!("rename failed: {e}")))?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn error(&self, reason: String) -> Error {
        Error::Store {
            path: self.path.clone(),
            reason,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
