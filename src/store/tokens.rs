//! Token persistence: per-iteration snapshots and a single writer task

use super::JsonStore;
use crate::error::{Error, Result};
use crate::token::Token;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Buffer size for pending token writes
const WRITE_CHANNEL_BUFFER: usize = 64;

/// The token file, keyed by address
#[derive(Debug, Clone)]
pub struct TokenStore {
    file: JsonStore<String>,
}

impl TokenStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonStore::new(path),
        }
    }

    /// Read the file into an immutable snapshot for one iteration
    pub async fn reload(&self) -> Result<TokenSnapshot> {
        let entries = self.file.load().await?;
        Ok(TokenSnapshot {
            entries: Arc::new(entries),
        })
    }

    /// Write one entry, keeping every other entry in the file
    async fn write_entry(&self, address: &str, token: &str) -> Result<()> {
        let mut entries = match self.file.load().await {
            Ok(entries) => entries,
            Err(Error::Store { reason, .. }) => {
                tracing::warn!(
                    path = %self.file.path().display(),
                    reason = %reason,
                    "token file unreadable, rewriting from scratch"
                );
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        entries.insert(address.to_string(), token.to_string());
        self.file.save(&entries).await
    }
}

/// Tokens as they were on disk when the iteration started
///
/// Cheap to clone; every session of the iteration shares the same map.
#[derive(Debug, Clone, Default)]
pub struct TokenSnapshot {
    entries: Arc<BTreeMap<String, String>>,
}

impl TokenSnapshot {
    /// Parsed token for `address`
    ///
    /// Entries are either the raw token or a JSON-encoded object carrying it
    /// under `token` / `accessToken`.
    pub fn get(&self, address: &str) -> Option<Token> {
        let stored = self.entries.get(address)?;
        let raw = serde_json::from_str::<serde_json::Value>(stored)
            .ok()
            .and_then(|value| crate::api::extract_token(&value))
            .unwrap_or_else(|| stored.clone());
        Some(Token::parse(raw))
    }

    /// Number of stored tokens
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no tokens
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, String>> for TokenSnapshot {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

struct WriteRequest {
    address: String,
    token: String,
    ack: oneshot::Sender<Result<()>>,
}

/// Handle for queueing token writes to the writer task
#[derive(Debug, Clone)]
pub struct TokenWriter {
    tx: mpsc::Sender<WriteRequest>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRequest")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TokenWriter {
    /// Persist `token` for `address` and wait until it is on disk
    pub async fn persist(&self, address: &str, token: &Token) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriteRequest {
                address: address.to_string(),
                token: token.as_str().to_string(),
                ack,
            })
            .await
            .map_err(|_| Error::Other("token writer stopped".to_string()))?;

        done.await
            .map_err(|_| Error::Other("token writer dropped the request".to_string()))?
    }
}

/// Spawn the task that owns all writes to the token file
///
/// Requests are applied one at a time in arrival order. The task exits when
/// every [`TokenWriter`] is dropped or `cancel` fires.
pub fn spawn_token_writer(
    store: TokenStore,
    cancel: CancellationToken,
) -> (TokenWriter, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<WriteRequest>(WRITE_CHANNEL_BUFFER);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(request) = msg else {
                        break;
                    };
                    let result = store.write_entry(&request.address, &request.token).await;
                    if let Err(e) = &result {
                        tracing::error!(address = %request.address, error = %e, "failed to persist token");
                    }
                    // The session may have been cancelled while waiting
                    request.ack.send(result).ok();
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }
        tracing::debug!("token writer stopped");
    });

    (TokenWriter { tx }, handle)
}
