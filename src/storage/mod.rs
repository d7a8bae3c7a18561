pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde_json::Value;

use self::memory::MemoryStore;

/// Remote key/value access scoped to the team. Both operations are
/// asynchronous; the backend is assumed to serialize writes to the same key
/// (last-write-wins per key, no finer-grained merge).
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read a value, `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Replace the value under `key` in full.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// Device-local key/value access, synchronous and exclusively owned by this
/// client. Keyed by `prefix-userId-boardId` strings.
pub trait PrivateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    #[error("remote operation failed: {0}")]
    Remote(String),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The shared tier the engine talks to, decided once at startup.
///
/// `LocalOnly` is the degraded mode used when no remote adapter is available
/// or the adapter fails its initial probe: shared state then lives in memory
/// for the session and is never synchronized with other clients.
#[derive(Clone)]
pub enum SharedTier {
    RemoteBacked(Arc<dyn SharedStore>),
    LocalOnly(Arc<MemoryStore>),
}

impl SharedTier {
    /// Capability negotiation: probe the adapter with a single read and fall
    /// back to the in-memory tier when it is absent or unreachable.
    pub async fn negotiate(adapter: Option<Arc<dyn SharedStore>>) -> Self {
        match adapter {
            Some(adapter) => match adapter.get(crate::types::KEY_BOARDS).await {
                Ok(_) => SharedTier::RemoteBacked(adapter),
                Err(e) => {
                    warn!("shared store probe failed, running local-only: {e}");
                    SharedTier::LocalOnly(Arc::new(MemoryStore::new()))
                }
            },
            None => {
                warn!("no shared store configured, running local-only");
                SharedTier::LocalOnly(Arc::new(MemoryStore::new()))
            }
        }
    }

    /// Wrap a concrete adapter without probing. Mostly useful in tests.
    pub fn remote(adapter: Arc<dyn SharedStore>) -> Self {
        SharedTier::RemoteBacked(adapter)
    }

    pub fn local_only() -> Self {
        SharedTier::LocalOnly(Arc::new(MemoryStore::new()))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SharedTier::RemoteBacked(_))
    }

    /// Read a shared value. Failures are logged and read as absence so no
    /// storage error ever reaches the caller.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let result = match self {
            SharedTier::RemoteBacked(s) => s.get(key).await,
            SharedTier::LocalOnly(s) => s.get(key).await,
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("shared read of {key} failed: {e}");
                None
            }
        }
    }

    /// Write a shared value. Failures are logged and swallowed; in-memory
    /// state is never rolled back on a failed write, the next poll adopts
    /// whatever the remote store actually holds.
    pub async fn set(&self, key: &str, value: Value) {
        let result = match self {
            SharedTier::RemoteBacked(s) => s.set(key, value).await,
            SharedTier::LocalOnly(s) => s.set(key, value).await,
        };
        if let Err(e) = result {
            warn!("shared write of {key} failed: {e}");
        }
    }
}
