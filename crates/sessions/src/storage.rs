//! Host-pluggable key-value storage.
//!
//! The kit never talks to disk or platform keychains itself. Hosts implement
//! [`KvStorage`] over whatever they have (a file, browser local storage, a
//! mobile secure store) and the session store serializes through it. The
//! in-memory implementation backs tests and throwaway wallets.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A string-to-string store with prefix listing.
///
/// Implementations must be safe for concurrent use; calls may come from
/// multiple transport tasks at once.
#[async_trait]
pub trait KvStorage: Send + Sync + 'static {
    async fn get(&self, key: &str) -> eyre::Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> eyre::Result<()>;
    async fn remove(&self, key: &str) -> eyre::Result<()>;
    /// All keys starting with `prefix`, in no particular order.
    async fn keys(&self, prefix: &str) -> eyre::Result<Vec<String>>;
}

/// Storage that lives and dies with the process.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStorage for MemoryStorage {
    async fn get(&self, key: &str) -> eyre::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> eyre::Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> eyre::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> eyre::Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
