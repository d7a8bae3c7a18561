/// In-memory stores: the local-only shared tier and the test double for the
/// private tier. Interior mutability so both sides share one instance.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{PrivateStore, SharedStore, StorageError};

/// In-memory shared store. Backs [`super::SharedTier::LocalOnly`]; also
/// stands in for the remote store in tests.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

/// In-memory private store.
#[derive(Default)]
pub struct MemoryPrivateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPrivateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrivateStore for MemoryPrivateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
