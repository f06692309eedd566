use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{FanoutError, FanoutStore};

/// In-process store, used when no remote chat store is configured and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<BTreeMap<String, Value>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.documents
            .read()
            .ok()
            .and_then(|docs| docs.get(path).cloned())
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.documents
            .read()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    /// Paths directly or transitively below `prefix`.
    pub fn children(&self, prefix: &str) -> Vec<String> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        self.snapshot()
            .into_keys()
            .filter(|path| path.starts_with(&prefix))
            .collect()
    }

    fn check(&self) -> Result<(), FanoutError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FanoutError::Unavailable("memory store is failing writes".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl FanoutStore for MemoryStore {
    async fn set(&self, path: &str, document: Value) -> Result<(), FanoutError> {
        self.check()?;
        let mut docs = self
            .documents
            .write()
            .map_err(|_| FanoutError::Unavailable("lock poisoned".to_owned()))?;
        docs.insert(path.trim_matches('/').to_owned(), document);
        Ok(())
    }

    async fn push(&self, path: &str) -> Result<String, FanoutError> {
        self.check()?;
        let key = Uuid::now_v7().simple().to_string();
        let mut docs = self
            .documents
            .write()
            .map_err(|_| FanoutError::Unavailable("lock poisoned".to_owned()))?;
        docs.insert(format!("{}/{key}", path.trim_matches('/')), Value::Null);
        Ok(key)
    }
}
