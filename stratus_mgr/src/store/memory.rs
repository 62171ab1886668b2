// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::entity::EntityLog;
use stratus_api::persistence::{Persistence, PersistenceError};

#[derive(Default)]
struct MemoryPersistenceInner {
    records: std::collections::HashMap<String, std::collections::BTreeMap<String, Vec<u8>>>,
    logs: std::collections::HashMap<(String, String), Vec<EntityLog>>,
}

/// Records kept in memory, all operations under a single lock.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    inner: std::sync::Arc<tokio::sync::Mutex<MemoryPersistenceInner>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Persistence for MemoryPersistence {
    async fn add(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        let bucket = inner.records.entry(kind.to_string()).or_default();
        if bucket.contains_key(id) {
            return Err(PersistenceError::already_exists(kind, id));
        }
        bucket.insert(id.to_string(), value);
        Ok(())
    }

    async fn update(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        match inner.records.get_mut(kind).and_then(|bucket| bucket.get_mut(id)) {
            Some(record) => {
                *record = value;
                Ok(())
            }
            None => Err(PersistenceError::not_found(kind, id)),
        }
    }

    async fn save(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        self.inner.lock().await.records.entry(kind.to_string()).or_default().insert(id.to_string(), value);
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        match inner.records.get_mut(kind).and_then(|bucket| bucket.remove(id)) {
            Some(_) => {
                inner.logs.remove(&(kind.to_string(), id.to_string()));
                Ok(())
            }
            None => Err(PersistenceError::not_found(kind, id)),
        }
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Vec<u8>, PersistenceError> {
        match self.inner.lock().await.records.get(kind).and_then(|bucket| bucket.get(id)) {
            Some(record) => Ok(record.clone()),
            None => Err(PersistenceError::not_found(kind, id)),
        }
    }

    async fn get_all(&self, kind: &str) -> Result<Vec<Vec<u8>>, PersistenceError> {
        Ok(match self.inner.lock().await.records.get(kind) {
            Some(bucket) => bucket.values().cloned().collect(),
            None => vec![],
        })
    }

    async fn append_log(&self, kind: &str, id: &str, log: EntityLog) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        if !inner.records.get(kind).is_some_and(|bucket| bucket.contains_key(id)) {
            return Err(PersistenceError::not_found(kind, id));
        }
        inner.logs.entry((kind.to_string(), id.to_string())).or_default().push(log);
        Ok(())
    }

    async fn logs(&self, kind: &str, id: &str) -> Result<Vec<EntityLog>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .await
            .logs
            .get(&(kind.to_string(), id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
