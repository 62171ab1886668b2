// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use crate::entity::EntityLog;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: String, id: String },
    #[error("persistence backend error: {0}")]
    Backend(String),
}

impl PersistenceError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    pub fn already_exists(kind: &str, id: &str) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

/// Key-value store of JSON records, bucketed by kind.
///
/// `add` is a conditional insert: of two concurrent calls with the same
/// kind and id exactly one succeeds.
#[async_trait::async_trait]
pub trait Persistence: Sync + Send {
    async fn add(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError>;
    async fn update(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError>;
    async fn save(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError>;
    async fn delete(&self, kind: &str, id: &str) -> Result<(), PersistenceError>;
    async fn get(&self, kind: &str, id: &str) -> Result<Vec<u8>, PersistenceError>;
    async fn get_all(&self, kind: &str) -> Result<Vec<Vec<u8>>, PersistenceError>;
    async fn append_log(&self, kind: &str, id: &str, log: EntityLog) -> Result<(), PersistenceError>;
    async fn logs(&self, kind: &str, id: &str) -> Result<Vec<EntityLog>, PersistenceError>;
}
