// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

pub mod memory;
pub mod redis_store;

use stratus_api::entity::{Entity, EntityLog};
use stratus_api::persistence::{Persistence, PersistenceError};

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum PersistenceType {
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PersistenceSettings {
    #[serde(rename = "type")]
    pub persistence_type: PersistenceType,
    #[serde(default)]
    pub redis_url: String,
}

/// Create the persistence backend selected in the settings.
pub async fn new_persistence(settings: &PersistenceSettings) -> anyhow::Result<std::sync::Arc<dyn Persistence>> {
    match settings.persistence_type {
        PersistenceType::Memory => {
            log::info!("using in-memory persistence: records are lost on exit");
            Ok(std::sync::Arc::new(memory::MemoryPersistence::new()))
        }
        PersistenceType::Redis => Ok(std::sync::Arc::new(redis_store::RedisPersistence::new(&settings.redis_url).await?)),
    }
}

fn encode<E: Entity>(entity: &E) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(entity).map_err(|err| PersistenceError::Backend(format!("could not encode {}: {}", E::KIND, err)))
}

fn decode<E: Entity>(raw: &[u8]) -> Result<E, PersistenceError> {
    serde_json::from_slice(raw).map_err(|err| PersistenceError::Backend(format!("could not decode {}: {}", E::KIND, err)))
}

/// Typed access to the records, keyed by their identity.
#[derive(Clone)]
pub struct Store {
    persistence: std::sync::Arc<dyn Persistence>,
}

impl Store {
    pub fn new(persistence: std::sync::Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Insert a new record, failing if one with the same identity exists.
    pub async fn add<E: Entity>(&self, entity: &mut E) -> Result<(), PersistenceError> {
        entity.set_modified_at();
        self.persistence.add(E::KIND, entity.identity(), encode(entity)?).await
    }

    pub async fn update<E: Entity>(&self, entity: &mut E) -> Result<(), PersistenceError> {
        entity.set_modified_at();
        self.persistence.update(E::KIND, entity.identity(), encode(entity)?).await
    }

    pub async fn save<E: Entity>(&self, entity: &mut E) -> Result<(), PersistenceError> {
        entity.set_modified_at();
        self.persistence.save(E::KIND, entity.identity(), encode(entity)?).await
    }

    pub async fn delete<E: Entity>(&self, id: &str) -> Result<(), PersistenceError> {
        self.persistence.delete(E::KIND, id).await
    }

    /// Retrieve a record together with its audit log.
    pub async fn get_by_id<E: Entity>(&self, id: &str) -> Result<E, PersistenceError> {
        let mut entity: E = decode(&self.persistence.get(E::KIND, id).await?)?;
        entity.attach_log(self.persistence.logs(E::KIND, id).await?);
        Ok(entity)
    }

    /// Retrieve a record, if present.
    pub async fn find<E: Entity>(&self, id: &str) -> Result<Option<E>, PersistenceError> {
        match self.get_by_id(id).await {
            Ok(entity) => Ok(Some(entity)),
            Err(PersistenceError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn get_all<E: Entity>(&self) -> Result<Vec<E>, PersistenceError> {
        self.persistence.get_all(E::KIND).await?.iter().map(|raw| decode(raw)).collect()
    }

    pub async fn append_log<E: Entity>(&self, id: &str, log: EntityLog) -> Result<(), PersistenceError> {
        self.persistence.append_log(E::KIND, id, log).await
    }

    /// Append a log entry, reporting but otherwise ignoring failures.
    pub async fn append_log_best_effort<E: Entity>(&self, id: &str, state: &str, message: &str) {
        if let Err(err) = self.append_log::<E>(id, EntityLog::new(state, message)).await {
            log::warn!("could not append log '{}' to {} {}: {}", state, E::KIND, id, err);
        }
    }
}
