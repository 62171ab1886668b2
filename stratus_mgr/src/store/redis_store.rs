// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use redis::AsyncCommands;
use stratus_api::entity::EntityLog;
use stratus_api::persistence::{Persistence, PersistenceError};

/// Records stored in Redis.
///
/// The following keys are written:
/// - stratus:KIND:ID, the JSON record
/// - stratus:KIND, the set of the identifiers of a kind
/// - stratus:log:KIND:ID, the list of the JSON log entries of a record
///
/// Conditional writes use `SET NX` and `SET XX`.
#[derive(Clone)]
pub struct RedisPersistence {
    connection: redis::aio::MultiplexedConnection,
}

fn record_key(kind: &str, id: &str) -> String {
    format!("stratus:{}:{}", kind, id)
}

fn index_key(kind: &str) -> String {
    format!("stratus:{}", kind)
}

fn log_key(kind: &str, id: &str) -> String {
    format!("stratus:log:{}:{}", kind, id)
}

fn backend(err: redis::RedisError) -> PersistenceError {
    PersistenceError::Backend(err.to_string())
}

impl RedisPersistence {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        log::info!("creating Redis persistence at URL {}", redis_url);
        let connection = redis::Client::open(redis_url)?.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }

    /// SET with a condition flag, returning whether the value was written.
    async fn set_conditional(&self, key: &str, value: Vec<u8>, condition: &str) -> Result<bool, PersistenceError> {
        let mut connection = self.connection.clone();
        let res: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg(condition)
            .query_async(&mut connection)
            .await
            .map_err(backend)?;
        Ok(res.is_some())
    }
}

#[async_trait::async_trait]
impl Persistence for RedisPersistence {
    async fn add(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        if !self.set_conditional(&record_key(kind, id), value, "NX").await? {
            return Err(PersistenceError::already_exists(kind, id));
        }
        let mut connection = self.connection.clone();
        let _: usize = connection.sadd(index_key(kind), id).await.map_err(backend)?;
        Ok(())
    }

    async fn update(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        match self.set_conditional(&record_key(kind, id), value, "XX").await? {
            true => Ok(()),
            false => Err(PersistenceError::not_found(kind, id)),
        }
    }

    async fn save(&self, kind: &str, id: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        let mut connection = self.connection.clone();
        redis::pipe()
            .set(record_key(kind, id), value)
            .ignore()
            .sadd(index_key(kind), id)
            .ignore()
            .query_async::<()>(&mut connection)
            .await
            .map_err(backend)
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), PersistenceError> {
        let mut connection = self.connection.clone();
        let removed: usize = connection.del(record_key(kind, id)).await.map_err(backend)?;
        let _: usize = connection.srem(index_key(kind), id).await.map_err(backend)?;
        let _: usize = connection.del(log_key(kind, id)).await.map_err(backend)?;
        match removed {
            0 => Err(PersistenceError::not_found(kind, id)),
            _ => Ok(()),
        }
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Vec<u8>, PersistenceError> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = connection.get(record_key(kind, id)).await.map_err(backend)?;
        value.ok_or_else(|| PersistenceError::not_found(kind, id))
    }

    async fn get_all(&self, kind: &str) -> Result<Vec<Vec<u8>>, PersistenceError> {
        let mut connection = self.connection.clone();
        let mut ids: Vec<String> = connection.smembers(index_key(kind)).await.map_err(backend)?;
        ids.sort();
        let mut values = vec![];
        for id in ids {
            let value: Option<Vec<u8>> = connection.get(record_key(kind, &id)).await.map_err(backend)?;
            match value {
                Some(value) => values.push(value),
                None => log::debug!("stale index entry {}:{}", kind, id),
            }
        }
        Ok(values)
    }

    async fn append_log(&self, kind: &str, id: &str, log: EntityLog) -> Result<(), PersistenceError> {
        let mut connection = self.connection.clone();
        let exists: bool = connection.exists(record_key(kind, id)).await.map_err(backend)?;
        if !exists {
            return Err(PersistenceError::not_found(kind, id));
        }
        let entry = serde_json::to_string(&log).map_err(|err| PersistenceError::Backend(err.to_string()))?;
        let _: usize = connection.rpush(log_key(kind, id), entry).await.map_err(backend)?;
        Ok(())
    }

    async fn logs(&self, kind: &str, id: &str) -> Result<Vec<EntityLog>, PersistenceError> {
        let mut connection = self.connection.clone();
        let entries: Vec<String> = connection.lrange(log_key(kind, id), 0, -1).await.map_err(backend)?;
        Ok(entries
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(log) => Some(log),
                Err(err) => {
                    log::warn!("skipping malformed log entry of {}:{}: {}", kind, id, err);
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!("stratus:function:hello", record_key("function", "hello"));
        assert_eq!("stratus:function", index_key("function"));
        assert_eq!("stratus:log:function:hello", log_key("function", "hello"));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_redis_persistence() {
        let persistence = match RedisPersistence::new("redis://127.0.0.1:6379").await {
            Ok(persistence) => persistence,
            Err(err) => {
                println!("could not connect to Redis, bailing out of the test: {}", err);
                return;
            }
        };
        let kind = format!("test-{}", uuid::Uuid::new_v4());
        persistence.add(&kind, "a", b"{}".to_vec()).await.unwrap();
        assert!(matches!(
            persistence.add(&kind, "a", b"{}".to_vec()).await,
            Err(PersistenceError::AlreadyExists { .. })
        ));
        assert!(matches!(
            persistence.update(&kind, "b", b"{}".to_vec()).await,
            Err(PersistenceError::NotFound { .. })
        ));
        persistence.append_log(&kind, "a", EntityLog::new("saved", "")).await.unwrap();
        assert_eq!(1, persistence.logs(&kind, "a").await.unwrap().len());
        assert_eq!(1, persistence.get_all(&kind).await.unwrap().len());
        persistence.delete(&kind, "a").await.unwrap();
        assert!(persistence.get_all(&kind).await.unwrap().is_empty());
    }
}
