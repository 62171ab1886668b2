// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use futures::StreamExt;
use redis::AsyncCommands;

use crate::transport::{topic_matches, DeliveryReceiver, Transport};

/// Bus on top of Redis pub/sub.
///
/// Every subscription opens its own connection with `PSUBSCRIBE`, therefore
/// consumer groups are not shared across processes: each subscriber
/// receives all the messages matching its pattern.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: redis::aio::MultiplexedConnection,
}

impl RedisBus {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        log::info!("creating Redis bus at URL {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        Ok(Self { client, publisher })
    }
}

/// Translate a bus pattern into a Redis glob, which is looser: deliveries
/// are filtered again with the exact pattern.
///
/// `#` also matches zero words, so it swallows the dot next to it:
/// `users.#` becomes `users*`, which matches the topic `users` too.
fn to_glob(pattern: &str) -> String {
    let words: Vec<&str> = pattern.split('.').collect();
    let mut glob = String::new();
    for (i, word) in words.iter().enumerate() {
        if *word == "#" {
            glob.push('*');
            continue;
        }
        if i > 0 && words[i - 1] != "#" {
            glob.push('.');
        }
        glob.push_str(word);
    }
    glob
}

#[async_trait::async_trait]
impl Transport for RedisBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        let mut connection = self.publisher.clone();
        connection.publish::<&str, Vec<u8>, ()>(topic, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, group: &str) -> anyhow::Result<DeliveryReceiver> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(to_glob(pattern)).await?;
        log::debug!("subscribed to {} (group '{}')", pattern, group);

        let (sender, receiver) = futures::channel::mpsc::unbounded();
        let pattern = pattern.to_string();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let topic = msg.get_channel_name().to_string();
                if !topic_matches(&pattern, &topic) {
                    continue;
                }
                if sender.unbounded_send((topic, msg.get_payload_bytes().to_vec())).is_err() {
                    break;
                }
            }
            log::debug!("subscription to {} closed", pattern);
        });
        Ok(receiver)
    }
}
