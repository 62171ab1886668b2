// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use crate::transport::{topic_matches, Delivery, DeliveryReceiver, Transport};

struct Subscription {
    pattern: String,
    group: String,
    members: Vec<futures::channel::mpsc::UnboundedSender<Delivery>>,
    next: usize,
}

impl Subscription {
    /// Deliver to the next member of the group, dropping members that went away.
    fn deliver(&mut self, delivery: &Delivery) -> bool {
        while !self.members.is_empty() {
            let pos = self.next % self.members.len();
            match self.members[pos].unbounded_send(delivery.clone()) {
                Ok(_) => {
                    self.next = pos + 1;
                    return true;
                }
                Err(_) => {
                    self.members.remove(pos);
                }
            }
        }
        false
    }
}

/// In-process bus, used when all the components live in the same process
/// and in tests.
#[derive(Clone, Default)]
pub struct LocalBus {
    subscriptions: std::sync::Arc<tokio::sync::Mutex<Vec<Subscription>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Transport for LocalBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        let delivery = (topic.to_string(), payload);
        let mut subscriptions = self.subscriptions.lock().await;
        let mut delivered = 0;
        for subscription in subscriptions.iter_mut() {
            if topic_matches(&subscription.pattern, topic) && subscription.deliver(&delivery) {
                delivered += 1;
            }
        }
        subscriptions.retain(|s| !s.members.is_empty());
        if delivered == 0 {
            log::debug!("no subscribers for topic {}", topic);
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, group: &str) -> anyhow::Result<DeliveryReceiver> {
        anyhow::ensure!(!pattern.is_empty(), "empty subscription pattern");
        let (sender, receiver) = futures::channel::mpsc::unbounded();
        let mut subscriptions = self.subscriptions.lock().await;
        let existing = match group.is_empty() {
            true => None,
            false => subscriptions.iter_mut().find(|s| s.group == group && s.pattern == pattern),
        };
        match existing {
            Some(subscription) => subscription.members.push(sender),
            None => subscriptions.push(Subscription {
                pattern: pattern.to_string(),
                group: group.to_string(),
                members: vec![sender],
                next: 0,
            }),
        }
        Ok(receiver)
    }
}
