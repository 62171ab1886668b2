// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use crate::{MessageEnvelope, MessengerError};

struct Waiter {
    sender: futures::channel::oneshot::Sender<MessageEnvelope>,
    serial: u64,
}

/// A registered request: the receiver of its reply and the serial number
/// of the registration.
pub struct Waiting {
    pub serial: u64,
    pub receiver: futures::channel::oneshot::Receiver<MessageEnvelope>,
}

/// Table of the requests waiting for a reply, keyed by request id.
///
/// Every entry is removed exactly once: when the matching reply arrives,
/// when the waiter gives up, or when its timeout expires, even if the
/// waiter went away without cleaning up.
#[derive(Clone, Default)]
pub struct PendingRequests {
    waiters: std::sync::Arc<tokio::sync::Mutex<std::collections::HashMap<String, Waiter>>>,
    next_serial: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request, which expires after `timeout`.
    pub async fn register(&self, request_id: &str, timeout: std::time::Duration) -> Result<Waiting, MessengerError> {
        let mut waiters = self.waiters.lock().await;
        if waiters.contains_key(request_id) {
            return Err(MessengerError::DuplicateRequestId(request_id.to_string()));
        }
        let serial = self.next_serial.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let (sender, receiver) = futures::channel::oneshot::channel();
        waiters.insert(request_id.to_string(), Waiter { sender, serial });

        let pending = self.clone();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if pending.evict(&request_id, serial).await {
                log::debug!("request {} expired after {:?}", request_id, timeout);
            }
        });
        Ok(Waiting { serial, receiver })
    }

    /// Hand the reply over to its waiter.
    ///
    /// Returns false if nobody is waiting for that request id anymore.
    pub async fn resolve(&self, reply: MessageEnvelope) -> bool {
        let waiter = self.waiters.lock().await.remove(&reply.request_id);
        match waiter {
            Some(waiter) => waiter.sender.send(reply).is_ok(),
            None => false,
        }
    }

    /// Remove the registration `serial` of a request, leaving alone a later
    /// registration that reuses the same id.
    pub async fn evict(&self, request_id: &str, serial: u64) -> bool {
        let mut waiters = self.waiters.lock().await;
        match waiters.get(request_id) {
            Some(waiter) if waiter.serial == serial => waiters.remove(request_id).is_some(),
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
