// SPDX-FileCopyrightText: © 2023 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use futures::StreamExt;

use crate::pending::PendingRequests;
use crate::transport::Transport;
use crate::{MessageEnvelope, MessengerError};

/// Time waited for a reply when the caller does not specify one.
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// A message to be published.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub event_id: String,
    pub payload: serde_json::Value,
    /// Generated if not given.
    pub request_id: Option<String>,
    pub status_code: u16,
    pub error: Option<String>,
    pub timeout: Option<std::time::Duration>,
    pub await_reply: bool,
}

impl Outbound {
    pub fn new(event_id: &str, payload: serde_json::Value) -> Self {
        Self {
            event_id: event_id.to_string(),
            payload,
            request_id: None,
            status_code: 0,
            error: None,
            timeout: None,
            await_reply: false,
        }
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn awaiting_reply(mut self) -> Self {
        self.await_reply = true;
        self
    }
}

/// Handler of the messages received on a subscription.
#[async_trait::async_trait]
pub trait EventHandler: Sync + Send {
    async fn handle(&self, event: IncomingEvent);
}

#[async_trait::async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(IncomingEvent) -> Fut + Sync + Send,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, event: IncomingEvent) {
        (self)(event).await
    }
}

/// A message received on a subscription.
///
/// Replying consumes the event, so a request is answered at most once.
pub struct IncomingEvent {
    pub topic: String,
    pub envelope: MessageEnvelope,
    app_id: String,
    transport: std::sync::Arc<dyn Transport>,
}

impl IncomingEvent {
    pub fn request_id(&self) -> &str {
        &self.envelope.request_id
    }

    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, MessengerError> {
        self.envelope.parse_payload()
    }

    pub fn expects_reply(&self) -> bool {
        self.envelope.reply_to.is_some()
    }

    pub async fn reply_success(self, status_code: u16, payload: serde_json::Value) -> Result<(), MessengerError> {
        self.reply(status_code, payload, None).await
    }

    pub async fn reply_error(self, status_code: u16, message: &str) -> Result<(), MessengerError> {
        self.reply(status_code, serde_json::Value::Null, Some(message.to_string())).await
    }

    async fn reply(self, status_code: u16, payload: serde_json::Value, error: Option<String>) -> Result<(), MessengerError> {
        let reply_to = match self.envelope.reply_to {
            Some(reply_to) => reply_to,
            None => {
                log::debug!("no reply expected for request {}", self.envelope.request_id);
                return Ok(());
            }
        };
        let reply = MessageEnvelope {
            request_id: self.envelope.request_id,
            event_id: self.envelope.event_id,
            source: self.app_id,
            reply_to: None,
            payload,
            error,
            status_code,
            completed: true,
        };
        self.transport
            .publish(&reply_to, reply.encode()?)
            .await
            .map_err(|err| MessengerError::Transport(err.to_string()))
    }
}

struct MessengerInner {
    app_id: String,
    reply_topic: String,
    transport: std::sync::Arc<dyn Transport>,
    pending: PendingRequests,
}

/// Request/reply correlation on top of a [`Transport`].
///
/// Each messenger listens on its own reply topic and matches the replies
/// it receives with the requests awaiting them.
#[derive(Clone)]
pub struct Messenger {
    inner: std::sync::Arc<MessengerInner>,
}

impl Messenger {
    pub async fn new(app_id: &str, transport: std::sync::Arc<dyn Transport>) -> Result<Self, MessengerError> {
        let reply_topic = format!("reply.{}.{}", app_id, uuid::Uuid::new_v4().simple());
        let pending = PendingRequests::new();

        let mut replies = transport
            .subscribe(&reply_topic, crate::EXCLUSIVE_GROUP)
            .await
            .map_err(|err| MessengerError::Transport(err.to_string()))?;

        let cloned_pending = pending.clone();
        tokio::spawn(async move {
            while let Some((_topic, raw)) = replies.next().await {
                match MessageEnvelope::decode(&raw) {
                    Ok(reply) => {
                        let request_id = reply.request_id.clone();
                        if !cloned_pending.resolve(reply).await {
                            log::debug!("dropping reply to request {}: nobody waiting", request_id);
                        }
                    }
                    Err(err) => log::warn!("dropping malformed reply: {}", err),
                }
            }
            log::info!("reply dispatcher stopped");
        });

        log::info!("messenger {} listening for replies on {}", app_id, reply_topic);
        Ok(Self {
            inner: std::sync::Arc::new(MessengerInner {
                app_id: app_id.to_string(),
                reply_topic,
                transport,
                pending,
            }),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    pub fn reply_topic(&self) -> &str {
        &self.inner.reply_topic
    }

    pub async fn pending_requests(&self) -> usize {
        self.inner.pending.len().await
    }

    /// Publish a message, waiting for its reply if requested.
    ///
    /// The timeout is measured from the publication. Returns the reply, or
    /// `None` if no reply was requested.
    pub async fn send(&self, outbound: Outbound) -> Result<Option<MessageEnvelope>, MessengerError> {
        let request_id = outbound.request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let timeout = outbound.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let waiter = match outbound.await_reply {
            true => Some(self.inner.pending.register(&request_id, timeout).await?),
            false => None,
        };

        let envelope = MessageEnvelope {
            request_id: request_id.clone(),
            event_id: outbound.event_id.clone(),
            source: self.inner.app_id.clone(),
            reply_to: waiter.as_ref().map(|_| self.inner.reply_topic.clone()),
            payload: outbound.payload,
            error: outbound.error,
            status_code: outbound.status_code,
            completed: false,
        };

        let published = match envelope.encode() {
            Ok(raw) => self
                .inner
                .transport
                .publish(&outbound.event_id, raw)
                .await
                .map_err(|err| MessengerError::Transport(err.to_string())),
            Err(err) => Err(err),
        };
        if let Err(err) = published {
            if let Some(waiter) = &waiter {
                self.inner.pending.evict(&request_id, waiter.serial).await;
            }
            return Err(err);
        }

        let waiter = match waiter {
            Some(waiter) => waiter,
            None => return Ok(None),
        };
        // the entry expires on its own, which drops the sender
        match tokio::time::timeout(timeout, waiter.receiver).await {
            Ok(Ok(reply)) => return Ok(Some(reply)),
            Ok(Err(_)) => {}
            Err(_) => {
                self.inner.pending.evict(&request_id, waiter.serial).await;
            }
        }
        log::warn!("request {} on {} timed out after {:?}", request_id, outbound.event_id, timeout);
        Err(MessengerError::Timeout(timeout))
    }

    /// Fire-and-forget publication, returning the request id used.
    pub async fn publish(&self, event_id: &str, payload: serde_json::Value) -> Result<String, MessengerError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.send(Outbound::new(event_id, payload).with_request_id(&request_id)).await?;
        Ok(request_id)
    }

    pub async fn request(&self, event_id: &str, payload: serde_json::Value, timeout: std::time::Duration) -> Result<MessageEnvelope, MessengerError> {
        match self.send(Outbound::new(event_id, payload).with_timeout(timeout).awaiting_reply()).await? {
            Some(reply) => Ok(reply),
            None => Err(MessengerError::Transport(format!("no reply to {}", event_id))),
        }
    }

    /// Handle the messages matching `pattern`, each on its own task.
    pub async fn subscribe(&self, pattern: &str, group: &str, handler: std::sync::Arc<dyn EventHandler>) -> Result<(), MessengerError> {
        let mut deliveries = self
            .inner
            .transport
            .subscribe(pattern, group)
            .await
            .map_err(|err| MessengerError::Transport(err.to_string()))?;

        let app_id = self.inner.app_id.clone();
        let transport = self.inner.transport.clone();
        let pattern_owned = pattern.to_string();
        tokio::spawn(async move {
            while let Some((topic, raw)) = deliveries.next().await {
                let envelope = match MessageEnvelope::decode(&raw) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        log::warn!("dropping malformed message on {}: {}", topic, err);
                        continue;
                    }
                };
                log::debug!("dispatching request {} on {}", envelope.request_id, topic);
                let event = IncomingEvent {
                    topic,
                    envelope,
                    app_id: app_id.clone(),
                    transport: transport.clone(),
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.handle(event).await;
                });
            }
            log::info!("subscription to {} closed", pattern_owned);
        });
        Ok(())
    }
}
