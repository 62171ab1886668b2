// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::common::{current_time, CONSUMER_MGR, EVENT_REQUEST_TRACKER};
use stratus_api::persistence::PersistenceError;
use stratus_api::tracker::{RequestTracker, RequestTrackerMessage};
use stratus_messenger::{IncomingEvent, Messenger, MessengerError};

use crate::store::Store;

/// Records the history of the requests served by functions and gateway.
#[derive(Clone)]
pub struct RequestTrackerListener {
    store: Store,
    // updates of the same request are read-modify-write
    lock: std::sync::Arc<tokio::sync::Mutex<()>>,
}

impl RequestTrackerListener {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Merge a tracking message into the record of its request.
    pub async fn track(&self, message: RequestTrackerMessage) -> Result<RequestTracker, PersistenceError> {
        let _guard = self.lock.lock().await;
        let mut tracker = match self.store.find::<RequestTracker>(&message.request_id).await? {
            Some(tracker) => tracker,
            None => RequestTracker {
                request_id: message.request_id.clone(),
                source: message.source.clone(),
                created_at: current_time(),
                ..Default::default()
            },
        };

        if let Some(mut log) = message.log {
            if log.time.is_empty() {
                log.time = current_time();
            }
            if log.source.is_empty() {
                log.source = message.source.clone();
            }
            tracker.logs.push(log);
        }
        if let Some(response) = message.response {
            tracker.response = response;
        }
        if message.completed && tracker.completed_at.is_empty() {
            tracker.completed_at = current_time();
        }

        self.store.save(&mut tracker).await?;
        Ok(tracker)
    }

    pub async fn get(&self, request_id: &str) -> Result<RequestTracker, PersistenceError> {
        self.store.get_by_id(request_id).await
    }

    pub async fn listen(&self, messenger: &Messenger) -> Result<(), MessengerError> {
        let listener = self.clone();
        messenger
            .subscribe(
                EVENT_REQUEST_TRACKER,
                CONSUMER_MGR,
                std::sync::Arc::new(move |event: IncomingEvent| {
                    let listener = listener.clone();
                    async move {
                        let message: RequestTrackerMessage = match event.parse_payload() {
                            Ok(message) => message,
                            Err(err) => {
                                log::warn!("dropping malformed tracking message {}: {}", event.request_id(), err);
                                return;
                            }
                        };
                        if message.request_id.is_empty() {
                            log::warn!("dropping tracking message without request id from {}", message.source);
                            return;
                        }
                        let request_id = message.request_id.clone();
                        if let Err(err) = listener.track(message).await {
                            log::error!("could not track request {}: {}", request_id, err);
                        }
                    }
                }),
            )
            .await?;
        log::info!("tracking requests on {}", EVENT_REQUEST_TRACKER);
        Ok(())
    }
}
