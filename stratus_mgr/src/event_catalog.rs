// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::common::{EVENT_JOIN, EVENT_PREFIX_FUNCTION, EVENT_PREFIX_USER_DEFINED};
use stratus_api::persistence::PersistenceError;
use stratus_api::resource::Event;

use crate::store::Store;

/// Event through which a function is invoked directly.
pub fn function_event(function_name: &str) -> String {
    format!("{}{}{}", EVENT_PREFIX_FUNCTION, EVENT_JOIN, function_name)
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.chars().any(|c| c.is_whitespace() || c == '*' || c == '#')
}

/// A declared event identifier after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedEvent {
    /// `function.<name>`, owned by a function and never registered.
    Function(String),
    /// `users.<group>.<name>`, registered in the catalog.
    User(Event),
}

impl ResolvedEvent {
    pub fn id(&self) -> &str {
        match self {
            ResolvedEvent::Function(id) => id,
            ResolvedEvent::User(event) => &event.id,
        }
    }
}

/// Resolve an event identifier declared by a user.
///
/// Accepted forms:
/// - `<group>.<name>`, expanded to `users.<group>.<name>`
/// - `users.<group>.<name>`
/// - `function.<name>`
pub fn resolve_event(raw: &str) -> Result<ResolvedEvent, String> {
    let id = raw.trim();
    let segments: Vec<&str> = id.split(EVENT_JOIN).collect();
    if !segments.iter().all(|s| valid_segment(s)) {
        return Err(format!("event id is invalide: '{}'", raw));
    }
    match segments.as_slice() {
        [prefix, _] if *prefix == EVENT_PREFIX_FUNCTION => Ok(ResolvedEvent::Function(id.to_string())),
        [prefix, group, name] if *prefix == EVENT_PREFIX_USER_DEFINED => Ok(ResolvedEvent::User(user_event(group, name))),
        [group, name] => Ok(ResolvedEvent::User(user_event(group, name))),
        _ => Err(format!("event id is invalide: '{}'. expected <group>.<name>", raw)),
    }
}

fn user_event(group: &str, name: &str) -> Event {
    Event {
        id: [EVENT_PREFIX_USER_DEFINED, group, name].join(EVENT_JOIN),
        group: group.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// The events known to the platform.
#[derive(Clone)]
pub struct EventCatalog {
    store: Store,
}

impl EventCatalog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Register an event unless already known.
    pub async fn register(&self, mut event: Event) -> Result<(), PersistenceError> {
        match self.store.add(&mut event).await {
            Ok(_) => {
                log::info!("registered event {}", event.id);
                Ok(())
            }
            Err(PersistenceError::AlreadyExists { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn list(&self) -> Result<Vec<Event>, PersistenceError> {
        self.store.get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_event() {
        match resolve_event("orders.created").unwrap() {
            ResolvedEvent::User(event) => {
                assert_eq!("users.orders.created", event.id);
                assert_eq!("orders", event.group);
                assert_eq!("created", event.name);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!("users.orders.created", resolve_event("users.orders.created").unwrap().id());
        assert_eq!(ResolvedEvent::Function("function.hello".to_string()), resolve_event("function.hello").unwrap());

        for invalid in ["", "orders", "a.b.c", "a.b.c.d", "orders.", ".created", "orders.cre ated", "orders.*"] {
            assert!(resolve_event(invalid).is_err(), "{}", invalid);
        }
    }

    #[tokio::test]
    async fn test_register_twice() {
        let catalog = EventCatalog::new(Store::new(std::sync::Arc::new(crate::store::memory::MemoryPersistence::new())));
        let event = match resolve_event("orders.created").unwrap() {
            ResolvedEvent::User(event) => event,
            other => panic!("unexpected event: {:?}", other),
        };
        catalog.register(event.clone()).await.unwrap();
        catalog.register(event).await.unwrap();
        let events = catalog.list().await.unwrap();
        assert_eq!(1, events.len());
        assert!(!events[0].created_at.is_empty());
    }
}
