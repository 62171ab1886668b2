// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// A message received from the bus: topic and raw payload.
pub type Delivery = (String, Vec<u8>);

pub type DeliveryReceiver = futures::channel::mpsc::UnboundedReceiver<Delivery>;

/// Publish/subscribe bus with topic patterns and consumer groups.
///
/// Topics are dot-separated words. In patterns `*` matches exactly one word
/// and `#` matches zero or more words. Subscribers sharing a non-empty group
/// name and pattern receive each message once between them.
#[async_trait::async_trait]
pub trait Transport: Sync + Send {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;
    async fn subscribe(&self, pattern: &str, group: &str) -> anyhow::Result<DeliveryReceiver>;
}

/// Return true if `topic` matches the `pattern`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();
    matches_words(&pattern, &topic)
}

fn matches_words(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&"#", rest)) => (0..=topic.len()).any(|skip| matches_words(rest, &topic[skip..])),
        Some((word, rest)) => match topic.split_first() {
            Some((first, topic_rest)) => (*word == "*" || word == first) && matches_words(rest, topic_rest),
            None => false,
        },
    }
}
