//! The publisher-side subscription relation.

use agora_types::{CallerId, Topic};
use std::collections::{BTreeMap, BTreeSet};

/// `topic -> subscribers`, holding each `(subscriber, topic)` pair at most once.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionTable {
    by_topic: BTreeMap<Topic, BTreeSet<CallerId>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Returns `false` if it was already present.
    pub fn subscribe(&mut self, subscriber: CallerId, topic: Topic) -> bool {
        self.by_topic.entry(topic).or_default().insert(subscriber)
    }

    /// Remove a subscription. Returns `false` if there was none.
    pub fn unsubscribe(&mut self, subscriber: &CallerId, topic: &Topic) -> bool {
        let Some(set) = self.by_topic.get_mut(topic) else {
            return false;
        };
        let removed = set.remove(subscriber);
        if set.is_empty() {
            self.by_topic.remove(topic);
        }
        removed
    }

    pub fn is_subscribed(&self, subscriber: &CallerId, topic: &Topic) -> bool {
        self.by_topic
            .get(topic)
            .is_some_and(|set| set.contains(subscriber))
    }

    pub fn subscribers(&self, topic: &Topic) -> impl Iterator<Item = &CallerId> {
        self.by_topic.get(topic).into_iter().flatten()
    }

    /// Total number of `(subscriber, topic)` pairs.
    pub fn len(&self) -> usize {
        self.by_topic.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }
}
