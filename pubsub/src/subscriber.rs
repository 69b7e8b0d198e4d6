//! The subscriber: a cached replica of the counts it registered for.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use agora_types::{CallerId, Topic};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::directory::{Directory, Mailbox};
use crate::error::PubSubError;
use crate::message::Counter;
use crate::stats::{DeliveryStats, DELIVERED, IGNORED};

/// Subscriber-side cache.
#[derive(Debug, Default)]
pub struct SubscriberState {
    subscriptions: BTreeSet<(CallerId, Topic)>,
    counts: BTreeMap<Topic, u64>,
    last: u64,
}

impl SubscriberState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that we asked `publisher` for `topic`. Returns `false` if we
    /// already had.
    pub fn record_subscription(&mut self, publisher: CallerId, topic: Topic) -> bool {
        self.subscriptions.insert((publisher, topic))
    }

    pub fn forget_subscription(&mut self, publisher: &CallerId, topic: &Topic) -> bool {
        self.subscriptions.remove(&(publisher.clone(), topic.clone()))
    }

    pub fn is_subscribed(&self, publisher: &CallerId, topic: &Topic) -> bool {
        self.subscriptions
            .contains(&(publisher.clone(), topic.clone()))
    }

    /// Apply an incoming `update_count`. Returns `true` if the cache changed.
    ///
    /// Only reports from a publisher we subscribed to, for that topic, are
    /// stored. `Register` is our own request shape and carries no value.
    pub fn update_count(&mut self, from: &CallerId, counter: Counter) -> bool {
        match counter {
            Counter::Register { .. } => false,
            Counter::Report { topic, value } => {
                if !self.is_subscribed(from, &topic) {
                    return false;
                }
                self.counts.insert(topic, value);
                self.last = value;
                true
            }
        }
    }

    /// The most recently received value, or 0 before any report.
    pub fn get_count(&self) -> u64 {
        self.last
    }

    pub fn get_topic_count(&self, topic: &Topic) -> Option<u64> {
        self.counts.get(topic).copied()
    }
}

enum Command {
    SetupSubscribe {
        publisher: CallerId,
        topic: Topic,
        reply: oneshot::Sender<Result<(), PubSubError>>,
    },
    UpdateCount {
        from: CallerId,
        counter: Counter,
    },
    GetCount {
        reply: oneshot::Sender<u64>,
    },
    GetTopicCount {
        topic: Topic,
        reply: oneshot::Sender<Option<u64>>,
    },
}

/// The running subscriber service.
pub struct Subscriber {
    id: CallerId,
    state: SubscriberState,
    directory: Directory,
    stats: Arc<DeliveryStats>,
}

impl Subscriber {
    /// Start a subscriber task and register it in `directory` as `id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        id: CallerId,
        directory: Directory,
        capacity: usize,
    ) -> Result<SubscriberHandle, PubSubError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(DeliveryStats::new());
        let handle = SubscriberHandle {
            id: id.clone(),
            tx,
            stats: stats.clone(),
        };
        directory.register(id.clone(), Arc::new(handle.clone()))?;

        let subscriber = Subscriber {
            id,
            state: SubscriberState::new(),
            directory,
            stats,
        };
        tokio::spawn(subscriber.run(rx));
        Ok(handle)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(subscriber = %self.id, "subscriber started");
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        debug!(subscriber = %self.id, "subscriber stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetupSubscribe {
                publisher,
                topic,
                reply,
            } => {
                let _ = reply.send(self.setup_subscribe(publisher, topic));
            }
            Command::UpdateCount { from, counter } => {
                if self.state.update_count(&from, counter) {
                    self.stats.increment(DELIVERED);
                } else {
                    self.stats.increment(IGNORED);
                    debug!(subscriber = %self.id, publisher = %from, "update ignored");
                }
            }
            Command::GetCount { reply } => {
                let _ = reply.send(self.state.get_count());
            }
            Command::GetTopicCount { topic, reply } => {
                let _ = reply.send(self.state.get_topic_count(&topic));
            }
        }
    }

    /// Record the subscription, then ask the publisher for the topic. If the
    /// request cannot be queued, a subscription added here is rolled back.
    fn setup_subscribe(&mut self, publisher: CallerId, topic: Topic) -> Result<(), PubSubError> {
        let added = self
            .state
            .record_subscription(publisher.clone(), topic.clone());
        let request = Counter::register(topic.clone());
        if let Err(e) = self.directory.notify(&publisher, &self.id, request) {
            if added {
                self.state.forget_subscription(&publisher, &topic);
            }
            warn!(subscriber = %self.id, %publisher, %topic, "subscribe failed: {e}");
            return Err(e);
        }
        debug!(subscriber = %self.id, %publisher, %topic, "subscription requested");
        Ok(())
    }
}

/// Cloneable handle to a running [`Subscriber`].
#[derive(Clone)]
pub struct SubscriberHandle {
    id: CallerId,
    tx: mpsc::Sender<Command>,
    stats: Arc<DeliveryStats>,
}

impl SubscriberHandle {
    pub fn id(&self) -> &CallerId {
        &self.id
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Register with `publisher` for `topic`. Repeating the call for the same
    /// pair leaves a single subscription.
    pub async fn setup_subscribe(&self, publisher: CallerId, topic: Topic) -> Result<(), PubSubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetupSubscribe {
            publisher,
            topic,
            reply,
        })
        .await?;
        self.recv(rx).await?
    }

    pub async fn update_count(&self, caller: &CallerId, counter: Counter) -> Result<(), PubSubError> {
        self.send(Command::UpdateCount {
            from: caller.clone(),
            counter,
        })
        .await
    }

    pub async fn get_count(&self) -> Result<u64, PubSubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetCount { reply }).await?;
        self.recv(rx).await
    }

    pub async fn get_topic_count(&self, topic: Topic) -> Result<Option<u64>, PubSubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetTopicCount { topic, reply }).await?;
        self.recv(rx).await
    }

    async fn send(&self, command: Command) -> Result<(), PubSubError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| PubSubError::ServiceStopped(self.id.clone()))
    }

    async fn recv<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, PubSubError> {
        rx.await
            .map_err(|_| PubSubError::ServiceStopped(self.id.clone()))
    }
}

impl Mailbox for SubscriberHandle {
    fn notify(&self, from: &CallerId, counter: Counter) -> Result<(), PubSubError> {
        self.tx
            .try_send(Command::UpdateCount {
                from: from.clone(),
                counter,
            })
            .map_err(|e| PubSubError::Delivery {
                target: self.id.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CallerId {
        CallerId::new(s).unwrap()
    }

    fn topic(s: &str) -> Topic {
        Topic::new(s).unwrap()
    }

    #[test]
    fn starts_at_zero() {
        let state = SubscriberState::new();
        assert_eq!(state.get_count(), 0);
        assert_eq!(state.get_topic_count(&topic("cpu")), None);
    }

    #[test]
    fn report_replaces_cached_value() {
        let mut state = SubscriberState::new();
        state.record_subscription(id("pub"), topic("cpu"));
        assert!(state.update_count(&id("pub"), Counter::report(topic("cpu"), 10)));
        assert!(state.update_count(&id("pub"), Counter::report(topic("cpu"), 4)));
        assert_eq!(state.get_count(), 4);
        assert_eq!(state.get_topic_count(&topic("cpu")), Some(4));
    }

    #[test]
    fn register_echo_is_a_no_op() {
        let mut state = SubscriberState::new();
        state.record_subscription(id("pub"), topic("cpu"));
        assert!(!state.update_count(&id("pub"), Counter::register(topic("cpu"))));
        assert_eq!(state.get_count(), 0);
    }

    #[test]
    fn unsolicited_reports_ignored() {
        let mut state = SubscriberState::new();
        state.record_subscription(id("pub"), topic("cpu"));
        assert!(!state.update_count(&id("pub"), Counter::report(topic("mem"), 9)));
        assert!(!state.update_count(&id("other"), Counter::report(topic("cpu"), 9)));
        assert_eq!(state.get_count(), 0);
    }

    #[test]
    fn get_count_tracks_latest_topic() {
        let mut state = SubscriberState::new();
        state.record_subscription(id("pub"), topic("cpu"));
        state.record_subscription(id("pub"), topic("mem"));
        state.update_count(&id("pub"), Counter::report(topic("cpu"), 10));
        state.update_count(&id("pub"), Counter::report(topic("mem"), 3));
        assert_eq!(state.get_count(), 3);
        assert_eq!(state.get_topic_count(&topic("cpu")), Some(10));
    }

    #[tokio::test]
    async fn subscribe_to_unknown_publisher_rolls_back() {
        let directory = Directory::new();
        let sub = Subscriber::spawn(id("sub"), directory, 8).unwrap();
        let err = sub
            .setup_subscribe(id("missing"), topic("cpu"))
            .await
            .unwrap_err();
        assert_eq!(err, PubSubError::UnknownService(id("missing")));

        // The rolled-back subscription means a report is not accepted.
        sub.update_count(&id("missing"), Counter::report(topic("cpu"), 5))
            .await
            .unwrap();
        assert_eq!(sub.get_count().await.unwrap(), 0);
        assert_eq!(sub.stats().ignored(), 1);
    }
}
