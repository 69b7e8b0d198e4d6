//! The publisher: authoritative counts per topic, pushed to subscribers.

use std::collections::BTreeMap;
use std::sync::Arc;

use agora_types::{CallerId, Topic};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::directory::{Directory, Mailbox};
use crate::error::PubSubError;
use crate::message::Counter;
use crate::stats::{DeliveryStats, DELIVERED, FAILED};
use crate::subscriptions::SubscriptionTable;

/// One outbound `update_count` call produced by the publisher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Push {
    pub target: CallerId,
    pub counter: Counter,
}

/// Publisher state, free of any I/O. Every mutation returns the pushes it
/// requires; the caller is responsible for delivering them.
#[derive(Debug, Default)]
pub struct PublisherState {
    counts: BTreeMap<Topic, u64>,
    subscriptions: SubscriptionTable,
}

impl PublisherState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle an incoming `update_count` from `from`.
    ///
    /// `Register` records the subscription and, if the topic already has a
    /// value, answers with it straight away. `Report` replaces the
    /// authoritative value and fans it out to every subscriber of the topic.
    pub fn update_count(&mut self, from: &CallerId, counter: Counter) -> Vec<Push> {
        match counter {
            Counter::Register { topic } => {
                let added = self.subscriptions.subscribe(from.clone(), topic.clone());
                debug!(subscriber = %from, %topic, added, "registration");
                match self.counts.get(&topic) {
                    Some(&value) => vec![Push {
                        target: from.clone(),
                        counter: Counter::report(topic, value),
                    }],
                    None => Vec::new(),
                }
            }
            Counter::Report { topic, value } => self.set(topic, value),
        }
    }

    /// Add `by` to the topic's value (saturating) and fan out the result.
    pub fn increment(&mut self, topic: &Topic, by: u64) -> (u64, Vec<Push>) {
        let value = self
            .counts
            .get(topic)
            .copied()
            .unwrap_or(0)
            .saturating_add(by);
        (value, self.set(topic.clone(), value))
    }

    pub fn get_count(&self, topic: &Topic) -> Option<u64> {
        self.counts.get(topic).copied()
    }

    pub fn unsubscribe(&mut self, subscriber: &CallerId, topic: &Topic) -> bool {
        self.subscriptions.unsubscribe(subscriber, topic)
    }

    pub fn subscribers(&self, topic: &Topic) -> Vec<CallerId> {
        self.subscriptions.subscribers(topic).cloned().collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn set(&mut self, topic: Topic, value: u64) -> Vec<Push> {
        if let Some(old) = self.counts.insert(topic.clone(), value) {
            if value < old {
                debug!(%topic, old, value, "count moved backwards");
            }
        }
        self.subscriptions
            .subscribers(&topic)
            .map(|target| Push {
                target: target.clone(),
                counter: Counter::report(topic.clone(), value),
            })
            .collect()
    }
}

enum Command {
    UpdateCount {
        from: CallerId,
        counter: Counter,
    },
    Increment {
        topic: Topic,
        by: u64,
        reply: oneshot::Sender<u64>,
    },
    GetCount {
        topic: Topic,
        reply: oneshot::Sender<Option<u64>>,
    },
    Unsubscribe {
        subscriber: CallerId,
        topic: Topic,
        reply: oneshot::Sender<bool>,
    },
    Subscribers {
        topic: Topic,
        reply: oneshot::Sender<Vec<CallerId>>,
    },
}

/// The running publisher service.
pub struct Publisher {
    id: CallerId,
    state: PublisherState,
    directory: Directory,
    stats: Arc<DeliveryStats>,
}

impl Publisher {
    /// Start a publisher task and register it in `directory` as `id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        id: CallerId,
        directory: Directory,
        capacity: usize,
    ) -> Result<PublisherHandle, PubSubError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(DeliveryStats::new());
        let handle = PublisherHandle {
            id: id.clone(),
            tx,
            stats: stats.clone(),
        };
        directory.register(id.clone(), Arc::new(handle.clone()))?;

        let publisher = Publisher {
            id,
            state: PublisherState::new(),
            directory,
            stats,
        };
        tokio::spawn(publisher.run(rx));
        Ok(handle)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(publisher = %self.id, "publisher started");
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        debug!(publisher = %self.id, "publisher stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::UpdateCount { from, counter } => {
                let pushes = self.state.update_count(&from, counter);
                self.deliver(pushes);
            }
            Command::Increment { topic, by, reply } => {
                let (value, pushes) = self.state.increment(&topic, by);
                self.deliver(pushes);
                let _ = reply.send(value);
            }
            Command::GetCount { topic, reply } => {
                let _ = reply.send(self.state.get_count(&topic));
            }
            Command::Unsubscribe {
                subscriber,
                topic,
                reply,
            } => {
                let _ = reply.send(self.state.unsubscribe(&subscriber, &topic));
            }
            Command::Subscribers { topic, reply } => {
                let _ = reply.send(self.state.subscribers(&topic));
            }
        }
    }

    /// Push to each target independently; one failure never stops the rest.
    ///
    /// A target that is no longer registered anywhere loses its subscription
    /// to the pushed topic. Other failures (full or closed mailbox) keep it.
    fn deliver(&mut self, pushes: Vec<Push>) {
        for Push { target, counter } in pushes {
            let topic = counter.topic().clone();
            match self.directory.notify(&target, &self.id, counter) {
                Ok(()) => self.stats.increment(DELIVERED),
                Err(PubSubError::UnknownService(_)) => {
                    self.stats.increment(FAILED);
                    self.state.unsubscribe(&target, &topic);
                    warn!(publisher = %self.id, subscriber = %target, %topic, "subscriber gone, subscription dropped");
                }
                Err(e) => {
                    self.stats.increment(FAILED);
                    warn!(publisher = %self.id, subscriber = %target, "push dropped: {e}");
                }
            }
        }
    }
}

/// Cloneable handle to a running [`Publisher`].
#[derive(Clone)]
pub struct PublisherHandle {
    id: CallerId,
    tx: mpsc::Sender<Command>,
    stats: Arc<DeliveryStats>,
}

impl PublisherHandle {
    pub fn id(&self) -> &CallerId {
        &self.id
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// `update_count` made directly by `caller`. Returns once the call is
    /// queued; fan-out happens afterwards on the publisher task.
    pub async fn update_count(&self, caller: &CallerId, counter: Counter) -> Result<(), PubSubError> {
        self.send(Command::UpdateCount {
            from: caller.clone(),
            counter,
        })
        .await
    }

    /// Increment `topic` by `by`, returning the new authoritative value.
    pub async fn increment(&self, topic: Topic, by: u64) -> Result<u64, PubSubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Increment { topic, by, reply }).await?;
        self.recv(rx).await
    }

    pub async fn get_count(&self, topic: Topic) -> Result<Option<u64>, PubSubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetCount { topic, reply }).await?;
        self.recv(rx).await
    }

    pub async fn unsubscribe(&self, subscriber: CallerId, topic: Topic) -> Result<bool, PubSubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe {
            subscriber,
            topic,
            reply,
        })
        .await?;
        self.recv(rx).await
    }

    pub async fn subscribers(&self, topic: Topic) -> Result<Vec<CallerId>, PubSubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribers { topic, reply }).await?;
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

impl Mailbox for PublisherHandle {
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
    fn register_before_any_value_pushes_nothing() {
        let mut state = PublisherState::new();
        let pushes = state.update_count(&id("s1"), Counter::register(topic("cpu")));
        assert!(pushes.is_empty());
        assert_eq!(state.subscribers(&topic("cpu")), vec![id("s1")]);
        assert_eq!(state.get_count(&topic("cpu")), None);
    }

    #[test]
    fn report_fans_out_to_topic_subscribers_only() {
        let mut state = PublisherState::new();
        state.update_count(&id("s1"), Counter::register(topic("cpu")));
        state.update_count(&id("s2"), Counter::register(topic("cpu")));
        state.update_count(&id("s3"), Counter::register(topic("mem")));

        let pushes = state.update_count(&id("client"), Counter::report(topic("cpu"), 42));
        let targets: Vec<_> = pushes.iter().map(|p| p.target.clone()).collect();
        assert_eq!(targets, vec![id("s1"), id("s2")]);
        assert!(pushes
            .iter()
            .all(|p| p.counter == Counter::report(topic("cpu"), 42)));
        assert_eq!(state.get_count(&topic("cpu")), Some(42));
    }

    #[test]
    fn late_registration_gets_current_value() {
        let mut state = PublisherState::new();
        state.update_count(&id("client"), Counter::report(topic("cpu"), 7));
        let pushes = state.update_count(&id("s1"), Counter::register(topic("cpu")));
        assert_eq!(
            pushes,
            vec![Push {
                target: id("s1"),
                counter: Counter::report(topic("cpu"), 7)
            }]
        );
    }

    #[test]
    fn reregistering_keeps_one_entry() {
        let mut state = PublisherState::new();
        state.update_count(&id("s1"), Counter::register(topic("cpu")));
        state.update_count(&id("s1"), Counter::register(topic("cpu")));
        assert_eq!(state.subscription_count(), 1);
        let pushes = state.update_count(&id("c"), Counter::report(topic("cpu"), 1));
        assert_eq!(pushes.len(), 1);
    }

    #[test]
    fn increment_accumulates_and_saturates() {
        let mut state = PublisherState::new();
        assert_eq!(state.increment(&topic("cpu"), 5).0, 5);
        assert_eq!(state.increment(&topic("cpu"), 5).0, 10);
        assert_eq!(state.increment(&topic("cpu"), u64::MAX).0, u64::MAX);
    }

    #[test]
    fn unsubscribed_target_no_longer_pushed() {
        let mut state = PublisherState::new();
        state.update_count(&id("s1"), Counter::register(topic("cpu")));
        assert!(state.unsubscribe(&id("s1"), &topic("cpu")));
        let (_, pushes) = state.increment(&topic("cpu"), 1);
        assert!(pushes.is_empty());
    }

    #[tokio::test]
    async fn failed_push_does_not_block_others() {
        struct Closed;
        impl Mailbox for Closed {
            fn notify(&self, _: &CallerId, _: Counter) -> Result<(), PubSubError> {
                Err(PubSubError::Delivery {
                    target: CallerId::new("broken").unwrap(),
                    reason: "closed".into(),
                })
            }
        }

        #[derive(Default)]
        struct Recorder(std::sync::Mutex<Vec<Counter>>);
        impl Mailbox for Recorder {
            fn notify(&self, _: &CallerId, counter: Counter) -> Result<(), PubSubError> {
                self.0.lock().unwrap().push(counter);
                Ok(())
            }
        }

        let directory = Directory::new();
        let recorder = Arc::new(Recorder::default());
        directory.register(id("broken"), Arc::new(Closed)).unwrap();
        directory.register(id("healthy"), recorder.clone()).unwrap();
        let publisher = Publisher::spawn(id("pub"), directory.clone(), 16).unwrap();

        // "broken" refuses, "gone" was never registered.
        for s in ["broken", "gone", "healthy"] {
            publisher
                .update_count(&id(s), Counter::register(topic("cpu")))
                .await
                .unwrap();
        }
        let value = publisher.increment(topic("cpu"), 3).await.unwrap();
        assert_eq!(value, 3);

        assert_eq!(publisher.stats().failed(), 2);
        assert_eq!(publisher.stats().delivered(), 1);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![Counter::report(topic("cpu"), 3)]
        );
        assert_eq!(publisher.get_count(topic("cpu")).await.unwrap(), Some(3));

        // "gone" is pruned; "broken" is registered, so it stays and fails again.
        assert_eq!(
            publisher.subscribers(topic("cpu")).await.unwrap(),
            vec![id("broken"), id("healthy")]
        );
        publisher.increment(topic("cpu"), 1).await.unwrap();
        assert_eq!(publisher.stats().failed(), 3);
        assert_eq!(publisher.stats().delivered(), 2);
    }
}
