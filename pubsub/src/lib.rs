//! Topic counter aggregation between independent services.
//!
//! A [`Publisher`] owns the authoritative `topic -> value` table. A
//! [`Subscriber`] registers with a publisher for a topic and keeps a cached
//! copy that the publisher pushes to whenever the value changes.
//!
//! Services reach each other only through the [`Directory`], which routes an
//! `update_count` call to the target's mailbox without waiting on it.
//!
//! Delivery is at-most-once: a push that cannot be queued (mailbox full or
//! closed, target unknown) is counted in [`DeliveryStats`], logged, and
//! dropped. Every service drains a single FIFO mailbox one message at a
//! time, so pushes from one publisher reach a subscriber in the order they
//! were produced.

pub mod directory;
pub mod error;
pub mod message;
pub mod publisher;
pub mod stats;
pub mod subscriber;
pub mod subscriptions;

pub use directory::{Directory, Mailbox};
pub use error::PubSubError;
pub use message::Counter;
pub use publisher::{Publisher, PublisherHandle, PublisherState, Push};
pub use stats::DeliveryStats;
pub use subscriber::{Subscriber, SubscriberHandle, SubscriberState};
pub use subscriptions::SubscriptionTable;

/// Default mailbox capacity for every service.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;
