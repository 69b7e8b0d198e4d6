//! The `update_count` message shared by both sides.

use agora_types::Topic;
use serde::{Deserialize, Serialize};

/// Payload of every `update_count` call.
///
/// Subscribers send `Register` to a publisher to ask for a topic; the
/// publisher sends `Report` to subscribers carrying the current value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Counter {
    Register { topic: Topic },
    Report { topic: Topic, value: u64 },
}

impl Counter {
    pub fn register(topic: Topic) -> Self {
        Counter::Register { topic }
    }

    pub fn report(topic: Topic, value: u64) -> Self {
        Counter::Report { topic, value }
    }

    pub fn topic(&self) -> &Topic {
        match self {
            Counter::Register { topic } | Counter::Report { topic, .. } => topic,
        }
    }
}
