//! In-process routing of `update_count` calls between services.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use agora_types::CallerId;
use tracing::debug;

use crate::error::PubSubError;
use crate::message::Counter;

/// Something that can accept an `update_count` call.
///
/// `notify` must not block: it either queues the message or fails at once.
pub trait Mailbox: Send + Sync {
    fn notify(&self, from: &CallerId, counter: Counter) -> Result<(), PubSubError>;
}

/// Registry of running services, keyed by identity. Cheap to clone.
#[derive(Clone, Default)]
pub struct Directory {
    services: Arc<RwLock<HashMap<CallerId, Arc<dyn Mailbox>>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mailbox` under `id`. Each identity may be registered once.
    pub fn register(&self, id: CallerId, mailbox: Arc<dyn Mailbox>) -> Result<(), PubSubError> {
        let mut services = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(&id) {
            return Err(PubSubError::DuplicateService(id));
        }
        debug!(service = %id, "service registered");
        services.insert(id, mailbox);
        Ok(())
    }

    /// Remove a service. Returns `false` if it was not registered.
    pub fn deregister(&self, id: &CallerId) -> bool {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn contains(&self, id: &CallerId) -> bool {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration. Services whose handles are all gone then stop.
    pub fn clear(&self) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Fire-and-forget `update_count(counter)` on `target`, sent as `from`.
    pub fn notify(
        &self,
        target: &CallerId,
        from: &CallerId,
        counter: Counter,
    ) -> Result<(), PubSubError> {
        let mailbox = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .ok_or_else(|| PubSubError::UnknownService(target.clone()))?;
        mailbox.notify(from, counter)
    }
}
