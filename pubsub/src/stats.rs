//! Push delivery counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DELIVERED: &str = "delivered";
pub const FAILED: &str = "failed";
pub const IGNORED: &str = "ignored";

/// Thread-safe counters for push outcomes, shared between a service and
/// whoever holds its handle.
pub struct DeliveryStats {
    counters: HashMap<&'static str, AtomicU64>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        let counters = [DELIVERED, FAILED, IGNORED]
            .into_iter()
            .map(|name| (name, AtomicU64::new(0)))
            .collect();
        Self { counters }
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn delivered(&self) -> u64 {
        self.get(DELIVERED)
    }

    pub fn failed(&self) -> u64 {
        self.get(FAILED)
    }

    /// Messages received but dropped (unsolicited reports, echoed registrations).
    pub fn ignored(&self) -> u64 {
        self.get(IGNORED)
    }

    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.counters
            .iter()
            .map(|(&k, v)| (k, v.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for DeliveryStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_ignored() {
        let stats = DeliveryStats::new();
        stats.increment(DELIVERED);
        stats.increment(DELIVERED);
        stats.increment("bogus");
        assert_eq!(stats.delivered(), 2);
        assert_eq!(stats.get("bogus"), 0);
        assert_eq!(stats.snapshot().len(), 3);
    }
}
