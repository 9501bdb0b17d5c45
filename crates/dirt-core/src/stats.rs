use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Process-wide, monotonically-increasing identifier for an admitted call.
/// Used only to key the active-call registry; it has no wire meaning.
pub type CallId = u64;

/// Process-wide counters, updated exactly once per finished call (Testable
/// Property 3). `completed` always increments; `errors` increments only on
/// failure.
#[derive(Debug, Default)]
pub struct CallStats {
    completed: AtomicU64,
    errors: AtomicU64,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_finish(&self, failed: bool) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if failed {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }
}

/// A snapshot of one admitted-but-not-yet-finalised call, as returned by
/// `debug.active_calls()`.
#[derive(Debug, Clone)]
pub struct ActiveCallSnapshot {
    pub id: CallId,
    pub name: String,
    pub address: Option<String>,
    pub time_received: Instant,
    pub time_in_queue: Option<Duration>,
    pub yielded_items: u64,
}

impl ActiveCallSnapshot {
    /// `now - time_received`, computed fresh on every read rather than
    /// stored, so it is always accurate regardless of how long the call has
    /// been sitting in the registry.
    pub fn age(&self) -> Duration {
        self.time_received.elapsed()
    }

    /// An admitted call that hasn't started executing yet (`time_in_queue`
    /// has not been recorded) is "pending"; everything else is "active",
    /// per spec §4.6's `debug.status()` split.
    pub fn is_pending(&self) -> bool {
        self.time_in_queue.is_none()
    }
}

#[derive(Debug)]
struct ActiveCallRecord {
    name: String,
    address: Option<String>,
    time_received: Instant,
    time_in_queue: Option<Duration>,
    yielded_items: u64,
}

/// Registry of every call currently admitted to the edge, in arrival order
/// of `CallId` (the id is monotonic, so sorting by id reconstructs arrival
/// order). A call is appended exactly once on admission and removed exactly
/// once on finalisation (Testable Property 3/6), regardless of which exit
/// path (normal return, raise, timeout, cancel) triggered the removal.
#[derive(Debug, Default)]
pub struct ActiveCalls {
    next_id: AtomicU64,
    entries: DashMap<CallId, ActiveCallRecord>,
}

impl ActiveCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a call, capturing the peer address at the point the spec's
    /// open question resolves it should be captured (spec §9: "the edge's
    /// `address` attribute ... should capture the peer address on
    /// admission").
    pub fn admit(&self, name: impl Into<String>, address: Option<String>) -> CallId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(
            id,
            ActiveCallRecord {
                name: name.into(),
                address,
                time_received: Instant::now(),
                time_in_queue: None,
                yielded_items: 0,
            },
        );
        id
    }

    pub fn mark_started(&self, id: CallId, time_in_queue: Duration) {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.time_in_queue = Some(time_in_queue);
        }
    }

    pub fn record_yield(&self, id: CallId) {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.yielded_items += 1;
        }
    }

    /// Removes the call; returns `None` if it had already been removed
    /// (finalisation must be idempotent across the multiple exit paths that
    /// can all race to call it).
    pub fn remove(&self, id: CallId) -> Option<()> {
        self.entries.remove(&id).map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(address, snapshot)` pairs, as `debug.active_calls()` returns them.
    pub fn snapshot(&self) -> Vec<(Option<String>, ActiveCallSnapshot)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|entry| {
                let id = *entry.key();
                let record = entry.value();
                (
                    record.address.clone(),
                    ActiveCallSnapshot {
                        id,
                        name: record.name.clone(),
                        address: record.address.clone(),
                        time_received: record.time_received,
                        time_in_queue: record.time_in_queue,
                        yielded_items: record.yielded_items,
                    },
                )
            })
            .collect();
        out.sort_by_key(|(_, snapshot)| snapshot.id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_and_remove_once() {
        let calls = ActiveCalls::new();
        let id = calls.admit("orders.create", Some("127.0.0.1:1".into()));
        assert_eq!(calls.len(), 1);
        assert!(calls.remove(id).is_some());
        assert!(calls.remove(id).is_none());
        assert!(calls.is_empty());
    }

    #[test]
    fn stats_conservation() {
        let stats = CallStats::new();
        stats.record_finish(false);
        stats.record_finish(true);
        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.errors(), 1);
    }
}
