//! Fan-out of snapshots to live subscribers.
//!
//! Each subscriber owns the receiving half of an unbounded channel.  A
//! subscriber that dropped its receiver is pruned the next time something
//! is published for its topic.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::trace;

use crate::backend::{Snapshot, SnapshotResult, SnapshotStream};
use crate::error::StoreError;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Subscribers grouped by topic (`()` for the directory, a conversation
/// key for message logs).
#[derive(Debug)]
pub struct SnapshotHub<K> {
    topics: Mutex<HashMap<K, Vec<mpsc::UnboundedSender<SnapshotResult>>>>,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> Default for SnapshotHub<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> SnapshotHub<K> {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Register a subscriber and hand it `initial` as its first item.
    pub fn subscribe(&self, topic: K, initial: SnapshotResult) -> SnapshotStream {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(initial);
        lock(&self.topics).entry(topic).or_default().push(tx);
        rx
    }

    /// Whether anyone is still listening on `topic`.  Closed receivers
    /// are not counted.
    pub fn has_subscribers(&self, topic: &K) -> bool {
        self.subscriber_count(topic) > 0
    }

    pub fn subscriber_count(&self, topic: &K) -> usize {
        lock(&self.topics)
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Deliver `snapshot` to every live subscriber of `topic`.  Returns
    /// how many received it.
    pub fn publish(&self, topic: &K, snapshot: &Snapshot) -> usize {
        self.deliver(topic, || Ok(snapshot.clone()))
    }

    /// Deliver a subscription error to every live subscriber of `topic`.
    pub fn fail(&self, topic: &K, reason: &str) -> usize {
        self.deliver(topic, || Err(StoreError::Subscription(reason.to_string())))
    }

    fn deliver(&self, topic: &K, item: impl Fn() -> SnapshotResult) -> usize {
        let mut topics = lock(&self.topics);
        let Some(subs) = topics.get_mut(topic) else {
            return 0;
        };
        subs.retain(|tx| tx.send(item()).is_ok());
        let delivered = subs.len();
        if subs.is_empty() {
            topics.remove(topic);
        }
        trace!(?topic, delivered, "published snapshot");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[tokio::test]
    async fn test_initial_snapshot_then_updates() {
        let hub: SnapshotHub<()> = SnapshotHub::new();
        let mut rx = hub.subscribe((), Ok(Snapshot::default()));

        let first = rx.recv().await.unwrap().unwrap();
        assert!(first.is_empty());

        let snap = Snapshot::new(vec![Document::new("a", Default::default())]);
        assert_eq!(hub.publish(&(), &snap), 1);
        assert_eq!(rx.recv().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_receivers_are_pruned() {
        let hub: SnapshotHub<String> = SnapshotHub::new();
        let rx = hub.subscribe("t".into(), Ok(Snapshot::default()));
        assert!(hub.has_subscribers(&"t".into()));

        drop(rx);
        assert!(!hub.has_subscribers(&"t".into()));
        assert_eq!(hub.publish(&"t".into(), &Snapshot::default()), 0);
    }

    #[tokio::test]
    async fn test_fail_delivers_subscription_error() {
        let hub: SnapshotHub<()> = SnapshotHub::new();
        let mut rx = hub.subscribe((), Ok(Snapshot::default()));
        let _ = rx.recv().await;

        hub.fail(&(), "permission denied");
        match rx.recv().await {
            Some(Err(StoreError::Subscription(reason))) => assert_eq!(reason, "permission denied"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
