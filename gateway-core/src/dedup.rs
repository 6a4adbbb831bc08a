//! In-flight request deduplication: spec.md §5.
//!
//! Concurrent callers asking for the same key share one pending future
//! rather than issuing duplicate upstream requests. Only the *handle* is
//! shared (`tokio::sync::broadcast` fed by a single driving task) — the
//! future that does the work is never cloned, per spec.md §5's "futures
//! themselves must never be cloned".

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

struct Entry<T> {
    sender: broadcast::Sender<T>,
    result: Option<T>,
    completed_at: Option<Instant>,
}

/// Deduplicates concurrent work keyed by `K`, producing clone-able results
/// `V`. One caller per key drives the underlying future; the rest await its
/// broadcast result.
pub struct DedupMap<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    entry_ttl: Duration,
}

impl<K, V> DedupMap<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone + Send + 'static,
{
    pub fn new(entry_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            entry_ttl,
        }
    }

    /// Runs `make_future` for `key` if no request is already in flight (or a
    /// completed entry has not yet expired its TTL); otherwise awaits the
    /// existing driver's result.
    pub async fn get_or_run<F>(&self, key: K, make_future: F) -> V
    where
        F: Future<Output = V> + Send + 'static,
    {
        enum Action<V> {
            Drive(broadcast::Sender<V>),
            Join(broadcast::Receiver<V>),
            Cached(V),
        }

        let action = {
            let mut entries = self.entries.lock();
            self.evict_expired(&mut entries);
            if let Some(entry) = entries.get(&key) {
                match &entry.result {
                    Some(v) => Action::Cached(v.clone()),
                    None => Action::Join(entry.sender.subscribe()),
                }
            } else {
                let (tx, _rx) = broadcast::channel(1);
                entries.insert(
                    key.clone(),
                    Entry {
                        sender: tx.clone(),
                        result: None,
                        completed_at: None,
                    },
                );
                Action::Drive(tx)
            }
        };

        match action {
            Action::Cached(v) => v,
            Action::Drive(tx) => {
                let result = make_future.await;
                {
                    let mut entries = self.entries.lock();
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.result = Some(result.clone());
                        entry.completed_at = Some(Instant::now());
                    }
                }
                let _ = tx.send(result.clone());
                result
            }
            Action::Join(mut rx) => rx
                .recv()
                .await
                .expect("driving task dropped sender without sending a result"),
        }
    }

    fn evict_expired(&self, entries: &mut HashMap<K, Entry<V>>) {
        let ttl = self.entry_ttl;
        entries.retain(|_, entry| match entry.completed_at {
            Some(at) => at.elapsed() < ttl,
            None => true,
        });
    }
}

pub type SharedDedupMap<K, V> = Arc<DedupMap<K, V>>;
