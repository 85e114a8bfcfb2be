//! Pool/worker/thread correlation.
//!
//! Attributes every thread to the pool that created it using only what the
//! interception points can observe:
//!
//! 1. pool construction (creates and emits a [`PoolRecord`]),
//! 2. worker-slot construction (links worker → pool, then worker → thread),
//! 3. thread start (emits independent threads only),
//! 4. thread exit (detaches the thread, evicts pools left without threads).
//!
//! State lives in sharded concurrent maps; each pool guards its own children,
//! so unrelated pools never contend.

mod keys;
mod observed;
mod records;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, error, warn};

pub use keys::{KeyAllocator, PoolKey, ThreadKey, WorkerKey};
pub use observed::ObservedThread;
pub use records::{PoolRecord, ThreadRecord};

use crate::record::{RecordSink, StackTrace};

/// Live correlation state for one process.
pub struct CorrelationTracker {
    threads: DashMap<ThreadKey, Arc<ThreadRecord>>,
    pools: DashMap<PoolKey, Arc<PoolRecord>>,
    worker_to_pool: DashMap<WorkerKey, PoolKey>,
    sink: Arc<dyn RecordSink>,
}

impl CorrelationTracker {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            threads: DashMap::with_capacity(64),
            pools: DashMap::with_capacity(32),
            worker_to_pool: DashMap::with_capacity(32),
            sink,
        }
    }

    /// A pool is being constructed. Only the first call per key records.
    pub fn pool_created(&self, pool: PoolKey, create_trace: StackTrace) {
        let record = match self.pools.entry(pool) {
            Entry::Occupied(_) => {
                debug!(%pool, "pool already tracked");
                return;
            }
            Entry::Vacant(slot) => {
                let record = Arc::new(PoolRecord::created(pool, create_trace));
                slot.insert(Arc::clone(&record));
                record
            }
        };
        record.emit(self.sink.as_ref());
    }

    /// A worker slot owned by `pool` is being constructed.
    pub fn worker_created(&self, worker: WorkerKey, pool: PoolKey) {
        self.worker_to_pool.insert(worker, pool);
    }

    /// The worker slot finished construction and exposed its thread.
    ///
    /// `None` means the slot's thread could not be read; the thread then
    /// stays untracked.
    pub fn worker_thread_resolved(&self, worker: WorkerKey, thread: Option<ThreadKey>) {
        match thread {
            Some(thread) => self.link(thread, worker, None),
            None => error!(%worker, "worker slot thread unavailable; linkage skipped"),
        }
        self.worker_to_pool.remove(&worker);
    }

    /// Link a thread to the pool owning `worker`, if any.
    ///
    /// A pool that predates tracking is synthesized (and emitted) from
    /// `stand_in` so it still has one representative trace. Linking the
    /// same thread twice keeps the later record.
    pub fn link(&self, thread: ThreadKey, worker: WorkerKey, stand_in: Option<StackTrace>) {
        let pool = self.worker_to_pool.get(&worker).map(|entry| *entry.value());
        debug!(%thread, %worker, in_pool = pool.is_some(), "linking thread");

        let record = Arc::new(ThreadRecord::linked(thread, pool));
        if let Some(pool) = pool {
            let synthesized = match self.pools.entry(pool) {
                Entry::Occupied(slot) => {
                    slot.get().add_child(Arc::clone(&record));
                    None
                }
                Entry::Vacant(slot) => {
                    let placeholder = Arc::new(PoolRecord::placeholder(pool, stand_in));
                    placeholder.add_child(Arc::clone(&record));
                    slot.insert(Arc::clone(&placeholder));
                    Some(placeholder)
                }
            };
            if let Some(placeholder) = synthesized {
                warn!(%pool, "pool created before tracking; synthesized record");
                placeholder.emit(self.sink.as_ref());
            }
            self.worker_to_pool.remove(&worker);
        }

        if let Some(previous) = self.threads.insert(thread, record) {
            debug!(%thread, "replacing earlier thread record");
            self.detach(&previous);
        }
    }

    /// A thread's `start` returned.
    ///
    /// Independent threads are emitted with their start stack. Pool-owned
    /// thread starts are expected and frequent, so they are not.
    pub fn thread_started(&self, thread: ThreadKey, name: impl Into<String>, start_trace: StackTrace) {
        let record = self
            .threads
            .entry(thread)
            .or_insert_with(|| {
                warn!(%thread, "no record for started thread; tracking began late");
                Arc::new(ThreadRecord::untracked(thread))
            })
            .clone();

        record.set_name(name.into());
        match record.pool() {
            None => {
                record.set_start_trace(start_trace);
                record.emit(self.sink.as_ref());
            }
            Some(pool) => debug!(%thread, %pool, "pool thread started"),
        }
    }

    /// A thread's `run` returned.
    pub fn thread_exited(&self, thread: ThreadKey) {
        let Some((_, record)) = self.threads.remove(&thread) else {
            warn!(%thread, "no record for exiting thread");
            return;
        };
        debug!(
            %thread,
            name = record.name().as_deref().unwrap_or(""),
            live_threads = self.threads.len(),
            "thread exited"
        );
        self.detach(&record);
    }

    /// Remove `record` from its pool and evict the pool if it became empty.
    fn detach(&self, record: &Arc<ThreadRecord>) {
        let Some(pool_key) = record.pool() else {
            return;
        };
        let Some(pool) = self.pools.get(&pool_key).map(|entry| Arc::clone(entry.value())) else {
            warn!(pool = %pool_key, "no record for exiting thread's pool");
            return;
        };
        if !pool.remove_child(record) {
            return;
        }
        // Checked under the shard lock so a concurrent link into this pool
        // either lands before eviction or finds the slot vacant.
        if self.pools.remove_if(&pool_key, |_, p| p.is_empty()).is_some() {
            debug!(pool = %pool_key, live_pools = self.pools.len(), "pool evicted");
        }
    }

    pub fn thread(&self, thread: ThreadKey) -> Option<Arc<ThreadRecord>> {
        self.threads.get(&thread).map(|entry| Arc::clone(entry.value()))
    }

    pub fn pool(&self, pool: PoolKey) -> Option<Arc<PoolRecord>> {
        self.pools.get(&pool).map(|entry| Arc::clone(entry.value()))
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Worker slots constructed but not yet linked to a thread.
    pub fn pending_worker_links(&self) -> usize {
        self.worker_to_pool.len()
    }

    /// Check that every pool-owned thread is a child of its pool.
    pub fn linkage_consistent(&self) -> bool {
        self.threads.iter().all(|entry| match entry.value().pool() {
            None => true,
            Some(pool) => self
                .pool(pool)
                .is_some_and(|record| record.contains(entry.value())),
        })
    }

    /// Drop all correlation state.
    pub fn clear(&self) {
        self.threads.clear();
        self.pools.clear();
        self.worker_to_pool.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemorySink;

    fn tracker() -> (CorrelationTracker, Arc<MemorySink>, KeyAllocator) {
        let sink = Arc::new(MemorySink::new());
        (CorrelationTracker::new(sink.clone()), sink, KeyAllocator::new())
    }

    #[test]
    fn pool_creation_is_idempotent() {
        let (tracker, sink, keys) = tracker();
        let pool = keys.pool();
        tracker.pool_created(pool, StackTrace::new(["first"]));
        tracker.pool_created(pool, StackTrace::new(["second"]));

        assert_eq!(sink.len(), 1);
        assert_eq!(tracker.pool_count(), 1);
        assert_eq!(tracker.pool(pool).unwrap().create_trace().frames(), &["first".to_string()]);
    }

    #[test]
    fn worker_link_attaches_thread_to_pool() {
        let (tracker, _sink, keys) = tracker();
        let (pool, worker, thread) = (keys.pool(), keys.worker(), keys.thread());
        tracker.pool_created(pool, StackTrace::empty());
        tracker.worker_created(worker, pool);
        assert_eq!(tracker.pending_worker_links(), 1);

        tracker.worker_thread_resolved(worker, Some(thread));

        let record = tracker.thread(thread).unwrap();
        assert_eq!(record.pool(), Some(pool));
        assert!(record.lost_create_trace());
        assert!(tracker.pool(pool).unwrap().contains(&record));
        assert_eq!(tracker.pending_worker_links(), 0);
        assert!(tracker.linkage_consistent());
    }

    #[test]
    fn unreadable_worker_thread_skips_linkage() {
        let (tracker, sink, keys) = tracker();
        let (pool, worker) = (keys.pool(), keys.worker());
        tracker.pool_created(pool, StackTrace::empty());
        tracker.worker_created(worker, pool);

        tracker.worker_thread_resolved(worker, None);

        assert_eq!(tracker.thread_count(), 0);
        assert_eq!(tracker.pending_worker_links(), 0);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn late_pool_is_synthesized_and_emitted() {
        let (tracker, sink, keys) = tracker();
        let (pool, worker, thread) = (keys.pool(), keys.worker(), keys.thread());
        tracker.worker_created(worker, pool);

        tracker.link(thread, worker, Some(StackTrace::new(["stand-in"])));

        let record = tracker.pool(pool).unwrap();
        assert!(record.lost_create_trace());
        assert_eq!(record.create_trace().frames(), &["stand-in".to_string()]);
        assert_eq!(sink.matching("thread pool created before tracking").len(), 1);
    }

    #[test]
    fn thread_without_worker_is_independent() {
        let (tracker, _sink, keys) = tracker();
        let (worker, thread) = (keys.worker(), keys.thread());
        tracker.link(thread, worker, None);
        assert_eq!(tracker.thread(thread).unwrap().pool(), None);
        assert_eq!(tracker.pool_count(), 0);
    }

    #[test]
    fn independent_thread_start_is_emitted() {
        let (tracker, sink, keys) = tracker();
        let thread = keys.thread();

        tracker.thread_started(thread, "loader", StackTrace::new(["spawn"]));

        let record = tracker.thread(thread).unwrap();
        assert!(record.lost_create_trace());
        assert_eq!(record.name().as_deref(), Some("loader"));
        let emitted = sink.matching("thread started without create info");
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].contains("thread start trace:\n\tspawn\n"));
    }

    #[test]
    fn pool_thread_start_is_not_emitted() {
        let (tracker, sink, keys) = tracker();
        let (pool, worker, thread) = (keys.pool(), keys.worker(), keys.thread());
        tracker.pool_created(pool, StackTrace::empty());
        tracker.worker_created(worker, pool);
        tracker.worker_thread_resolved(worker, Some(thread));

        tracker.thread_started(thread, "pool-1-thread-1", StackTrace::new(["spawn"]));

        assert_eq!(sink.len(), 1);
        let record = tracker.thread(thread).unwrap();
        assert_eq!(record.name().as_deref(), Some("pool-1-thread-1"));
        assert!(record.start_trace().is_none());
    }

    #[test]
    fn pool_evicted_when_last_thread_exits() {
        let (tracker, _sink, keys) = tracker();
        let pool = keys.pool();
        tracker.pool_created(pool, StackTrace::empty());
        let threads: Vec<_> = (0..2)
            .map(|_| {
                let (worker, thread) = (keys.worker(), keys.thread());
                tracker.worker_created(worker, pool);
                tracker.worker_thread_resolved(worker, Some(thread));
                thread
            })
            .collect();

        tracker.thread_exited(threads[0]);
        assert_eq!(tracker.pool_count(), 1);
        assert_eq!(tracker.pool(pool).unwrap().children().len(), 1);

        tracker.thread_exited(threads[1]);
        assert_eq!(tracker.pool_count(), 0);
        assert_eq!(tracker.thread_count(), 0);
    }

    #[test]
    fn independent_thread_exit_leaves_pools_alone() {
        let (tracker, _sink, keys) = tracker();
        let (pool, thread) = (keys.pool(), keys.thread());
        tracker.pool_created(pool, StackTrace::empty());
        tracker.thread_started(thread, "solo", StackTrace::empty());

        tracker.thread_exited(thread);

        assert_eq!(tracker.thread_count(), 0);
        assert_eq!(tracker.pool_count(), 1);
    }

    #[test]
    fn unknown_thread_exit_is_ignored() {
        let (tracker, _sink, keys) = tracker();
        tracker.thread_exited(keys.thread());
        assert_eq!(tracker.thread_count(), 0);
    }

    #[test]
    fn relinking_moves_thread_between_pools() {
        let (tracker, _sink, keys) = tracker();
        let (pool_a, pool_b) = (keys.pool(), keys.pool());
        let (worker_a, worker_b, thread) = (keys.worker(), keys.worker(), keys.thread());
        tracker.pool_created(pool_a, StackTrace::empty());
        tracker.pool_created(pool_b, StackTrace::empty());
        tracker.worker_created(worker_a, pool_a);
        tracker.worker_created(worker_b, pool_b);

        tracker.worker_thread_resolved(worker_a, Some(thread));
        tracker.worker_thread_resolved(worker_b, Some(thread));

        assert_eq!(tracker.thread(thread).unwrap().pool(), Some(pool_b));
        assert!(tracker.pool(pool_a).is_none());
        assert!(tracker.linkage_consistent());
    }

    #[test]
    fn clear_drops_everything() {
        let (tracker, _sink, keys) = tracker();
        let (pool, worker) = (keys.pool(), keys.worker());
        tracker.pool_created(pool, StackTrace::empty());
        tracker.worker_created(worker, pool);
        tracker.thread_started(keys.thread(), "t", StackTrace::empty());

        tracker.clear();

        assert_eq!(tracker.thread_count(), 0);
        assert_eq!(tracker.pool_count(), 0);
        assert_eq!(tracker.pending_worker_links(), 0);
    }
}
