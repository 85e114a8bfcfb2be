//! Live correlation records for threads and pools.
//!
//! These are mutable while tracked (a thread gets its name and start stack
//! when it starts). What reaches the log is always an [`EventRecord`]
//! snapshot built by `emit`, never the live record itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{PoolKey, ThreadKey};
use crate::record::{Category, EventRecord, RecordSink, StackTrace};

/// A tracked thread.
#[derive(Debug)]
pub struct ThreadRecord {
    key: ThreadKey,
    pool: Option<PoolKey>,
    message: &'static str,
    lost_create_trace: bool,
    create_trace: Option<StackTrace>,
    name: Mutex<Option<String>>,
    start_trace: Mutex<Option<StackTrace>>,
}

impl ThreadRecord {
    /// Record created by the worker-slot link path.
    ///
    /// Thread construction itself is not traced, only its worker slot.
    pub(crate) fn linked(key: ThreadKey, pool: Option<PoolKey>) -> Self {
        Self {
            key,
            pool,
            message: "thread created",
            lost_create_trace: true,
            create_trace: None,
            name: Mutex::new(None),
            start_trace: Mutex::new(None),
        }
    }

    /// Placeholder for a thread first seen when it started.
    pub(crate) fn untracked(key: ThreadKey) -> Self {
        Self {
            message: "thread started without create info",
            ..Self::linked(key, None)
        }
    }

    pub fn key(&self) -> ThreadKey {
        self.key
    }

    pub fn pool(&self) -> Option<PoolKey> {
        self.pool
    }

    pub fn lost_create_trace(&self) -> bool {
        self.lost_create_trace
    }

    pub fn create_trace(&self) -> Option<&StackTrace> {
        self.create_trace.as_ref()
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    pub fn start_trace(&self) -> Option<StackTrace> {
        self.start_trace.lock().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.lock() = Some(name);
    }

    pub(crate) fn set_start_trace(&self, trace: StackTrace) {
        *self.start_trace.lock() = Some(trace);
    }

    pub(crate) fn emit(&self, sink: &dyn RecordSink) {
        self.snapshot().print(sink);
    }

    fn snapshot(&self) -> EventRecord {
        let name = self.name().unwrap_or_default();
        let mut record = EventRecord::new(Category::Thread, self.message)
            .with_field("thread key", self.key)
            .with_field("thread name", name);
        if let Some(pool) = self.pool {
            record = record.with_field("thread pool key", pool);
        }
        if !self.lost_create_trace {
            record = record.with_trace(
                "thread create trace",
                self.create_trace.clone().unwrap_or_default(),
            );
        }
        record.with_trace("thread start trace", self.start_trace().unwrap_or_default())
    }
}

/// A tracked pool and the threads currently running on its behalf.
#[derive(Debug)]
pub struct PoolRecord {
    key: PoolKey,
    lost_create_trace: bool,
    create_trace: StackTrace,
    children: Mutex<HashMap<ThreadKey, Arc<ThreadRecord>>>,
}

impl PoolRecord {
    pub(crate) fn created(key: PoolKey, create_trace: StackTrace) -> Self {
        Self {
            key,
            lost_create_trace: false,
            create_trace,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Stand-in for a pool constructed before tracking began.
    ///
    /// Whatever stack is at hand is kept so the pool has at least one
    /// representative trace.
    pub(crate) fn placeholder(key: PoolKey, stand_in: Option<StackTrace>) -> Self {
        Self {
            lost_create_trace: true,
            ..Self::created(key, stand_in.unwrap_or_default())
        }
    }

    pub fn key(&self) -> PoolKey {
        self.key
    }

    pub fn lost_create_trace(&self) -> bool {
        self.lost_create_trace
    }

    pub fn create_trace(&self) -> &StackTrace {
        &self.create_trace
    }

    pub fn children(&self) -> Vec<Arc<ThreadRecord>> {
        self.children.lock().values().cloned().collect()
    }

    pub fn contains(&self, thread: &Arc<ThreadRecord>) -> bool {
        self.children
            .lock()
            .get(&thread.key())
            .is_some_and(|child| Arc::ptr_eq(child, thread))
    }

    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    pub(crate) fn add_child(&self, thread: Arc<ThreadRecord>) {
        self.children.lock().insert(thread.key(), thread);
    }

    /// Remove `thread` if it is still the child registered under its key.
    pub(crate) fn remove_child(&self, thread: &Arc<ThreadRecord>) -> bool {
        let mut children = self.children.lock();
        match children.get(&thread.key()) {
            Some(child) if Arc::ptr_eq(child, thread) => {
                children.remove(&thread.key());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn emit(&self, sink: &dyn RecordSink) {
        let (message, label) = if self.lost_create_trace {
            ("thread pool created before tracking", "one thread create trace")
        } else {
            ("thread pool created", "thread pool create trace")
        };
        EventRecord::new(Category::Thread, message)
            .with_field("thread pool key", self.key)
            .with_trace(label, self.create_trace.clone())
            .print(sink);
    }
}
