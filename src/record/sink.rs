//! Destinations for finalized record bytes.

use std::sync::Arc;

use parking_lot::Mutex;

/// Accepts finalized record bytes.
///
/// Implementations must not block the submitting thread beyond an enqueue:
/// records are printed from inside instrumented application call paths.
pub trait RecordSink: Send + Sync {
    fn submit(&self, bytes: Arc<[u8]>);
}

/// Sink that keeps every submission in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Arc<[u8]>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submitted byte blocks, in submission order.
    pub fn raw(&self) -> Vec<Arc<[u8]>> {
        self.records.lock().clone()
    }

    /// Submitted records decoded as text.
    pub fn records(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Records whose text contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|record| record.contains(needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl RecordSink for MemorySink {
    fn submit(&self, bytes: Arc<[u8]>) {
        self.records.lock().push(bytes);
    }
}
