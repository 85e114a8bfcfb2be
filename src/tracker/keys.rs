//! Identities for observed pools, worker slots and threads.
//!
//! Keys are issued from a single monotonic counter at first observation, so
//! they are unique for the lifetime of the process and never reused.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:x}", self.0)
            }
        }
    };
}

define_key!(
    /// Identity of a worker pool.
    PoolKey
);
define_key!(
    /// Identity of a worker slot inside a pool.
    WorkerKey
);
define_key!(
    /// Identity of a thread.
    ThreadKey
);

/// Hands out fresh keys. Shared by every interception adapter.
#[derive(Debug)]
pub struct KeyAllocator {
    next: AtomicU64,
}

impl KeyAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn pool(&self) -> PoolKey {
        PoolKey(self.next_raw())
    }

    pub fn worker(&self) -> WorkerKey {
        WorkerKey(self.next_raw())
    }

    pub fn thread(&self) -> ThreadKey {
        ThreadKey(self.next_raw())
    }
}

impl Default for KeyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn keys_are_unique_across_kinds() {
        let keys = KeyAllocator::new();
        let pool = keys.pool();
        let worker = keys.worker();
        let thread = keys.thread();
        let raws: HashSet<u64> = [pool.raw(), worker.raw(), thread.raw()].into();
        assert_eq!(raws.len(), 3);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(ThreadKey::from_raw(255).to_string(), "ff");
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let keys = Arc::new(KeyAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let keys = Arc::clone(&keys);
                thread::spawn(move || (0..1000).map(|_| keys.thread().raw()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for raw in handle.join().unwrap() {
                assert!(seen.insert(raw));
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
