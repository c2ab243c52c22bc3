// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;

use moka::sync::Cache;

/// The in-process tier: URL to decoded asset, with no capacity limit and no expiry.
///
/// Entries only leave through [`invalidate`](Self::invalidate) and [`clear`](Self::clear).
pub(crate) struct MemoryTier<A> {
    entries: Cache<String, A>,
}

impl<A> MemoryTier<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: Cache::builder().name("tiered-cache-memory").build(),
        }
    }

    /// Returns the cached asset or runs `load` to produce it.
    ///
    /// Concurrent callers for the same key wait for a single `load` and share its outcome.
    /// A failed load is not cached, so the next call runs `load` again.
    pub(crate) fn get_or_load<E, F>(&self, key: &str, load: F) -> Result<A, Arc<E>>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> Result<A, E>,
    {
        self.entries.try_get_with(key.to_owned(), load)
    }

    pub(crate) fn peek(&self, key: &str) -> Option<A> {
        self.entries.get(key)
    }

    pub(crate) fn invalidate(&self, key: &str) {
        self.entries.invalidate(key);
    }

    pub(crate) fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Exact number of live entries.
    pub(crate) fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        // `entry_count` is an estimate that lags behind invalidations; iterating only
        // yields live entries.
        self.entries.iter().count() as u64
    }
}

impl<A> Debug for MemoryTier<A>
where
    A: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTier")
            .field("estimated_len", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn loads_once_then_hits() {
        let tier = MemoryTier::<u32>::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = tier.get_or_load::<(), _>("k", || {
                loads.fetch_add(1, Ordering::Relaxed);
                Ok(5)
            });
            assert_eq!(value, Ok(5));
        }

        assert_eq!(loads.load(Ordering::Relaxed), 1);
        assert_eq!(tier.peek("k"), Some(5));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let tier = MemoryTier::<u32>::new();

        assert_eq!(tier.get_or_load("k", || Err("down")).unwrap_err().as_ref(), &"down");
        assert_eq!(tier.peek("k"), None);
        assert_eq!(tier.get_or_load::<&str, _>("k", || Ok(1)), Ok(1));
    }

    #[test]
    fn concurrent_callers_share_one_load() {
        let tier = Arc::new(MemoryTier::<u32>::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let start = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tier = Arc::clone(&tier);
                let loads = Arc::clone(&loads);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    tier.get_or_load::<(), _>("k", || {
                        loads.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(std::time::Duration::from_millis(20));
                        Ok(9)
                    })
                })
            })
            .collect();

        for thread in threads {
            assert_eq!(thread.join().unwrap(), Ok(9));
        }
        assert_eq!(loads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn invalidate_and_clear() {
        let tier = MemoryTier::<u32>::new();
        _ = tier.get_or_load::<(), _>("a", || Ok(1));
        _ = tier.get_or_load::<(), _>("b", || Ok(2));

        tier.invalidate("a");
        assert_eq!(tier.peek("a"), None);
        assert_eq!(tier.len(), 1);

        tier.clear();
        assert_eq!(tier.peek("b"), None);
        assert_eq!(tier.len(), 0);
    }
}
