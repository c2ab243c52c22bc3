// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of actions currently running across all pools of one dispatcher.
///
/// Only used for observability (for example to tell whether shutdown can proceed quickly).
#[derive(Debug, Clone, Default)]
pub(crate) struct ActiveCounter(Arc<AtomicUsize>);

impl ActiveCounter {
    /// Marks one action as running until the returned guard is dropped.
    pub(crate) fn enter(&self) -> ActiveGuard<'_> {
        self.0.fetch_add(1, Ordering::AcqRel);
        ActiveGuard(&self.0)
    }

    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// Decrements the active count on drop, including during unwinding.
#[derive(Debug)]
pub(crate) struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn guard_tracks_nesting() {
        let counter = ActiveCounter::default();
        let outer = counter.enter();
        {
            let _inner = counter.enter();
            assert_eq!(counter.get(), 2);
        }
        assert_eq!(counter.get(), 1);
        drop(outer);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn guard_releases_on_panic() {
        let counter = ActiveCounter::default();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = counter.enter();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert_eq!(counter.get(), 0);
    }
}
