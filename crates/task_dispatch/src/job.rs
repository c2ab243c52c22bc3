// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

use crate::counter::ActiveCounter;
use crate::{PoolName, TaskError, TaskHandle};

/// A unit of work as it travels through a pool's backlog.
///
/// Dropping a job without calling it resolves its handle as cancelled.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Wraps `action` so that running it is counted as active, panics are contained,
/// and the outcome reaches the returned handle.
pub(crate) fn package<F, R>(pool: PoolName, active: &ActiveCounter, action: F) -> (Job, TaskHandle<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, handle) = TaskHandle::channel();
    let active = active.clone();

    let job: Job = Box::new(move || {
        let outcome = {
            let _guard = active.enter();
            catch_unwind(AssertUnwindSafe(action))
        };

        let outcome = outcome.map_err(|_payload| {
            warn!(pool = %pool, "task panicked");
            TaskError::Panicked
        });

        // The submitter may have dropped the handle; the work still counts as done.
        _ = tx.send(outcome);
    });

    (job, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_job_resolves_handle() {
        let active = ActiveCounter::default();
        let (job, handle) = package(PoolName::General, &active, || 40 + 2);

        job();

        assert_eq!(handle.wait(), Ok(42));
        assert_eq!(active.get(), 0);
    }

    #[test]
    fn panicking_job_is_contained() {
        let active = ActiveCounter::default();
        let (job, handle) = package(PoolName::General, &active, || -> u8 { panic!("inside job") });

        job();

        assert_eq!(handle.wait(), Err(TaskError::Panicked));
        assert_eq!(active.get(), 0);
    }

    #[test]
    fn dropped_job_cancels_handle() {
        let active = ActiveCounter::default();
        let (job, handle) = package(PoolName::General, &active, || ());

        drop(job);

        assert_eq!(handle.wait(), Err(TaskError::Cancelled));
    }
}
