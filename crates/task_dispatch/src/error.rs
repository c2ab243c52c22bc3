// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::PoolName;

/// Work could not be handed to a pool.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubmitError {
    /// The pool is draining or terminated and accepts no new work.
    #[error("pool {pool} is shut down")]
    ShutDown {
        /// The pool that refused the work.
        pool: PoolName,
    },

    /// The pool is saturated and configured with [`OverflowPolicy::Reject`](crate::OverflowPolicy::Reject).
    #[error("pool {pool} is saturated and rejected the work")]
    Rejected {
        /// The pool that refused the work.
        pool: PoolName,
    },

    /// The pool needed a thread of its own and the operating system refused to start one.
    #[error("pool {pool} could not start its timer thread")]
    NoThread {
        /// The pool that could not start.
        pool: PoolName,
    },
}

/// Accepted work did not produce a value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TaskError {
    /// The action panicked. The panic was contained to the action.
    #[error("task panicked")]
    Panicked,

    /// The action was dropped without running, because its pool was forcibly terminated.
    #[error("task was cancelled before it ran")]
    Cancelled,
}
