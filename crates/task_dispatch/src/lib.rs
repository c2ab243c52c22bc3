// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Named, bounded worker pools for blocking work.
//!
//! This crate provides [`TaskDispatcher`], a small set of independent, differently sized
//! pools of OS threads. Each [`PoolName`] is a separate concurrency domain, so a burst of
//! work in one category (say, image downloads) cannot starve another (say, calls to a
//! rate-limited catalog API).
//!
//! # Quick Start
//!
//! ```
//! use task_dispatch::{DispatcherConfig, PoolName, TaskDispatcher};
//! use std::time::Duration;
//!
//! let dispatcher = TaskDispatcher::new(DispatcherConfig::default())?;
//!
//! let handle = dispatcher.submit(PoolName::General, || 2 + 2)?;
//! assert_eq!(handle.wait()?, 4);
//!
//! let report = dispatcher.shutdown(Duration::from_secs(1));
//! assert!(report.is_clean());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Backpressure
//!
//! Every pool has a bounded backlog. When the backlog is full and the pool already runs its
//! maximum number of threads, the [`OverflowPolicy`] decides what happens. The default,
//! [`OverflowPolicy::CallerRuns`], executes the work on the submitting thread: the submitter
//! slows down and no work is lost.
//!
//! # Delayed Work
//!
//! [`TaskDispatcher::schedule`] and [`TaskDispatcher::schedule_repeating`] hand work to the
//! [`PoolName::Scheduled`] pool once its delay elapses. The returned [`ScheduledTask`] can
//! cancel runs that have not started yet.
//!
//! # Shutdown
//!
//! [`TaskDispatcher::shutdown`] stops every pool from accepting work, waits up to a grace
//! period for queued and running work to drain, and cancels whatever is still queued after
//! that. It is idempotent and may be called from any thread.

mod config;
mod counter;
mod dispatcher;
mod error;
mod handle;
mod job;
mod pool;
mod pool_name;
mod scheduler;
mod state;

#[doc(inline)]
pub use config::{ConfigError, DispatcherConfig, OverflowPolicy, PoolConfig};
#[doc(inline)]
pub use dispatcher::{ShutdownReport, TaskDispatcher};
#[doc(inline)]
pub use error::{SubmitError, TaskError};
#[doc(inline)]
pub use handle::TaskHandle;
#[doc(inline)]
pub use pool::{DrainOutcome, PoolStats};
#[doc(inline)]
pub use pool_name::PoolName;
#[doc(inline)]
pub use scheduler::ScheduledTask;
#[doc(inline)]
pub use state::PoolState;
