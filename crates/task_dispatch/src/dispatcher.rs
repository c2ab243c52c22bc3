// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::counter::ActiveCounter;
use crate::pool::WorkerPool;
use crate::scheduler::Scheduler;
use crate::{ConfigError, DispatcherConfig, DrainOutcome, PoolName, PoolStats, ScheduledTask, SubmitError, TaskHandle};

/// Runs blocking work on four independent, bounded pools of OS threads.
///
/// Pools are created on first use. A dispatcher is usually constructed once, wrapped in an
/// [`Arc`] and handed to whatever needs to run work in the background.
///
/// # Examples
///
/// ```
/// use task_dispatch::{DispatcherConfig, PoolName, TaskDispatcher};
/// use std::time::Duration;
///
/// let dispatcher = TaskDispatcher::new(DispatcherConfig::default())?;
///
/// let handles: Vec<_> = (0..10)
///     .map(|i| dispatcher.submit(PoolName::ImageFetch, move || i * 2))
///     .collect::<Result<_, _>>()?;
///
/// let total: i32 = handles.into_iter().map(|h| h.wait().unwrap_or_default()).sum();
/// assert_eq!(total, 90);
///
/// dispatcher.shutdown(Duration::from_secs(5));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct TaskDispatcher {
    config: DispatcherConfig,
    active: ActiveCounter,
    pools: [OnceCell<Arc<WorkerPool>>; PoolName::ALL.len()],
    scheduler: OnceCell<Scheduler>,
    shut_down: AtomicBool,
}

impl TaskDispatcher {
    /// Creates a dispatcher. No threads are started until work is submitted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any pool is configured so that it could never make progress.
    pub fn new(config: DispatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            active: ActiveCounter::default(),
            pools: Default::default(),
            scheduler: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Runs `action` on the given pool.
    ///
    /// If the pool is saturated and uses [`OverflowPolicy::CallerRuns`](crate::OverflowPolicy::CallerRuns),
    /// the action runs on the current thread before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::ShutDown`] after [`shutdown`](Self::shutdown) and
    /// [`SubmitError::Rejected`] if a saturated pool is configured to reject work.
    pub fn submit<F, R>(&self, pool: PoolName, action: F) -> Result<TaskHandle<R>, SubmitError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.pool(pool).submit(action)
    }

    /// Runs `action` once on the scheduled pool after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::ShutDown`] after [`shutdown`](Self::shutdown) and
    /// [`SubmitError::NoThread`] if the timer thread could not be started.
    pub fn schedule<F>(&self, action: F, delay: Duration) -> Result<ScheduledTask, SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut action = Some(action);
        let once = move || {
            if let Some(action) = action.take() {
                action();
            }
        };

        self.scheduler()?.schedule(Box::new(once), delay, None)
    }

    /// Runs `action` on the scheduled pool after `initial_delay` and then every `period`
    /// until cancelled.
    ///
    /// Runs are started at a fixed rate. A run that takes longer than `period` delays the
    /// next one instead of overlapping it. A panicking run does not stop later runs.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::ShutDown`] after [`shutdown`](Self::shutdown) and
    /// [`SubmitError::NoThread`] if the timer thread could not be started.
    pub fn schedule_repeating<F>(&self, action: F, initial_delay: Duration, period: Duration) -> Result<ScheduledTask, SubmitError>
    where
        F: FnMut() + Send + 'static,
    {
        self.scheduler()?.schedule(Box::new(action), initial_delay, Some(period))
    }

    /// Number of actions currently running across all pools, including actions running on
    /// submitting threads because of caller-runs overflow.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.get()
    }

    /// A snapshot of one pool.
    #[must_use]
    pub fn pool_stats(&self, pool: PoolName) -> PoolStats {
        self.pool(pool).stats()
    }

    /// The configuration this dispatcher was created with.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Stops all pools from accepting work and waits up to `grace` for queued and running
    /// work to finish.
    ///
    /// Pending scheduled tasks are cancelled right away. Pools that do not drain in time
    /// drop their queued work, which resolves the corresponding handles with
    /// [`TaskError::Cancelled`](crate::TaskError::Cancelled). Work that is already running
    /// cannot be interrupted and finishes on detached threads.
    ///
    /// Only the first call does any work; later calls return an empty report.
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("dispatcher already shut down");
            return ShutdownReport::default();
        }

        // A grace period too long to represent means waiting for as long as it takes.
        let deadline = Instant::now().checked_add(grace);
        info!(grace_ms = grace.as_millis(), active = self.active_count(), "dispatcher shutting down");

        let timers_cancelled = self.scheduler.get().map_or(0, Scheduler::close);

        // Every pool stops accepting work before any of them is waited on, so the grace
        // period is shared rather than spent pool by pool.
        let tickets: Vec<_> = PoolName::ALL
            .iter()
            .filter_map(|&name| {
                let pool = Arc::clone(self.pool(name));
                pool.begin_drain().map(|ticket| (name, pool, ticket))
            })
            .collect();

        let pools = tickets
            .into_iter()
            .map(|(name, pool, ticket)| (name, pool.finish_drain(ticket, deadline)))
            .collect();

        let report = ShutdownReport { pools, timers_cancelled };
        info!(clean = report.is_clean(), timers_cancelled, "dispatcher shut down");
        report
    }

    fn pool(&self, name: PoolName) -> &Arc<WorkerPool> {
        self.pools[name.index()]
            .get_or_init(|| Arc::new(WorkerPool::new(name, self.config.pool(name).clone(), self.active.clone())))
    }

    fn scheduler(&self) -> Result<&Scheduler, SubmitError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(SubmitError::ShutDown { pool: PoolName::Scheduled });
        }

        self.scheduler
            .get_or_try_init(|| Scheduler::start(Arc::clone(self.pool(PoolName::Scheduled))))
    }
}

impl Drop for TaskDispatcher {
    /// Stops the timer thread without waiting for anything. Pools then wind down on their
    /// own: idle workers exit once the backlog is empty.
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.get() {
            let cancelled = scheduler.close();
            debug!(cancelled, "dispatcher dropped, timers closed");
        }
    }
}

impl Debug for TaskDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("config", &self.config)
            .field("active", &self.active_count())
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// What happened to each pool during [`TaskDispatcher::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ShutdownReport {
    /// Outcome per pool, in [`PoolName::ALL`] order. Empty for repeated shutdown calls.
    pub pools: Vec<(PoolName, DrainOutcome)>,
    /// Scheduled tasks that were still waiting for their due time.
    pub timers_cancelled: usize,
}

impl ShutdownReport {
    /// Whether every pool drained within the grace period.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.pools.iter().all(|(_, outcome)| *outcome == DrainOutcome::Drained)
    }

    /// The outcome for one pool, if this report covers it.
    #[must_use]
    pub fn outcome(&self, pool: PoolName) -> Option<DrainOutcome> {
        self.pools.iter().find(|(name, _)| *name == pool).map(|(_, outcome)| *outcome)
    }
}
