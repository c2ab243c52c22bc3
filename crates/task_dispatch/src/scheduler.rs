// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Delayed and periodic work.
//!
//! A single timer thread keeps due times in a heap and hands each due task to the
//! scheduled pool, so a slow task never delays the timer for the others.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::fmt::{self, Debug};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::pool::WorkerPool;
use crate::{PoolName, SubmitError};

type Action = Box<dyn FnMut() + Send + 'static>;

/// Stand-in for due times that do not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `base + delay`, clamped to [`FAR_FUTURE`] when the sum is not representable.
fn due_after(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// A handle to delayed or periodic work.
///
/// Dropping the handle does not cancel the work; call [`cancel`](Self::cancel) for that.
///
/// # Examples
///
/// ```
/// use task_dispatch::{DispatcherConfig, TaskDispatcher};
/// use std::time::Duration;
///
/// let dispatcher = TaskDispatcher::new(DispatcherConfig::default())?;
/// let task = dispatcher.schedule(|| println!("later"), Duration::from_secs(60))?;
///
/// task.cancel();
/// assert!(task.is_cancelled());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct ScheduledTask {
    task: Arc<TimerTask>,
}

impl ScheduledTask {
    /// Prevents any run that has not started yet. A run in progress completes.
    pub fn cancel(&self) {
        self.task.cancelled.store(true, Ordering::Release);
    }

    /// Whether the task was cancelled, either explicitly or by dispatcher shutdown.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    /// How many times the action has run to completion or panicked.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.task.runs.load(Ordering::Acquire)
    }

    /// The interval between runs, for repeating tasks.
    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        self.task.period
    }
}

impl Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("period", &self.task.period)
            .field("cancelled", &self.is_cancelled())
            .field("runs", &self.run_count())
            .finish_non_exhaustive()
    }
}

struct TimerTask {
    action: Mutex<Action>,
    period: Option<Duration>,
    cancelled: AtomicBool,
    runs: AtomicU64,
}

impl TimerTask {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Runs the action once. A panic is logged and does not affect later runs.
    fn run_once(&self) {
        let mut action = self.action.lock();
        if catch_unwind(AssertUnwindSafe(|| (*action)())).is_err() {
            warn!(pool = %PoolName::Scheduled, "scheduled task panicked");
        }
        self.runs.fetch_add(1, Ordering::AcqRel);
    }
}

struct Entry {
    due: Instant,
    seq: u64,
    task: Arc<TimerTask>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

struct TimerState {
    // Earliest due time on top; `seq` keeps submission order among equal due times.
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    open: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerShared {
    fn enqueue(&self, task: Arc<TimerTask>, due: Instant) -> bool {
        let mut state = self.state.lock();
        if !state.open {
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Reverse(Entry { due, seq, task }));
        self.wake.notify_one();
        true
    }
}

/// Owns the timer thread that feeds the scheduled pool.
pub(crate) struct Scheduler {
    shared: Arc<TimerShared>,
}

impl Scheduler {
    pub(crate) fn start(pool: Arc<WorkerPool>) -> Result<Self, SubmitError> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                open: true,
            }),
            wake: Condvar::new(),
        });

        let timer_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("{}-timer", PoolName::Scheduled))
            .spawn(move || run_timer(&timer_shared, &pool))
            .map_err(|err| {
                error!(pool = %PoolName::Scheduled, error = %err, "failed to start timer thread");
                SubmitError::NoThread { pool: PoolName::Scheduled }
            })?;

        Ok(Self { shared })
    }

    pub(crate) fn schedule(
        &self,
        action: Action,
        delay: Duration,
        period: Option<Duration>,
    ) -> Result<ScheduledTask, SubmitError> {
        let task = Arc::new(TimerTask {
            action: Mutex::new(action),
            period,
            cancelled: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        });

        if !self.shared.enqueue(Arc::clone(&task), due_after(Instant::now(), delay)) {
            return Err(SubmitError::ShutDown { pool: PoolName::Scheduled });
        }

        Ok(ScheduledTask { task })
    }

    /// Stops the timer thread and cancels every task that has not been handed to the pool yet.
    ///
    /// Returns the number of cancelled tasks.
    pub(crate) fn close(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.open = false;

        let pending = state.heap.len();
        for Reverse(entry) in state.heap.drain() {
            entry.task.cancelled.store(true, Ordering::Release);
        }

        self.shared.wake.notify_all();
        pending
    }
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Scheduler")
            .field("pending", &state.heap.len())
            .field("open", &state.open)
            .finish()
    }
}

fn run_timer(shared: &Arc<TimerShared>, pool: &Arc<WorkerPool>) {
    let mut state = shared.state.lock();

    while state.open {
        let now = Instant::now();
        let next_due = state.heap.peek().map(|Reverse(entry)| entry.due);

        match next_due {
            None => shared.wake.wait(&mut state),
            Some(due) if due > now => {
                _ = shared.wake.wait_until(&mut state, due);
            }
            Some(_) => {
                if let Some(Reverse(entry)) = state.heap.pop() {
                    // Caller-runs may execute the task right here, so never hold the lock while dispatching.
                    MutexGuard::unlocked(&mut state, || dispatch(shared, pool, entry));
                }
            }
        }
    }

    debug!(pool = %PoolName::Scheduled, "timer thread stopped");
}

fn dispatch(shared: &Arc<TimerShared>, pool: &WorkerPool, entry: Entry) {
    let Entry { due, task, .. } = entry;
    if task.is_cancelled() {
        return;
    }

    let shared = Arc::clone(shared);
    let submitted = pool.submit(move || {
        if task.is_cancelled() {
            return;
        }

        task.run_once();

        if let Some(period) = task.period
            && !task.is_cancelled()
        {
            // Fixed rate, but a run that overshoots its period does not cause a burst of catch-up runs.
            let next = due_after(due, period).max(Instant::now());
            if !shared.enqueue(Arc::clone(&task), next) {
                // The timer closed while this run was in flight.
                task.cancelled.store(true, Ordering::Release);
            }
        }
    });

    if let Err(err) = submitted {
        debug!(error = %err, "scheduled task dropped");
    }
}
