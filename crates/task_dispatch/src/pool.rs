// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A single bounded pool of worker threads.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::counter::ActiveCounter;
use crate::job::{Job, package};
use crate::{OverflowPolicy, PoolConfig, PoolName, PoolState, SubmitError, TaskHandle};

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Which pool this describes.
    pub pool: PoolName,
    /// Current lifecycle state.
    pub state: PoolState,
    /// Worker threads that have not exited yet.
    pub live_threads: usize,
    /// Work waiting in the backlog.
    pub queued: usize,
    /// Work that has finished, on a worker or on a submitting thread.
    pub completed: u64,
    /// Work that ran on the submitting thread because the pool was saturated.
    pub caller_runs: u64,
}

/// How a pool ended up terminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every queued and running item finished within the grace period.
    Drained,
    /// The grace period ran out. Queued items were dropped without running; items
    /// that were already running are left to finish on detached threads.
    Forced {
        /// Queued items that were dropped.
        cancelled: usize,
    },
}

/// State shared between the pool and its worker threads.
#[derive(Debug, Default)]
struct Shared {
    live_threads: AtomicUsize,
    completed: AtomicU64,
    cancelled: AtomicBool,
    // Held while a submitter enqueues and checks for live workers, and while a worker
    // retires, so the last worker cannot leave behind a job it was never told about.
    membership: Mutex<()>,
}

/// Channel ends that exist while the pool is running.
struct Queue {
    jobs_tx: Sender<Job>,
    jobs_rx: Receiver<Job>,
    // Never sent on. Each worker holds a clone, so the receiver disconnects once the last worker exits.
    alive_tx: Sender<()>,
    alive_rx: Receiver<()>,
}

#[derive(Debug)]
struct Inner {
    state: PoolState,
    queue: Option<Queue>,
    caller_runs: u64,
    threads_started: u64,
}

/// What to do with a job after the pool has looked at it.
enum Admission {
    Accepted,
    RunHere(Job),
    Refused(SubmitError),
}

/// Receivers kept between the start and the end of a drain.
pub(crate) struct DrainTicket {
    receivers: Option<(Receiver<Job>, Receiver<()>)>,
}

/// A bounded pool of OS threads with a bounded backlog.
///
/// Threads are started lazily: the first submission moves the pool from
/// [`PoolState::Uninitialized`] to [`PoolState::Running`].
pub(crate) struct WorkerPool {
    name: PoolName,
    config: PoolConfig,
    active: ActiveCounter,
    shared: Arc<Shared>,
    inner: Mutex<Inner>,
}

impl WorkerPool {
    pub(crate) fn new(name: PoolName, config: PoolConfig, active: ActiveCounter) -> Self {
        Self {
            name,
            config,
            active,
            shared: Arc::default(),
            inner: Mutex::new(Inner {
                state: PoolState::Uninitialized,
                queue: None,
                caller_runs: 0,
                threads_started: 0,
            }),
        }
    }

    pub(crate) fn submit<F, R>(&self, action: F) -> Result<TaskHandle<R>, SubmitError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (job, handle) = package(self.name, &self.active, action);
        self.execute(job)?;
        Ok(handle)
    }

    /// Hands a packaged job to the pool, running it on the current thread if the
    /// pool is saturated and configured for caller-runs.
    pub(crate) fn execute(&self, job: Job) -> Result<(), SubmitError> {
        match self.admit(job) {
            Admission::Accepted => Ok(()),
            Admission::RunHere(job) => {
                job();
                self.shared.completed.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Admission::Refused(err) => Err(err),
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            pool: self.name,
            state: inner.state,
            live_threads: self.shared.live_threads.load(Ordering::Acquire),
            queued: inner.queue.as_ref().map_or(0, |q| q.jobs_rx.len()),
            completed: self.shared.completed.load(Ordering::Acquire),
            caller_runs: inner.caller_runs,
        }
    }

    /// Stops accepting work and lets the workers run down the backlog.
    ///
    /// Returns `None` if the pool is already draining or terminated.
    pub(crate) fn begin_drain(&self) -> Option<DrainTicket> {
        let mut inner = self.inner.lock();

        match inner.state {
            PoolState::Uninitialized => {
                let state = inner.state.advance();
                debug!(pool = %self.name, %state, "pool was never used");
            }
            PoolState::Running => {}
            PoolState::Draining | PoolState::Terminated => return None,
        }

        let state = inner.state.advance();
        info!(pool = %self.name, %state, "pool stopped accepting work");

        // Dropping the senders lets idle workers observe disconnection once the backlog is empty.
        let receivers = inner.queue.take().map(|queue| {
            let Queue {
                jobs_tx,
                jobs_rx,
                alive_tx,
                alive_rx,
            } = queue;
            drop(jobs_tx);
            drop(alive_tx);
            (jobs_rx, alive_rx)
        });

        Some(DrainTicket { receivers })
    }

    /// Waits until every worker has exited or `deadline` passes, then terminates the pool.
    ///
    /// Without a deadline, waits for as long as the workers take.
    pub(crate) fn finish_drain(&self, ticket: DrainTicket, deadline: Option<Instant>) -> DrainOutcome {
        let outcome = match ticket.receivers {
            None => DrainOutcome::Drained,
            Some((jobs_rx, alive_rx)) => {
                let all_exited = match deadline {
                    Some(deadline) => alive_rx.recv_deadline(deadline),
                    None => alive_rx.recv().map_err(|_disconnected| RecvTimeoutError::Disconnected),
                };

                match all_exited {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => DrainOutcome::Drained,
                    Err(RecvTimeoutError::Timeout) => {
                        self.shared.cancelled.store(true, Ordering::Release);
                        // Dropping a job resolves its handle as cancelled.
                        let cancelled = jobs_rx.try_iter().count();
                        warn!(pool = %self.name, cancelled, "grace period expired, cancelling queued work");
                        DrainOutcome::Forced { cancelled }
                    }
                }
            }
        };

        let state = self.inner.lock().state.advance();
        info!(pool = %self.name, %state, ?outcome, "pool terminated");
        outcome
    }

    fn admit(&self, job: Job) -> Admission {
        let mut inner = self.inner.lock();

        if inner.state == PoolState::Uninitialized {
            self.start(&mut inner);
        }

        if inner.state != PoolState::Running {
            return Admission::Refused(SubmitError::ShutDown { pool: self.name });
        }

        let live = self.shared.live_threads.load(Ordering::Acquire);
        if live < self.config.core_threads {
            return self.spawn_worker(&mut inner, Some(job));
        }

        let Some(queue) = inner.queue.as_ref() else {
            return Admission::Refused(SubmitError::ShutDown { pool: self.name });
        };

        let _membership = self.shared.membership.lock();
        match queue.jobs_tx.try_send(job) {
            Ok(()) => {
                // With zero core threads the last worker may have retired already.
                if self.shared.live_threads.load(Ordering::Acquire) == 0 {
                    _ = self.spawn_worker(&mut inner, None);
                }
                Admission::Accepted
            }
            Err(TrySendError::Full(job)) if live < self.config.max_threads => self.spawn_worker(&mut inner, Some(job)),
            Err(TrySendError::Full(job)) => self.overflow(&mut inner, job),
            Err(TrySendError::Disconnected(_job)) => Admission::Refused(SubmitError::ShutDown { pool: self.name }),
        }
    }

    fn start(&self, inner: &mut Inner) {
        let (jobs_tx, jobs_rx) = crossbeam_channel::bounded(self.config.queue_capacity);
        let (alive_tx, alive_rx) = crossbeam_channel::bounded(0);

        inner.queue = Some(Queue {
            jobs_tx,
            jobs_rx,
            alive_tx,
            alive_rx,
        });

        let state = inner.state.advance();
        debug!(
            pool = %self.name,
            %state,
            core_threads = self.config.core_threads,
            max_threads = self.config.max_threads,
            queue_capacity = self.config.queue_capacity,
            "pool started"
        );
    }

    fn spawn_worker(&self, inner: &mut Inner, first: Option<Job>) -> Admission {
        let Some(queue) = inner.queue.as_ref() else {
            return Admission::Refused(SubmitError::ShutDown { pool: self.name });
        };

        let worker = Worker {
            pool: self.name,
            core_threads: self.config.core_threads,
            keep_alive: self.config.keep_alive,
            jobs: queue.jobs_rx.clone(),
            _alive: queue.alive_tx.clone(),
            shared: Arc::clone(&self.shared),
        };

        // Lets us take the first job back if the thread cannot be started.
        let first = Arc::new(Mutex::new(first));
        let first_for_worker = Arc::clone(&first);

        inner.threads_started += 1;
        self.shared.live_threads.fetch_add(1, Ordering::AcqRel);

        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.name, inner.threads_started))
            .spawn(move || {
                let first = first_for_worker.lock().take();
                worker.run(first);
            });

        match spawned {
            Ok(_detached) => Admission::Accepted,
            Err(err) => {
                self.shared.live_threads.fetch_sub(1, Ordering::AcqRel);
                error!(pool = %self.name, error = %err, "failed to start worker thread");

                match first.lock().take() {
                    Some(job) => self.overflow(inner, job),
                    None => Admission::Accepted,
                }
            }
        }
    }

    fn overflow(&self, inner: &mut Inner, job: Job) -> Admission {
        match self.config.overflow {
            OverflowPolicy::CallerRuns => {
                inner.caller_runs += 1;
                debug!(pool = %self.name, "pool saturated, running on submitting thread");
                Admission::RunHere(job)
            }
            OverflowPolicy::Reject => {
                warn!(pool = %self.name, "pool saturated, rejecting work");
                Admission::Refused(SubmitError::Rejected { pool: self.name })
            }
        }
    }
}

impl Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("queued", &self.jobs_rx.len()).finish_non_exhaustive()
    }
}

impl Debug for DrainTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainTicket").finish_non_exhaustive()
    }
}

struct Worker {
    pool: PoolName,
    core_threads: usize,
    keep_alive: Duration,
    jobs: Receiver<Job>,
    _alive: Sender<()>,
    shared: Arc<Shared>,
}

impl Worker {
    fn run(self, first: Option<Job>) {
        if let Some(job) = first {
            self.run_job(job);
        }

        loop {
            if self.shared.cancelled.load(Ordering::Acquire) {
                break;
            }

            let job = if self.shared.live_threads.load(Ordering::Acquire) > self.core_threads {
                match self.jobs.recv_timeout(self.keep_alive) {
                    Ok(job) => job,
                    Err(RecvTimeoutError::Timeout) => {
                        if self.try_retire() {
                            debug!(pool = %self.pool, "idle worker retired");
                            return;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.jobs.recv() {
                    Ok(job) => job,
                    Err(_disconnected) => break,
                }
            };

            if self.shared.cancelled.load(Ordering::Acquire) {
                drop(job);
                break;
            }

            self.run_job(job);
        }

        self.shared.live_threads.fetch_sub(1, Ordering::AcqRel);
    }

    fn run_job(&self, job: Job) {
        job();
        self.shared.completed.fetch_add(1, Ordering::AcqRel);
    }

    /// Gives up this thread's slot if the pool runs more than its core threads and
    /// nothing is waiting in the backlog.
    fn try_retire(&self) -> bool {
        let _membership = self.shared.membership.lock();
        if !self.jobs.is_empty() {
            return false;
        }

        self.shared
            .live_threads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live > self.core_threads).then(|| live - 1)
            })
            .is_ok()
    }
}
