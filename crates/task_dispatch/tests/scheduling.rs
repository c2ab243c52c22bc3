// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]

//! Tests for delayed and periodic work.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use task_dispatch::{DispatcherConfig, PoolName, TaskDispatcher};
use testing_aids::wait_until;

#[test]
fn delayed_task_runs_on_scheduled_pool() {
    let dispatcher = TaskDispatcher::new(DispatcherConfig::default()).unwrap();
    let thread_name = Arc::new(parking_lot::Mutex::new(None));

    let started = Instant::now();
    let task = dispatcher
        .schedule(
            {
                let thread_name = Arc::clone(&thread_name);
                move || *thread_name.lock() = thread::current().name().map(str::to_owned)
            },
            Duration::from_millis(20),
        )
        .unwrap();

    assert!(wait_until(|| task.run_count() == 1));
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(
        thread_name
            .lock()
            .as_deref()
            .is_some_and(|name| name.starts_with(PoolName::Scheduled.as_str()))
    );
    assert_eq!(task.period(), None);
}

#[test]
fn cancelled_task_never_runs() {
    let dispatcher = TaskDispatcher::new(DispatcherConfig::default()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let task = dispatcher
        .schedule(
            {
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::AcqRel);
                }
            },
            Duration::from_millis(30),
        )
        .unwrap();
    task.cancel();

    thread::sleep(Duration::from_millis(80));
    assert_eq!(runs.load(Ordering::Acquire), 0);
    assert!(task.is_cancelled());
}

#[test]
fn repeating_task_runs_more_than_once() {
    let dispatcher = TaskDispatcher::new(DispatcherConfig::default()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let task = dispatcher
        .schedule_repeating(
            {
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::AcqRel);
                }
            },
            Duration::from_millis(5),
            Duration::from_millis(5),
        )
        .unwrap();

    assert!(wait_until(|| runs.load(Ordering::Acquire) >= 3));
    assert_eq!(task.period(), Some(Duration::from_millis(5)));
    task.cancel();
}

#[test]
fn repeating_task_survives_panics() {
    let dispatcher = TaskDispatcher::new(DispatcherConfig::default()).unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let task = dispatcher
        .schedule_repeating(
            {
                let attempts = Arc::clone(&attempts);
                move || {
                    let attempt = attempts.fetch_add(1, Ordering::AcqRel);
                    assert!(attempt != 0, "first run fails");
                }
            },
            Duration::ZERO,
            Duration::from_millis(5),
        )
        .unwrap();

    assert!(wait_until(|| task.run_count() >= 3));
    task.cancel();
    assert!(wait_until(|| dispatcher.active_count() == 0));
}

#[test]
fn shutdown_cancels_pending_timers() {
    let dispatcher = TaskDispatcher::new(DispatcherConfig::default()).unwrap();

    let later = dispatcher.schedule(|| (), Duration::from_secs(60)).unwrap();
    let periodic = dispatcher
        .schedule_repeating(|| (), Duration::from_secs(60), Duration::from_secs(60))
        .unwrap();

    let report = dispatcher.shutdown(Duration::from_secs(1));

    assert_eq!(report.timers_cancelled, 2);
    assert!(report.is_clean());
    assert!(later.is_cancelled());
    assert!(periodic.is_cancelled());
    assert_eq!(later.run_count(), 0);
}

#[test]
fn dropping_dispatcher_stops_repeating_tasks() {
    let dispatcher = TaskDispatcher::new(DispatcherConfig::default()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let task = dispatcher
        .schedule_repeating(
            {
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::AcqRel);
                }
            },
            Duration::ZERO,
            Duration::from_millis(5),
        )
        .unwrap();
    assert!(wait_until(|| task.run_count() >= 2));

    drop(dispatcher);

    assert!(wait_until(|| task.is_cancelled()));
    // A run already handed to the pool may still finish.
    thread::sleep(Duration::from_millis(20));
    let settled = runs.load(Ordering::Acquire);
    thread::sleep(Duration::from_millis(60));
    assert_eq!(runs.load(Ordering::Acquire), settled);
}

#[test]
fn maximal_delay_does_not_overflow() {
    let dispatcher = TaskDispatcher::new(DispatcherConfig::default()).unwrap();

    let task = dispatcher.schedule(|| (), Duration::MAX).unwrap();
    let report = dispatcher.shutdown(Duration::MAX);

    assert_eq!(report.timers_cancelled, 1);
    assert!(report.is_clean());
    assert!(task.is_cancelled());
    assert_eq!(task.run_count(), 0);
}
