// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

mod log;

pub use log::*;

/// If something (whatever) does not happen in a test within this time, the test will fail.
///
/// We are conservative here and allow much time - this is only to break out of deadlocks and
/// infinite loops, not for any situations that are actually expected.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How often [`wait_until`] re-evaluates its condition.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Executes a thread-safe function on a background thread and abandons it if
/// it does not complete before [`TEST_TIMEOUT`].
///
/// Returns `None` if the function timed out or panicked.
#[must_use]
pub fn execute_or_abandon<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (sender, receiver) = mpsc::channel();

    // There are multiple ways for the called function to fail:
    // 1. It fails to finish in the allowed time span.
    // 2. It panics, so the result is never sent.
    //
    // In both cases, the channel will get closed and recv_timeout
    // will signal an error saying the channel is broken.
    thread::spawn(move || {
        let result = f();
        _ = sender.send(result);
    });

    receiver.recv_timeout(TEST_TIMEOUT).ok()
}

/// Polls `condition` until it holds or [`TEST_TIMEOUT`] passes.
///
/// Returns whether the condition was observed to hold. Meant for state that other threads
/// change asynchronously, such as worker counts or scheduled run counters.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_TIMEOUT;

    loop {
        if condition() {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Standard test data generator - `len` bytes of a repeating sequence from 0 to 255.
#[must_use]
pub fn repeating_incrementing_bytes(len: usize) -> Vec<u8> {
    (0..=u8::MAX).cycle().take(len).collect()
}
