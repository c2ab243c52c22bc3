// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

/// Lifecycle of a single pool.
///
/// States only ever move forward, one step at a time:
/// `Uninitialized → Running → Draining → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolState {
    /// No work has been submitted yet, so no threads exist.
    Uninitialized,
    /// Threads are started on demand and work is accepted.
    Running,
    /// No new work is accepted; queued and running work is finishing.
    Draining,
    /// All threads have exited, or the grace period ran out and leftover work was cancelled.
    Terminated,
}

impl PoolState {
    /// The state that follows this one, if any.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Uninitialized => Some(Self::Running),
            Self::Running => Some(Self::Draining),
            Self::Draining => Some(Self::Terminated),
            Self::Terminated => None,
        }
    }

    /// Whether a pool in this state takes new work.
    #[must_use]
    pub const fn accepts_work(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Running)
    }

    /// Moves to the successor state and returns it.
    ///
    /// A terminated pool stays terminated.
    pub(crate) fn advance(&mut self) -> Self {
        if let Some(next) = self.successor() {
            *self = next;
        }
        *self
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_walks_every_state_in_order() {
        let mut state = PoolState::Uninitialized;
        let mut visited = vec![state];
        while state != PoolState::Terminated {
            visited.push(state.advance());
        }

        assert_eq!(
            visited,
            [
                PoolState::Uninitialized,
                PoolState::Running,
                PoolState::Draining,
                PoolState::Terminated
            ]
        );
    }

    #[test]
    fn terminated_is_final() {
        let mut state = PoolState::Terminated;
        assert_eq!(state.advance(), PoolState::Terminated);
        assert_eq!(state.successor(), None);
    }

    #[test]
    fn only_early_states_accept_work() {
        assert!(PoolState::Uninitialized.accepts_work());
        assert!(PoolState::Running.accepts_work());
        assert!(!PoolState::Draining.accepts_work());
        assert!(!PoolState::Terminated.accepts_work());
    }
}
