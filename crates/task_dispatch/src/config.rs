// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sizing and overflow configuration for the dispatcher's pools.

use std::time::Duration;

use thiserror::Error;

use crate::PoolName;

/// What a pool does with new work when its backlog is full and it already runs
/// its maximum number of threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum OverflowPolicy {
    /// Run the work on the submitting thread. Nothing is dropped; the submitter slows down.
    #[default]
    CallerRuns,
    /// Refuse the work with [`SubmitError::Rejected`](crate::SubmitError::Rejected).
    Reject,
}

/// Sizing of a single pool.
///
/// Threads are started on demand. Up to `core_threads` are started before anything is
/// queued; extra threads up to `max_threads` are only started once the backlog is full,
/// and they exit again after `keep_alive` without work.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Threads kept alive while the pool is running.
    pub core_threads: usize,
    /// Upper bound on threads, including core threads.
    pub max_threads: usize,
    /// Capacity of the backlog queue.
    pub queue_capacity: usize,
    /// How long a thread above the core count waits for work before exiting.
    pub keep_alive: Duration,
    /// Behavior when the backlog is full at maximum thread count.
    pub overflow: OverflowPolicy,
}

impl PoolConfig {
    const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

    /// Creates a configuration with the given thread bounds and backlog size.
    #[must_use]
    pub const fn new(core_threads: usize, max_threads: usize, queue_capacity: usize) -> Self {
        Self {
            core_threads,
            max_threads,
            queue_capacity,
            keep_alive: Self::DEFAULT_KEEP_ALIVE,
            overflow: OverflowPolicy::CallerRuns,
        }
    }

    /// Sets the idle time after which threads above the core count exit.
    #[must_use]
    pub const fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the overflow policy.
    #[must_use]
    pub const fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// The default sizing for the given pool.
    #[must_use]
    pub const fn default_for(pool: PoolName) -> Self {
        match pool {
            PoolName::ImageFetch => Self::new(4, 8, 100),
            PoolName::OriginApi => Self::new(1, 2, 32),
            PoolName::General => Self::new(2, 4, 64),
            PoolName::Scheduled => Self::new(2, 2, 64),
        }
    }

    /// Checks that the configuration describes a pool that can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_threads` is zero, smaller than `core_threads`,
    /// or if `queue_capacity` is zero.
    pub fn validate(&self, pool: PoolName) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::NoThreads { pool });
        }

        if self.max_threads < self.core_threads {
            return Err(ConfigError::MaxBelowCore {
                pool,
                core: self.core_threads,
                max: self.max_threads,
            });
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::EmptyQueue { pool });
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::default_for(PoolName::General)
    }
}

/// Configuration for all four pools of a [`TaskDispatcher`](crate::TaskDispatcher).
///
/// # Examples
///
/// ```
/// use task_dispatch::{DispatcherConfig, OverflowPolicy, PoolConfig, PoolName};
///
/// let config = DispatcherConfig::default()
///     .with_pool(PoolName::OriginApi, PoolConfig::new(1, 1, 16).with_overflow(OverflowPolicy::Reject));
///
/// assert_eq!(config.pool(PoolName::OriginApi).max_threads, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DispatcherConfig {
    /// Sizing of the image-fetch pool.
    pub image_fetch: PoolConfig,
    /// Sizing of the origin-API pool.
    pub origin_api: PoolConfig,
    /// Sizing of the general pool.
    pub general: PoolConfig,
    /// Sizing of the scheduled pool.
    pub scheduled: PoolConfig,
}

impl DispatcherConfig {
    /// Returns the configuration of one pool.
    #[must_use]
    pub const fn pool(&self, pool: PoolName) -> &PoolConfig {
        match pool {
            PoolName::ImageFetch => &self.image_fetch,
            PoolName::OriginApi => &self.origin_api,
            PoolName::General => &self.general,
            PoolName::Scheduled => &self.scheduled,
        }
    }

    /// Replaces the configuration of one pool.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolName, config: PoolConfig) -> Self {
        *self.pool_mut(pool) = config;
        self
    }

    /// Validates every pool.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, in [`PoolName::ALL`] order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PoolName::ALL.iter().try_for_each(|pool| self.pool(*pool).validate(*pool))
    }

    fn pool_mut(&mut self, pool: PoolName) -> &mut PoolConfig {
        match pool {
            PoolName::ImageFetch => &mut self.image_fetch,
            PoolName::OriginApi => &mut self.origin_api,
            PoolName::General => &mut self.general,
            PoolName::Scheduled => &mut self.scheduled,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            image_fetch: PoolConfig::default_for(PoolName::ImageFetch),
            origin_api: PoolConfig::default_for(PoolName::OriginApi),
            general: PoolConfig::default_for(PoolName::General),
            scheduled: PoolConfig::default_for(PoolName::Scheduled),
        }
    }
}

/// A pool configuration that cannot work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The pool would never start a thread.
    #[error("pool {pool} must allow at least one thread")]
    NoThreads {
        /// The misconfigured pool.
        pool: PoolName,
    },

    /// The thread ceiling is below the core thread count.
    #[error("pool {pool} has max_threads {max} below core_threads {core}")]
    MaxBelowCore {
        /// The misconfigured pool.
        pool: PoolName,
        /// Configured core threads.
        core: usize,
        /// Configured maximum threads.
        max: usize,
    },

    /// The backlog could never hold any work.
    #[error("pool {pool} must have a queue capacity of at least one")]
    EmptyQueue {
        /// The misconfigured pool.
        pool: PoolName,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DispatcherConfig::default().validate().unwrap();
    }

    #[test]
    fn origin_api_is_narrower_than_image_fetch() {
        let config = DispatcherConfig::default();
        assert!(config.pool(PoolName::OriginApi).max_threads < config.pool(PoolName::ImageFetch).max_threads);
    }

    #[test]
    fn zero_max_threads_is_rejected() {
        let err = PoolConfig::new(0, 0, 10).validate(PoolName::General).unwrap_err();
        assert_eq!(err, ConfigError::NoThreads { pool: PoolName::General });
    }

    #[test]
    fn max_below_core_is_rejected() {
        let err = PoolConfig::new(4, 2, 10).validate(PoolName::ImageFetch).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MaxBelowCore {
                pool: PoolName::ImageFetch,
                core: 4,
                max: 2
            }
        );
        assert_eq!(err.to_string(), "pool image-fetch has max_threads 2 below core_threads 4");
    }

    #[test]
    fn zero_queue_is_rejected() {
        let config = DispatcherConfig::default().with_pool(PoolName::Scheduled, PoolConfig::new(1, 1, 0));
        assert_eq!(config.validate().unwrap_err(), ConfigError::EmptyQueue { pool: PoolName::Scheduled });
    }

    #[test]
    fn zero_core_threads_is_allowed() {
        PoolConfig::new(0, 2, 4).validate(PoolName::General).unwrap();
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_config() {
        let config: DispatcherConfig = serde_json::from_str(
            r#"{ "origin_api": { "core_threads": 1, "max_threads": 1, "overflow": "reject" } }"#,
        )
        .unwrap();

        assert_eq!(config.origin_api.max_threads, 1);
        assert_eq!(config.origin_api.overflow, OverflowPolicy::Reject);
        assert_eq!(config.image_fetch, PoolConfig::default_for(PoolName::ImageFetch));
    }
}
