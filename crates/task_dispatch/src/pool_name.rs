// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

/// Identifies one of the dispatcher's worker pools.
///
/// Each pool is an independent concurrency domain with its own threads and backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum PoolName {
    /// Asset downloads. Network-bound and independent, so this pool runs the most threads.
    ImageFetch,
    /// Calls to the remote catalog or search API. Kept narrow to stay under the origin's rate limit.
    OriginApi,
    /// File I/O, persistence and other background work that does not touch the network.
    General,
    /// Delayed and periodic work handed over by the timer thread.
    Scheduled,
}

impl PoolName {
    /// All pools, in a stable order.
    pub const ALL: [Self; 4] = [Self::ImageFetch, Self::OriginApi, Self::General, Self::Scheduled];

    /// The pool's name as used in logs and thread names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImageFetch => "image-fetch",
            Self::OriginApi => "origin-api",
            Self::General => "general",
            Self::Scheduled => "scheduled",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::ImageFetch => 0,
            Self::OriginApi => 1,
            Self::General => 2,
            Self::Scheduled => 3,
        }
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PoolName::ImageFetch, "image-fetch")]
    #[case(PoolName::OriginApi, "origin-api")]
    #[case(PoolName::General, "general")]
    #[case(PoolName::Scheduled, "scheduled")]
    fn display_uses_kebab_case(#[case] pool: PoolName, #[case] expected: &str) {
        assert_eq!(pool.to_string(), expected);
    }

    #[test]
    fn indices_are_distinct_and_dense() {
        let mut seen = [false; 4];
        for pool in PoolName::ALL {
            assert!(!seen[pool.index()], "{pool} shares an index");
            seen[pool.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
