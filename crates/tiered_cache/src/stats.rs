// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// A read-only snapshot of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub struct CacheStats {
    /// Entries in the memory tier.
    pub memory_count: u64,
    /// Total size of the disk records.
    pub disk_bytes: u64,
    /// Number of disk records.
    pub disk_records: u64,
    /// Whether the disk tier is in use.
    pub disk_enabled: bool,
}

/// What [`TieredCache::clear`](crate::TieredCache::clear) did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub struct ClearSummary {
    /// Files deleted from the disk root.
    pub files_removed: u64,
    /// Files that could not be deleted. Each one was logged.
    pub files_failed: u64,
}

impl ClearSummary {
    /// Whether every file was deleted.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.files_failed == 0
    }
}
