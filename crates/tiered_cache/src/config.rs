// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};

/// Configuration of a [`TieredCache`](crate::TieredCache).
///
/// # Examples
///
/// ```
/// use tiered_cache::CacheConfig;
///
/// let config = CacheConfig::default()
///     .with_disk_root("/var/cache/covers")
///     .with_extension("jpg")
///     .with_min_valid_bytes(2048);
///
/// assert_eq!(config.extension(), "jpg");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    disk_root: Option<PathBuf>,
    extension: String,
    min_valid_bytes: usize,
}

impl CacheConfig {
    const DEFAULT_EXTENSION: &'static str = "img";
    const DEFAULT_MIN_VALID_BYTES: usize = 1024;

    /// Keeps disk records in `root`, creating it when the cache is constructed.
    ///
    /// Without a disk root the cache runs with memory and origin only.
    #[must_use]
    pub fn with_disk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.disk_root = Some(root.into());
        self
    }

    /// Sets the file extension of disk records, without the leading dot.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Sets the size below which bytes are treated as a truncated download.
    #[must_use]
    pub const fn with_min_valid_bytes(mut self, min_valid_bytes: usize) -> Self {
        self.min_valid_bytes = min_valid_bytes;
        self
    }

    /// The directory holding disk records, if the disk tier is configured.
    #[must_use]
    pub fn disk_root(&self) -> Option<&Path> {
        self.disk_root.as_deref()
    }

    /// The file extension of disk records.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The minimum size of valid bytes.
    #[must_use]
    pub const fn min_valid_bytes(&self) -> usize {
        self.min_valid_bytes
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            disk_root: None,
            extension: Self::DEFAULT_EXTENSION.to_owned(),
            min_valid_bytes: Self::DEFAULT_MIN_VALID_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.disk_root(), None);
        assert_eq!(config.extension(), "img");
        assert_eq!(config.min_valid_bytes(), 1024);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_config_keeps_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"disk_root":"/tmp/covers"}"#).unwrap();
        assert_eq!(config.disk_root(), Some(Path::new("/tmp/covers")));
        assert_eq!(config.min_valid_bytes(), 1024);
    }
}
