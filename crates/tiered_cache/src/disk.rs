// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The persistent tier: one flat directory of raw downloads.
//!
//! There is no index. A record is a file named `<16 hex digits>.<ext>`; whether it is
//! usable is decided by validating its contents on read.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder as TempBuilder;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{CacheKey, ClearSummary};

const TEMP_PREFIX: &str = ".incoming-";

/// Raw bytes on disk, addressed by [`CacheKey`].
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
    extension: String,
}

impl DiskStore {
    /// Opens a store in `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::CreateRoot`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self, DiskError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| DiskError::CreateRoot {
            path: root.clone(),
            source,
        })?;

        Ok(Self {
            root,
            extension: extension.into(),
        })
    }

    /// The directory holding the records.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the record for `key` lives, whether or not it exists.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.{}", key.file_stem(), self.extension))
    }

    /// Reads the record for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::Io`] for any failure other than the record being absent.
    pub fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, DiskError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Stores `bytes` as the record for `key`, replacing any previous record.
    ///
    /// The bytes go to a temporary file in the same directory that is renamed into place,
    /// so readers see either the old record, the new one, or none; never a partial file.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::Io`] if the temporary file cannot be written or renamed.
    pub fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), DiskError> {
        let mut temp = TempBuilder::new().prefix(TEMP_PREFIX).tempfile_in(&self.root)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;

        // A failed persist drops the temporary file, which deletes it.
        temp.persist(self.path_for(key)).map_err(|err| DiskError::Io(err.error))?;
        Ok(())
    }

    /// Deletes the record for `key`. Returns whether there was one.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::Io`] for any failure other than the record being absent.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, DiskError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes every file in the root directory.
    ///
    /// A file that cannot be deleted is logged and counted; the rest are still deleted.
    #[must_use]
    pub fn clear(&self) -> ClearSummary {
        let mut summary = ClearSummary::default();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(root = %self.root.display(), error = %err, "cannot list cache directory");
                summary.files_failed += 1;
                return summary;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    warn!(root = %self.root.display(), error = %err, "cannot read cache directory entry");
                    summary.files_failed += 1;
                    continue;
                }
            };

            if path.is_dir() {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => summary.files_removed += 1,
                // Someone else got there first.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to delete cached file");
                    summary.files_failed += 1;
                }
            }
        }

        debug!(
            root = %self.root.display(),
            removed = summary.files_removed,
            failed = summary.files_failed,
            "disk tier cleared"
        );
        summary
    }

    /// Counts records and their total size. Temporary files are not records.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::Io`] if the directory cannot be listed.
    pub fn usage(&self) -> Result<DiskUsage, DiskError> {
        let mut usage = DiskUsage::default();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !self.is_record(&path) {
                continue;
            }

            // A record deleted between listing and stat is simply not counted.
            if let Ok(metadata) = entry.metadata()
                && metadata.is_file()
            {
                usage.records += 1;
                usage.bytes += metadata.len();
            }
        }

        Ok(usage)
    }

    fn is_record(&self, path: &Path) -> bool {
        let is_temp = path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.starts_with(TEMP_PREFIX));

        !is_temp && path.extension() == Some(OsStr::new(&self.extension))
    }
}

/// Space taken by the disk tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct DiskUsage {
    /// Total size of all records.
    pub bytes: u64,
    /// Number of records.
    pub records: u64,
}

/// A disk operation failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiskError {
    /// The root directory could not be created.
    #[error("cannot create cache directory {}", path.display())]
    CreateRoot {
        /// The directory that was requested.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// Reading, writing or deleting a record failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
