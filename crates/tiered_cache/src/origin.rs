// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;

use bytes::Bytes;
use thiserror::Error;

/// Where assets come from when neither memory nor disk has them.
///
/// `fetch` blocks. The cache calls it from whichever thread runs the loader for a key,
/// which is a dispatcher worker when the lookup goes through
/// [`TieredCache::load`](crate::TieredCache::load).
///
/// Any `Fn(&str) -> Result<Bytes, FetchError>` closure is an origin.
pub trait Origin: Send + Sync {
    /// Downloads the raw bytes behind `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the bytes could not be retrieved.
    fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

impl<F> Origin for F
where
    F: Fn(&str) -> Result<Bytes, FetchError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self(url)
    }
}

/// An origin could not deliver an asset.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The origin answered with a non-success status.
    #[error("origin responded with status {0}")]
    Status(u16),

    /// The origin could not be reached or the transfer broke off.
    #[error("origin unavailable: {0}")]
    Unavailable(String),

    /// Reading the response failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
