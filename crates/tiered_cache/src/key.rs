// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use http::Uri;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The identifier of a cached asset: the URL it is fetched from.
///
/// The URL string is used verbatim as the memory key. Its 64-bit xxHash3, rendered as
/// 16 lowercase hex digits, names the disk record.
///
/// # Examples
///
/// ```
/// use tiered_cache::{CacheKey, KeyError};
///
/// let key = CacheKey::parse("https://example.com/covers/1.jpg")?;
/// assert_eq!(key.as_str(), "https://example.com/covers/1.jpg");
/// assert_eq!(key.file_stem().len(), 16);
///
/// assert_eq!(CacheKey::parse(""), Err(KeyError::Empty));
/// assert_eq!(CacheKey::parse("not-a-url"), Err(KeyError::Invalid));
/// # Ok::<(), KeyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    url: String,
}

impl CacheKey {
    /// Accepts `http` and `https` URLs with a non-empty host.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Empty`] for an empty string and [`KeyError::Invalid`] for
    /// anything that is not an http(s) URL.
    pub fn parse(url: &str) -> Result<Self, KeyError> {
        if url.is_empty() {
            return Err(KeyError::Empty);
        }

        let uri: Uri = url.parse().map_err(|_parse_error| KeyError::Invalid)?;

        let scheme_ok = matches!(uri.scheme_str(), Some("http" | "https"));
        let host_ok = uri.host().is_some_and(|host| !host.is_empty());
        if !scheme_ok || !host_ok {
            return Err(KeyError::Invalid);
        }

        Ok(Self { url: url.to_owned() })
    }

    /// The URL, exactly as it was given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The disk record name without extension.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{:016x}", xxh3_64(self.url.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Why a string is not usable as a [`CacheKey`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyError {
    /// The key is empty. Callers use this for items that have no asset at all.
    #[error("the key is empty")]
    Empty,
    /// The key is not an http(s) URL with a host.
    #[error("the key is not an http or https URL")]
    Invalid,
}
