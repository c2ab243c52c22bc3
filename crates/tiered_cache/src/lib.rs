// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A three-tier cache for remote assets: memory, then disk, then the origin.
//!
//! [`TieredCache`] resolves a URL to a decoded asset. It consults an in-process map first,
//! then a directory of raw downloads, and only then asks the [`Origin`] for the bytes.
//! Whatever it finds is written back into the faster tiers.
//!
//! # Guarantees
//!
//! - At most one loader runs per key at a time. Concurrent callers asking for the same key
//!   share the outcome of a single disk read or origin fetch.
//! - A disk record that is too small or does not decode is deleted and fetched again.
//! - Downloads are validated before they reach the disk, and they are written to a
//!   temporary file that is renamed into place, so a failed fetch never leaves a partial file.
//! - [`TieredCache::get`] never fails. Every failure turns into a [`Placeholder`] and a log
//!   entry, so a UI always has something to lay out.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use task_dispatch::{DispatcherConfig, TaskDispatcher};
//! use tiered_cache::{
//!     AssetDecoder, CacheConfig, DecodeError, FetchError, PlaceholderHint, PlaceholderKind, Resolved, TieredCache,
//! };
//!
//! struct Utf8;
//!
//! impl AssetDecoder for Utf8 {
//!     type Asset = Arc<str>;
//!
//!     fn decode(&self, bytes: &[u8]) -> Result<Self::Asset, DecodeError> {
//!         std::str::from_utf8(bytes).map(Arc::from).map_err(|err| DecodeError::new(err.to_string()))
//!     }
//! }
//!
//! let origin = |_url: &str| -> Result<Bytes, FetchError> { Ok(Bytes::from("hello")) };
//! let dispatcher = Arc::new(TaskDispatcher::new(DispatcherConfig::default())?);
//! let config = CacheConfig::default().with_min_valid_bytes(1);
//!
//! let cache = TieredCache::new(config, Arc::new(origin), Arc::new(Utf8), dispatcher);
//! let hint = PlaceholderHint::new(120, 180);
//!
//! assert_eq!(cache.get("https://example.com/a.png", hint), Resolved::Asset(Arc::from("hello")));
//! assert_eq!(cache.get("", hint).placeholder_kind(), Some(PlaceholderKind::NoCover));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cache;
mod config;
mod decode;
mod disk;
mod key;
mod memory;
mod origin;
mod placeholder;
mod stats;
mod validate;

#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;

#[doc(inline)]
pub use cache::TieredCache;
#[doc(inline)]
pub use config::CacheConfig;
#[doc(inline)]
pub use decode::{AssetDecoder, DecodeError};
#[doc(inline)]
pub use disk::{DiskError, DiskStore, DiskUsage};
#[doc(inline)]
pub use key::{CacheKey, KeyError};
#[doc(inline)]
pub use origin::{FetchError, Origin};
#[doc(inline)]
pub use placeholder::{Placeholder, PlaceholderHint, PlaceholderKind, Resolved};
#[doc(inline)]
pub use stats::{CacheStats, ClearSummary};
#[doc(inline)]
pub use validate::{Corruption, Validation, validate};
