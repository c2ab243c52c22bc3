// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use thiserror::Error;

/// Turns raw downloaded bytes into the asset type callers work with.
///
/// The cache never looks inside an asset; a successful decode is the only thing that
/// separates good bytes from corrupt ones.
pub trait AssetDecoder: Send + Sync {
    /// The decoded asset. Cloned out of the memory tier on every hit, so it is usually a
    /// cheap handle such as an `Arc`.
    type Asset: Clone + Send + Sync + 'static;

    /// Decodes `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the bytes are not a valid asset.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Asset, DecodeError>;
}

/// Bytes could not be decoded into an asset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("undecodable asset: {reason}")]
pub struct DecodeError {
    reason: Cow<'static, str>,
}

impl DecodeError {
    /// Creates an error with a human-readable reason.
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self { reason: reason.into() }
    }

    /// The reason given by the decoder.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
