// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::{AssetDecoder, DecodeError};

/// The verdict on a set of bytes, from disk or from the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation<A> {
    /// The bytes decoded into this asset.
    Valid(A),
    /// The bytes must not be used.
    Corrupt(Corruption),
}

/// What is wrong with bytes that failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Corruption {
    /// Shorter than the minimum, most likely a truncated download.
    #[error("{len} bytes is below the minimum of {min}")]
    TooSmall {
        /// Actual length.
        len: usize,
        /// Configured minimum.
        min: usize,
    },

    /// Long enough, but the decoder refused it.
    #[error(transparent)]
    Undecodable(DecodeError),
}

/// Checks that `bytes` are at least `min_len` long and decode.
///
/// The size check runs first, so the decoder never sees truncated input.
///
/// # Examples
///
/// ```
/// use tiered_cache::{AssetDecoder, Corruption, DecodeError, Validation, validate};
///
/// struct Len;
///
/// impl AssetDecoder for Len {
///     type Asset = usize;
///
///     fn decode(&self, bytes: &[u8]) -> Result<usize, DecodeError> {
///         Ok(bytes.len())
///     }
/// }
///
/// assert_eq!(validate(&[0; 600], 1024, &Len), Validation::Corrupt(Corruption::TooSmall { len: 600, min: 1024 }));
/// assert_eq!(validate(&[0; 2048], 1024, &Len), Validation::Valid(2048));
/// ```
pub fn validate<D>(bytes: &[u8], min_len: usize, decoder: &D) -> Validation<D::Asset>
where
    D: AssetDecoder + ?Sized,
{
    if bytes.len() < min_len {
        return Validation::Corrupt(Corruption::TooSmall {
            len: bytes.len(),
            min: min_len,
        });
    }

    match decoder.decode(bytes) {
        Ok(asset) => Validation::Valid(asset),
        Err(err) => Validation::Corrupt(Corruption::Undecodable(err)),
    }
}
