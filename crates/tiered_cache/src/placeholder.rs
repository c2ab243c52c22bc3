// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stand-ins returned when no real asset is available.

use std::fmt;

/// Why a placeholder was returned instead of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[non_exhaustive]
pub enum PlaceholderKind {
    /// The key was empty: the item has no asset. Not an error.
    NoCover,
    /// The key was not an http(s) URL. Nothing was attempted.
    Invalid,
    /// The asset could not be loaded from disk or fetched from the origin.
    NetworkError,
}

impl fmt::Display for PlaceholderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoCover => "no-cover",
            Self::Invalid => "invalid",
            Self::NetworkError => "network-error",
        })
    }
}

/// Dimensions a caller wants a placeholder to occupy, so its layout does not shift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaceholderHint {
    /// Width in the caller's units.
    pub width: u32,
    /// Height in the caller's units.
    pub height: u32,
}

impl PlaceholderHint {
    /// Creates a hint for a `width` by `height` placeholder.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A synthetic result describing what went wrong and how big to draw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placeholder {
    /// Why there is no asset.
    pub kind: PlaceholderKind,
    /// Requested dimensions, copied from the lookup.
    pub hint: PlaceholderHint,
}

impl Placeholder {
    pub(crate) const fn new(kind: PlaceholderKind, hint: PlaceholderHint) -> Self {
        Self { kind, hint }
    }
}

/// The outcome of a cache lookup: the asset, or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<A> {
    /// The decoded asset.
    Asset(A),
    /// No asset is available; draw this instead.
    Placeholder(Placeholder),
}

impl<A> Resolved<A> {
    pub(crate) const fn placeholder(kind: PlaceholderKind, hint: PlaceholderHint) -> Self {
        Self::Placeholder(Placeholder::new(kind, hint))
    }

    /// The asset, if there is one.
    #[must_use]
    pub fn asset(&self) -> Option<&A> {
        match self {
            Self::Asset(asset) => Some(asset),
            Self::Placeholder(_) => None,
        }
    }

    /// Consumes the result and returns the asset, if there is one.
    #[must_use]
    pub fn into_asset(self) -> Option<A> {
        match self {
            Self::Asset(asset) => Some(asset),
            Self::Placeholder(_) => None,
        }
    }

    /// The placeholder kind, if this is a placeholder.
    #[must_use]
    pub const fn placeholder_kind(&self) -> Option<PlaceholderKind> {
        match self {
            Self::Asset(_) => None,
            Self::Placeholder(placeholder) => Some(placeholder.kind),
        }
    }

    /// Whether this is an asset rather than a placeholder.
    #[must_use]
    pub const fn is_asset(&self) -> bool {
        matches!(self, Self::Asset(_))
    }
}
