// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test doubles for the cache's collaborators.
//!
//! [`ScriptedOrigin`] answers fetches from a script and counts them, and can hold fetches
//! in flight to exercise concurrent lookups. [`BytesDecoder`] accepts bytes that start with
//! an optional magic prefix.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::{AssetDecoder, DecodeError, FetchError, Origin};

#[derive(Debug, Clone)]
enum Script {
    Respond(Bytes),
    Status(u16),
    Unavailable(String),
}

impl Script {
    fn play(&self) -> Result<Bytes, FetchError> {
        match self {
            Self::Respond(bytes) => Ok(bytes.clone()),
            Self::Status(code) => Err(FetchError::Status(*code)),
            Self::Unavailable(reason) => Err(FetchError::Unavailable(reason.clone())),
        }
    }
}

/// An [`Origin`] that replays scripted answers.
///
/// URLs without a script answer with status 404.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use tiered_cache::Origin;
/// use tiered_cache::testing::ScriptedOrigin;
///
/// let origin = ScriptedOrigin::new();
/// origin.respond("https://example.com/a", Bytes::from_static(b"data"));
///
/// assert_eq!(origin.fetch("https://example.com/a").unwrap(), Bytes::from_static(b"data"));
/// assert!(origin.fetch("https://example.com/b").is_err());
/// assert_eq!(origin.calls("https://example.com/a"), 1);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedOrigin {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Mutex<Option<Duration>>,
    held: Mutex<bool>,
    released: Condvar,
}

impl ScriptedOrigin {
    /// Creates an origin with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers fetches of `url` with `bytes`.
    pub fn respond(&self, url: &str, bytes: impl Into<Bytes>) {
        self.scripts.lock().insert(url.to_owned(), Script::Respond(bytes.into()));
    }

    /// Answers fetches of `url` with [`FetchError::Status`].
    pub fn fail_with_status(&self, url: &str, code: u16) {
        self.scripts.lock().insert(url.to_owned(), Script::Status(code));
    }

    /// Answers fetches of `url` with [`FetchError::Unavailable`].
    pub fn fail_unavailable(&self, url: &str, reason: &str) {
        self.scripts
            .lock()
            .insert(url.to_owned(), Script::Unavailable(reason.to_owned()));
    }

    /// Makes every fetch take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Blocks every fetch that starts from now on until [`release`](Self::release).
    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    /// Lets held fetches proceed.
    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    /// How many times `url` was fetched, including fetches still in progress.
    #[must_use]
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or_default()
    }

    /// How many fetches there were in total.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

impl Origin for ScriptedOrigin {
    fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        *self.calls.lock().entry(url.to_owned()).or_default() += 1;

        {
            let mut held = self.held.lock();
            while *held {
                self.released.wait(&mut held);
            }
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        self.scripts
            .lock()
            .get(url)
            .map_or(Err(FetchError::Status(404)), Script::play)
    }
}

/// An [`AssetDecoder`] whose assets are the raw bytes.
///
/// With a magic prefix, bytes that do not start with it fail to decode.
#[derive(Debug, Default)]
pub struct BytesDecoder {
    magic: Option<Bytes>,
    decodes: AtomicUsize,
}

impl BytesDecoder {
    /// Accepts any bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts only bytes that start with `magic`.
    #[must_use]
    pub fn with_magic(magic: impl Into<Bytes>) -> Self {
        Self {
            magic: Some(magic.into()),
            decodes: AtomicUsize::new(0),
        }
    }

    /// Builds `len` bytes that this decoder accepts: the magic prefix followed by filler.
    #[must_use]
    pub fn valid_payload(&self, len: usize) -> Bytes {
        let magic = self.magic.as_deref().unwrap_or_default();
        let mut payload = Vec::with_capacity(len.max(magic.len()));
        payload.extend_from_slice(magic);
        payload.extend((0..=u8::MAX).cycle().take(len.saturating_sub(magic.len())));
        payload.into()
    }

    /// How many times [`decode`](AssetDecoder::decode) ran.
    #[must_use]
    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::Acquire)
    }
}

impl AssetDecoder for BytesDecoder {
    type Asset = Bytes;

    fn decode(&self, bytes: &[u8]) -> Result<Bytes, DecodeError> {
        self.decodes.fetch_add(1, Ordering::AcqRel);

        match &self.magic {
            Some(magic) if !bytes.starts_with(magic) => Err(DecodeError::new("missing magic prefix")),
            _ => Ok(Bytes::copy_from_slice(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use testing_aids::{execute_or_abandon, wait_until};

    use super::*;

    #[test]
    fn unknown_url_is_not_found() {
        let origin = ScriptedOrigin::new();
        assert!(matches!(origin.fetch("https://example.com/x"), Err(FetchError::Status(404))));
        assert_eq!(origin.total_calls(), 1);
    }

    #[test]
    fn held_fetch_waits_for_release() {
        let origin = Arc::new(ScriptedOrigin::new());
        origin.respond("u", Bytes::from_static(b"x"));
        origin.hold();

        let fetch = thread::spawn({
            let origin = Arc::clone(&origin);
            move || origin.fetch("u").map_err(|err| err.to_string())
        });

        assert!(wait_until(|| origin.calls("u") == 1));
        assert!(!fetch.is_finished());

        origin.release();
        let result = execute_or_abandon(move || fetch.join().unwrap()).unwrap();
        assert_eq!(result, Ok(Bytes::from_static(b"x")));
    }

    #[test]
    fn decoder_checks_magic() {
        let decoder = BytesDecoder::with_magic(&b"IMG"[..]);
        let payload = decoder.valid_payload(10);

        assert_eq!(payload.len(), 10);
        assert_eq!(decoder.decode(&payload).unwrap(), payload);
        assert!(decoder.decode(b"GIF89a").is_err());
        assert_eq!(decoder.decodes(), 2);
    }
}
