// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]

//! What the disk tier leaves behind, observed through the filesystem.

use std::fs;
use std::sync::Arc;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use task_dispatch::{DispatcherConfig, TaskDispatcher};
use tempfile::TempDir;
use testing_aids::repeating_incrementing_bytes;
use tiered_cache::testing::{BytesDecoder, ScriptedOrigin};
use tiered_cache::{
    AssetDecoder, CacheConfig, CacheKey, DiskStore, Origin, PlaceholderHint, TieredCache, Validation, validate,
};

const URL: &str = "https://covers.example.com/series/99.jpg";
const HINT: PlaceholderHint = PlaceholderHint::new(80, 120);

fn cache(root: &std::path::Path, origin: &Arc<ScriptedOrigin>) -> TieredCache<Bytes> {
    TieredCache::new(
        CacheConfig::default().with_disk_root(root),
        Arc::clone(origin) as Arc<dyn Origin>,
        Arc::new(BytesDecoder::new()) as Arc<dyn AssetDecoder<Asset = Bytes>>,
        Arc::new(TaskDispatcher::new(DispatcherConfig::default()).unwrap()),
    )
}

#[test]
fn persisted_record_matches_download_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(ScriptedOrigin::new());
    let download = Bytes::from(repeating_incrementing_bytes(5000));
    origin.respond(URL, download.clone());

    assert!(cache(dir.path(), &origin).get(URL, HINT).is_asset());

    // Read the record back without any cache in between.
    let store = DiskStore::open(dir.path(), "img").unwrap();
    let key = CacheKey::parse(URL).unwrap();
    let record = store.read(&key).unwrap().unwrap();

    assert_eq!(record, download);
    assert!(matches!(
        validate(&record, 1024, &BytesDecoder::new()),
        Validation::Valid(asset) if asset == download
    ));
}

#[test]
fn record_name_is_stable_across_instances() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(ScriptedOrigin::new());
    origin.respond(URL, repeating_incrementing_bytes(2048));

    _ = cache(dir.path(), &origin).get(URL, HINT);
    _ = cache(dir.path(), &origin).get(URL, HINT);

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();

    let stem = CacheKey::parse(URL).unwrap().file_stem();
    assert_eq!(names, vec![format!("{stem}.img")]);
    assert_eq!(stem.len(), 16);
    assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));

    // The second instance found the record left by the first.
    assert_eq!(origin.calls(URL), 1);
}

#[test]
fn failed_downloads_leave_no_files() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(ScriptedOrigin::new());
    let cache = cache(dir.path(), &origin);

    origin.fail_with_status(URL, 404);
    _ = cache.get(URL, HINT);
    origin.respond(URL, repeating_incrementing_bytes(10));
    _ = cache.get(URL, HINT);

    assert_eq!(origin.calls(URL), 2);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn clear_keeps_subdirectories_and_reports_files() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(ScriptedOrigin::new());
    origin.respond(URL, repeating_incrementing_bytes(2048));
    let cache = cache(dir.path(), &origin);
    _ = cache.get(URL, HINT);

    let nested = dir.path().join("nested");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("kept.img"), b"not a record").unwrap();
    fs::write(dir.path().join("stray.tmp"), b"leftover").unwrap();

    let summary = cache.clear();

    assert_eq!(summary.files_removed, 2);
    assert_eq!(summary.files_failed, 0);
    assert!(nested.join("kept.img").exists());
    assert!(!dir.path().join("stray.tmp").exists());

    let stats = cache.stats();
    assert!(stats.disk_enabled);
    assert_eq!(stats.disk_records, 0);
    assert_eq!(stats.disk_bytes, 0);
    assert_eq!(stats.memory_count, 0);
}

#[test]
fn cleared_cache_fetches_again() {
    let dir = TempDir::new().unwrap();
    let origin = Arc::new(ScriptedOrigin::new());
    origin.respond(URL, repeating_incrementing_bytes(2048));
    let cache = cache(dir.path(), &origin);

    _ = cache.get(URL, HINT);
    _ = cache.clear();
    assert!(cache.get(URL, HINT).is_asset());

    assert_eq!(origin.calls(URL), 2);
    assert_eq!(cache.stats().disk_records, 1);
}
