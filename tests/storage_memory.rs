#![allow(missing_docs)]

use std::io;

use bytes::Bytes;
use futures::stream;
use filemux::{
    storage::{memory::DEFAULT_DESTINATION, BoxStream},
    MemoryStorage, PathOptions, Storage, StorageError, UploadOptions,
};

#[tokio::test]
async fn stores_stream_and_reports_authoritative_size() {
    let storage = MemoryStorage::new();

    let stored = storage
        .upload(body(&["hel", "lo"]), UploadOptions::new("greeting.txt", "docs"))
        .await
        .expect("upload should succeed");

    assert_eq!(stored.folder_destination, "docs");
    assert_eq!(stored.key, "greeting.txt");
    assert_eq!(stored.size, 5);
    assert_eq!(
        storage.get("docs", "greeting.txt").await,
        Some(Bytes::from_static(b"hello"))
    );
}

#[tokio::test]
async fn empty_bucket_uses_default_destination() {
    let storage = MemoryStorage::new();

    let stored = storage
        .upload(body(&["x"]), UploadOptions::new("a.bin", ""))
        .await
        .expect("upload should succeed");

    assert_eq!(stored.folder_destination, DEFAULT_DESTINATION);
    assert!(storage.get(DEFAULT_DESTINATION, "a.bin").await.is_some());
}

#[tokio::test]
async fn same_key_in_different_buckets_is_kept_apart() {
    let storage = MemoryStorage::new();

    storage
        .upload(body(&["one"]), UploadOptions::new("same.txt", "a"))
        .await
        .expect("first upload");
    storage
        .upload(body(&["two"]), UploadOptions::new("same.txt", "b"))
        .await
        .expect("second upload");

    assert_eq!(storage.len().await, 2);
    assert_eq!(storage.get("a", "same.txt").await, Some(Bytes::from_static(b"one")));
    assert_eq!(storage.get("b", "same.txt").await, Some(Bytes::from_static(b"two")));
}

#[tokio::test]
async fn rejects_missing_file_name() {
    let storage = MemoryStorage::new();

    let err = storage
        .upload(body(&["x"]), UploadOptions::new("  ", "docs"))
        .await
        .expect_err("upload must fail");
    assert_eq!(err, StorageError::MissingFileName);
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn stream_errors_fail_the_upload() {
    let storage = MemoryStorage::new();
    let failing: BoxStream<'static, io::Result<Bytes>> = Box::pin(stream::iter(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away")),
    ]));

    let err = storage
        .upload(failing, UploadOptions::new("a.txt", "docs"))
        .await
        .expect_err("upload must fail");
    assert!(matches!(err, StorageError::Io { .. }));
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn path_is_a_synthetic_locator() {
    let storage = MemoryStorage::new();

    let path = storage
        .path(PathOptions::new("docs", "a.txt"))
        .await
        .expect("path should resolve");
    assert_eq!(path, "memory://docs/a.txt");

    let err = storage
        .path(PathOptions::new("docs", ""))
        .await
        .expect_err("empty key must fail");
    assert_eq!(err, StorageError::MissingKey);
}

#[tokio::test]
async fn close_is_idempotent() {
    let storage = MemoryStorage::new();
    storage.close().await.expect("first close");
    storage.close().await.expect("second close");
}

fn body(chunks: &[&'static str]) -> BoxStream<'static, io::Result<Bytes>> {
    let chunks: Vec<io::Result<Bytes>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
        .collect();
    Box::pin(stream::iter(chunks))
}
