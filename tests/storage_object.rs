#![allow(missing_docs)]
#![cfg(feature = "s3")]

use std::{io, time::Duration};

use bytes::Bytes;
use filemux::{
    storage::BoxStream, ObjectStorage, PathOptions, Storage, StorageError, UploadOptions,
};
use futures::stream;
use object_store::aws::AmazonS3Builder;

fn storage() -> ObjectStorage {
    ObjectStorage::builder()
        .template(AmazonS3Builder::new())
        .region("eu-west-1")
        .build()
        .expect("builder should succeed")
}

fn body() -> BoxStream<'static, io::Result<Bytes>> {
    Box::pin(stream::iter([Ok(Bytes::from_static(b"hello"))]))
}

#[tokio::test]
async fn unsigned_path_is_virtual_hosted_url() {
    let url = storage()
        .path(PathOptions::new("avatars", "me.png"))
        .await
        .expect("path should resolve");
    assert_eq!(url, "https://avatars.s3.eu-west-1.amazonaws.com/me.png");
}

#[tokio::test]
async fn custom_endpoint_uses_path_style_url() {
    let storage = ObjectStorage::builder()
        .template(AmazonS3Builder::new())
        .endpoint("http://localhost:9000/")
        .build()
        .expect("builder should succeed");

    let url = storage
        .path(PathOptions::new("avatars", "me.png"))
        .await
        .expect("path should resolve");
    assert_eq!(url, "http://localhost:9000/avatars/me.png");
}

#[tokio::test]
async fn path_requires_key_and_bucket() {
    let storage = storage();
    let err = storage
        .path(PathOptions::new("avatars", ""))
        .await
        .expect_err("empty key must fail");
    assert_eq!(err, StorageError::MissingKey);

    let err = storage
        .path(PathOptions::new("  ", "me.png").secure(Duration::from_secs(60)))
        .await
        .expect_err("empty bucket must fail");
    assert_eq!(err, StorageError::MissingBucket);
}

#[tokio::test]
async fn upload_requires_file_name_and_bucket() {
    let storage = storage();
    let err = storage
        .upload(body(), UploadOptions::new("", "avatars"))
        .await
        .expect_err("empty name must fail");
    assert_eq!(err, StorageError::MissingFileName);

    let err = storage
        .upload(body(), UploadOptions::new("me.png", ""))
        .await
        .expect_err("empty bucket must fail");
    assert_eq!(err, StorageError::MissingBucket);
}

#[test]
fn empty_region_is_rejected() {
    let err = ObjectStorage::builder()
        .template(AmazonS3Builder::new())
        .region(" ")
        .build()
        .expect_err("empty region must fail");
    assert!(matches!(err, StorageError::DestinationUnavailable { .. }));
}

#[tokio::test]
async fn close_is_idempotent() {
    let storage = storage();
    storage.close().await.expect("first close");
    storage.close().await.expect("second close");
}
