use build_worker::upload::ObjectStoreUploader;
use build_worker_core::config::RunContext;
use build_worker_core::contract::{BuildStatus, MockBuildInvoker, PutObject, UploadError, Uploader};
use build_worker_core::run::run;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{Attribute, ObjectStore};
use std::fs::{create_dir_all, write};
use tempfile::tempdir;

fn object(bucket: &str, key: &str, body: &'static str, content_type: &str) -> PutObject {
    PutObject {
        bucket: bucket.to_string(),
        key: key.to_string(),
        content: Bytes::from_static(body.as_bytes()),
        content_type: content_type.to_string(),
    }
}

#[tokio::test]
async fn test_put_stores_bytes_and_content_type() {
    let uploader = ObjectStoreUploader::in_memory("outputs");
    uploader
        .put(object("outputs", "__outputs/p/index.html", "<html></html>", "text/html"))
        .await
        .expect("put should succeed");

    let got = uploader
        .store()
        .get(&Path::from("__outputs/p/index.html"))
        .await
        .unwrap();
    let content_type = got
        .attributes
        .get(&Attribute::ContentType)
        .map(|v| v.to_string());
    assert_eq!(content_type.as_deref(), Some("text/html"));
    assert_eq!(got.bytes().await.unwrap(), Bytes::from_static(b"<html></html>"));
}

#[tokio::test]
async fn test_put_overwrites_existing_key() {
    let uploader = ObjectStoreUploader::in_memory("outputs");
    uploader
        .put(object("outputs", "k/a.txt", "first", "text/plain"))
        .await
        .unwrap();
    uploader
        .put(object("outputs", "k/a.txt", "second", "text/plain"))
        .await
        .unwrap();

    let got = uploader.store().get(&Path::from("k/a.txt")).await.unwrap();
    assert_eq!(got.bytes().await.unwrap(), Bytes::from_static(b"second"));
}

#[tokio::test]
async fn test_put_to_other_bucket_is_rejected() {
    let uploader = ObjectStoreUploader::in_memory("outputs");
    let err = uploader
        .put(object("elsewhere", "k/a.txt", "x", "text/plain"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::BucketMismatch { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_put_with_invalid_key_is_rejected() {
    let uploader = ObjectStoreUploader::in_memory("outputs");
    let err = uploader
        .put(object("outputs", "a//b", "x", "text/plain"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidKey { .. }), "got {err:?}");
}

/// A full run against the in-memory store leaves exactly the output tree under the project prefix.
#[tokio::test]
async fn test_run_publishes_tree_to_store() {
    let tmp = tempdir().unwrap();
    create_dir_all(tmp.path().join("dist/assets")).unwrap();
    write(
        tmp.path().join("dist/index.html"),
        r#"<link rel="icon" href="/favicon.ico"><script src="/assets/main.js"></script>"#,
    )
    .unwrap();
    write(tmp.path().join("dist/assets/main.js"), r#"img.src="/hero.svg";"#).unwrap();
    write(tmp.path().join("dist/favicon.ico"), [0u8, 1, 2]).unwrap();

    let mut builder = MockBuildInvoker::new();
    builder
        .expect_run()
        .times(1)
        .returning(|_, _| Ok(BuildStatus::from_code(0)));

    let uploader = ObjectStoreUploader::in_memory("outputs");
    let ctx = RunContext::new("demo", tmp.path(), "outputs");
    let report = run(&ctx, &builder, &uploader).await.unwrap();
    assert!(report.outcome.is_success(), "got {:?}", report.outcome);

    let store = uploader.store();
    let mut keys: Vec<String> = store
        .list(Some(&Path::from("__outputs/demo")))
        .map_ok(|meta| meta.location.to_string())
        .try_collect()
        .await
        .unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "__outputs/demo/assets/main.js",
            "__outputs/demo/favicon.ico",
            "__outputs/demo/index.html",
        ]
    );

    let index = store
        .get(&Path::from("__outputs/demo/index.html"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(
        std::str::from_utf8(&index).unwrap(),
        r#"<link rel="icon" href="./favicon.ico"><script src="./assets/main.js"></script>"#
    );
    let script = store
        .get(&Path::from("__outputs/demo/assets/main.js"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(std::str::from_utf8(&script).unwrap(), r#"img.src="./hero.svg";"#);
}
