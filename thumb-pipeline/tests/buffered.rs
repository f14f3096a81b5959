#![cfg(unix)]

mod common;

use common::*;
use thumb_blob::{SessionState, StoreCall};
use thumb_core::ThumbError;
use thumb_pipeline::Pipeline;

#[tokio::test]
async fn buffered_mode_commits_and_responds() {
    let store = store();
    let pipeline = pipeline(&store, "fixed-jpeg");
    let names = pipeline.names(Some("image/png"));
    let input = payload(3 * PART + 5);
    let (response, body) = response();

    let outcome = pipeline.buffered(&input[..], Box::new(response), &names).await.unwrap();

    assert_eq!(outcome.input_bytes, input.len() as u64);
    assert_eq!(outcome.fullsize.state, SessionState::Committed);
    assert_eq!(outcome.fullsize.part_sizes(), vec![PART as u64, PART as u64, PART as u64, 5]);
    assert_eq!(body.await.unwrap().unwrap(), b"JPEGDATA");
    assert_eq!(store.object(&names.fullsize_key).unwrap().data.as_ref(), &input[..]);
    assert_eq!(store.object(&names.thumbnail_key).unwrap().data.as_ref(), b"JPEGDATA");
}

#[tokio::test]
async fn oversized_input_is_rejected_before_conversion() {
    let store = store();
    let pipeline = Pipeline::new(
        filter("identity"),
        store.clone(),
        settings().with_max_buffered_input(1000),
    )
    .unwrap();
    let names = pipeline.names(None);
    let (response, body) = response();

    let err = pipeline
        .buffered(&payload(1001)[..], Box::new(response), &names)
        .await
        .unwrap_err();

    assert!(matches!(err, ThumbError::InputTooLarge { max: 1000 }));
    assert_eq!(err.code(), 413);
    assert!(body.await.unwrap().is_err());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn buffered_conversion_failure_uploads_nothing() {
    let store = store();
    let pipeline = pipeline(&store, "unsupported");
    let names = pipeline.names(Some("image/png"));
    let (response, body) = response();

    let err = pipeline
        .buffered(&payload(PART)[..], Box::new(response), &names)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "unsupported format");
    assert!(body.await.unwrap().is_err());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn buffered_upload_failure_aborts_both_sessions() {
    let store = store();
    store.fail_part_for(".png", 2);
    let pipeline = pipeline(&store, "fixed-jpeg");
    let names = pipeline.names(Some("image/png"));
    let (response, body) = response();

    let err = pipeline
        .buffered(&payload(4 * PART)[..], Box::new(response), &names)
        .await
        .unwrap_err();

    assert_eq!(err.code(), 502);
    assert!(body.await.unwrap().is_err());
    assert!(store.object_keys().is_empty());
    assert_eq!(store.pending_uploads(), 0);
    assert!(!store.calls().iter().any(|c| matches!(c, StoreCall::Complete { .. })));
}
