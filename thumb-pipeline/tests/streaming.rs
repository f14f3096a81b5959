#![cfg(unix)]

mod common;

use std::time::Duration;

use common::*;
use thumb_blob::{SessionState, StoreCall};
use thumb_core::{pipe, ThumbError};

#[tokio::test]
async fn streams_thumbnail_and_commits_both_objects() {
    let store = store();
    let pipeline = pipeline(&store, "identity");
    let names = pipeline.names(Some("image/png"));
    let input = payload(5 * PART + 123);
    let (response, body) = response();

    let outcome = pipeline.stream(&input[..], Box::new(response), &names).await.unwrap();

    assert_eq!(outcome.input_bytes, input.len() as u64);
    assert_eq!(outcome.fullsize.state, SessionState::Committed);
    assert_eq!(outcome.thumbnail.state, SessionState::Committed);
    assert_eq!(body.await.unwrap().unwrap(), input);

    let fullsize = store.object(&names.fullsize_key).unwrap();
    assert_eq!(fullsize.data.as_ref(), &input[..]);
    assert_eq!(fullsize.options.content_type.as_deref(), Some("image/png"));
    assert_eq!(fullsize.options.acl.as_deref(), Some("public-read"));
    let thumbnail = store.object(&names.thumbnail_key).unwrap();
    assert_eq!(thumbnail.options.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(thumbnail.part_sizes, vec![PART as u64; 5].into_iter().chain([123]).collect::<Vec<_>>());
}

#[tokio::test]
async fn fullsize_is_finalized_before_thumbnail() {
    let store = store();
    let pipeline = pipeline(&store, "fixed-jpeg");
    let names = pipeline.names(Some("image/gif"));
    let (response, body) = response();

    pipeline.stream(&payload(3 * PART)[..], Box::new(response), &names).await.unwrap();
    assert_eq!(body.await.unwrap().unwrap(), b"JPEGDATA");

    let calls = store.calls();
    let completes: Vec<&str> = calls
        .iter()
        .filter(|c| matches!(c, StoreCall::Complete { .. }))
        .map(|c| c.key())
        .collect();
    assert_eq!(completes, vec![names.fullsize_key.as_str(), names.thumbnail_key.as_str()]);

    let last_part = calls
        .iter()
        .rposition(|c| matches!(c, StoreCall::UploadPart { .. }))
        .unwrap();
    let first_complete = calls
        .iter()
        .position(|c| matches!(c, StoreCall::Complete { .. }))
        .unwrap();
    assert!(last_part < first_complete, "finalize issued before every part was stored");
}

#[tokio::test]
async fn empty_input_commits_empty_objects() {
    let store = store();
    let pipeline = pipeline(&store, "identity");
    let names = pipeline.names(None);
    let (response, body) = response();

    let outcome = pipeline.stream(&b""[..], Box::new(response), &names).await.unwrap();

    assert_eq!(outcome.thumbnail.state, SessionState::Committed);
    assert!(outcome.thumbnail.parts.is_empty());
    assert!(outcome.fullsize.parts.is_empty());
    assert!(body.await.unwrap().unwrap().is_empty());
    assert_eq!(store.object(&names.thumbnail_key).unwrap().size_bytes, 0);
}

#[tokio::test]
async fn conversion_failure_aborts_everything() {
    let store = store();
    let pipeline = pipeline(&store, "unsupported");
    let names = pipeline.names(Some("image/png"));
    let (response, body) = response();

    let err = pipeline
        .stream(&payload(4 * PART)[..], Box::new(response), &names)
        .await
        .unwrap_err();

    match &err {
        ThumbError::Conversion { message, exit_code } => {
            assert_eq!(message, "unsupported format");
            assert_eq!(*exit_code, Some(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(body.await.unwrap().is_err(), "response must not end cleanly");
    assert!(store.object_keys().is_empty());
    assert_eq!(store.pending_uploads(), 0);
    assert!(!store.calls().iter().any(|c| matches!(c, StoreCall::Complete { .. })));
}

#[tokio::test]
async fn thumbnail_part_failure_aborts_fullsize_too() {
    let store = store();
    store.fail_part_for("_thumbnail", 1);
    let pipeline = pipeline(&store, "identity");
    let names = pipeline.names(Some("image/png"));
    let (response, _body) = response();

    let err = pipeline
        .stream(&payload(6 * PART)[..], Box::new(response), &names)
        .await
        .unwrap_err();

    assert_eq!(err.code(), 502, "{err}");
    assert!(store.object_keys().is_empty());
    assert_eq!(store.pending_uploads(), 0);
    assert!(store
        .calls_for(&names.fullsize_key)
        .iter()
        .all(|c| !matches!(c, StoreCall::Complete { .. })));
}

#[tokio::test]
async fn failed_thumbnail_finalize_discards_committed_fullsize() {
    let store = store();
    store.fail_complete_for("_thumbnail");
    let pipeline = pipeline(&store, "identity");
    let names = pipeline.names(Some("image/png"));
    let (response, body) = response();

    let err = pipeline
        .stream(&payload(2 * PART)[..], Box::new(response), &names)
        .await
        .unwrap_err();

    assert!(matches!(err, ThumbError::Upload { .. }));
    assert!(body.await.unwrap().is_err());
    assert!(store.object_keys().is_empty());
    assert!(store
        .calls()
        .contains(&StoreCall::Delete { key: names.fullsize_key.clone() }));
}

#[tokio::test]
async fn client_disconnect_cancels_request() {
    let store = store();
    let pipeline = pipeline(&store, "identity");
    let names = pipeline.names(Some("image/png"));
    let (response, stream) = pipe("response", 1);
    drop(stream);

    let err = pipeline
        .stream(&payload(8 * PART)[..], Box::new(response), &names)
        .await
        .unwrap_err();

    assert!(err.is_cancellation(), "{err:?}");
    assert!(store.object_keys().is_empty());
    assert_eq!(store.pending_uploads(), 0);
}

#[tokio::test]
async fn disconnect_after_thumbnail_is_queued_commits_nothing() {
    let store = store();
    store.set_part_delay(Duration::from_millis(400));
    let pipeline = pipeline(&store, "identity");
    let names = pipeline.names(Some("image/png"));
    // Room for the whole thumbnail, so no response write ever blocks.
    let (response, stream) = pipe("response", 64);

    let disconnect = async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(stream);
    };
    let body = payload(2 * PART);
    let (result, ()) = tokio::join!(
        pipeline.stream(&body[..], Box::new(response), &names),
        disconnect,
    );

    let err = result.unwrap_err();
    assert!(err.is_cancellation(), "{err:?}");
    assert!(store.object_keys().is_empty(), "{:?}", store.object_keys());
    assert_eq!(store.pending_uploads(), 0);
}

#[tokio::test]
async fn large_input_streams_without_deadlock() {
    let store = std::sync::Arc::new(thumb_blob::MemoryMultipartStore::new().discard_payload());
    let pipeline = pipeline(&store, "identity");
    let names = pipeline.names(Some("image/tiff"));
    let input = payload(8 * 1024 * 1024);
    let (response, body) = response();

    let outcome = tokio::time::timeout(
        Duration::from_secs(120),
        pipeline.stream(&input[..], Box::new(response), &names),
    )
    .await
    .expect("pipeline stalled")
    .unwrap();

    assert_eq!(outcome.input_bytes, input.len() as u64);
    assert_eq!(body.await.unwrap().unwrap().len(), input.len());
    assert!(outcome.fullsize.peak_buffered <= 2 * PART + 64 * 1024);
    // One part per object at most: full-size and thumbnail share the store.
    assert!(store.max_parts_in_flight() <= 2);
}
