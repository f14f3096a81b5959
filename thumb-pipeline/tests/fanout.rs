#![cfg(unix)]

mod common;

use std::sync::Arc;

use common::*;
use thumb_blob::{MemoryMultipartStore, MultipartUploadSink, SessionState, UploadRules};
use thumb_core::{FileSink, ResizeBounds};
use thumb_pipeline::{FanOut, FanOutput};

fn upload(store: &Arc<MemoryMultipartStore>, key: &str) -> MultipartUploadSink {
    MultipartUploadSink::new(
        store.clone(),
        key,
        &UploadRules::new().with_part_size(PART),
        Some("image/jpeg".to_string()),
    )
    .unwrap()
}

#[tokio::test]
async fn every_output_receives_the_thumbnail() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let fan_out = FanOut::new(filter("identity"), ResizeBounds::default());
    let input = payload(2 * PART + 17);

    let first = dir.path().join("one.jpg");
    let second = dir.path().join("two.jpg");
    let s3 = upload(&store, "thumbs/one.jpg");
    let session = s3.handle();

    let written = fan_out
        .run(
            &input[..],
            vec![
                FanOutput::sink(FileSink::create(&first).await.unwrap()),
                FanOutput::sink(FileSink::create(&second).await.unwrap()),
                FanOutput::upload(s3),
            ],
        )
        .await
        .unwrap();

    assert_eq!(written, input.len() as u64);
    assert_eq!(std::fs::read(&first).unwrap(), input);
    assert_eq!(std::fs::read(&second).unwrap(), input);
    assert_eq!(session.state(), SessionState::Committed);
    assert_eq!(store.object("thumbs/one.jpg").unwrap().data.as_ref(), &input[..]);
}

#[tokio::test]
async fn failed_conversion_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let fan_out = FanOut::new(filter("unsupported"), ResizeBounds::default());
    let target = dir.path().join("thumb.jpg");
    let s3 = upload(&store, "thumbs/x.jpg");
    let session = s3.handle();

    let err = fan_out
        .run(
            &payload(100)[..],
            vec![FanOutput::sink(FileSink::create(&target).await.unwrap()), FanOutput::upload(s3)],
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "unsupported format");
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(session.state(), SessionState::Aborted);
    assert!(store.object_keys().is_empty());
}

#[tokio::test]
async fn later_commit_failure_rolls_back_earlier_upload() {
    let store = store();
    store.fail_complete_for("second");
    let fan_out = FanOut::new(filter("fixed-jpeg"), ResizeBounds::default());
    let first = upload(&store, "first.jpg");
    let first_session = first.handle();

    let err = fan_out
        .run(
            &payload(10)[..],
            vec![FanOutput::upload(first), FanOutput::upload(upload(&store, "second.jpg"))],
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), 502);
    assert_eq!(first_session.state(), SessionState::Aborted);
    assert!(store.object_keys().is_empty());
}

#[tokio::test]
async fn no_outputs_is_a_configuration_error() {
    let fan_out = FanOut::new(filter("identity"), ResizeBounds::default());
    let err = fan_out.run(&b"x"[..], Vec::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid configuration: at least one output is required");
}
