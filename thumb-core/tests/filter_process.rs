//! Resize filter driver against small shell-script filters.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use thumb_core::{BufferSink, ByteSink, ResizeBounds, ResizeFilter, ThumbError};

/// Scripts are written once, before any test spawns a process, so no child
/// inherits a script fd that is still open for writing.
fn scripts() -> &'static tempfile::TempDir {
    static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().expect("script dir");
        let scripts = [
            ("identity", "#!/bin/sh\nexec cat\n"),
            ("echo-args", "#!/bin/sh\ncat > /dev/null\nprintf '%s|' \"$@\"\n"),
            (
                "unsupported",
                "#!/bin/sh\ncat > /dev/null\necho 'convert: no decode delegate for this image format' >&2\nexit 1\n",
            ),
            ("quiet-failure", "#!/bin/sh\ncat > /dev/null\nexit 3\n"),
            ("early-exit", "#!/bin/sh\necho 'convert: improper image header' >&2\nexit 1\n"),
        ];
        for (name, body) in scripts {
            let path = dir.path().join(name);
            std::fs::write(&path, body).expect("write script");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        dir
    })
}

fn script(name: &str) -> PathBuf {
    scripts().path().join(name)
}

fn bounds() -> ResizeBounds {
    ResizeBounds::new(Some(200), Some(200))
}

#[tokio::test]
async fn large_input_does_not_deadlock() {
    let input: Vec<u8> = (0..8 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    let filter = ResizeFilter::new(script("identity"));
    let mut out = BufferSink::new();

    tokio::time::timeout(Duration::from_secs(60), filter.run(&input[..], &mut out, bounds()))
        .await
        .expect("filter run timed out")
        .unwrap();

    assert_eq!(out.take().as_ref(), &input[..]);
}

#[tokio::test]
async fn filter_receives_resize_arguments() {
    let filter = ResizeFilter::new(script("echo-args"));
    let mut out = BufferSink::new();
    filter
        .run(&b"image"[..], &mut out, ResizeBounds::new(Some(320), None))
        .await
        .unwrap();

    assert_eq!(out.take().as_ref(), b"-resize|320x|-|jpg:-|");
}

#[tokio::test]
async fn failure_message_comes_from_stderr() {
    let filter = ResizeFilter::new(script("unsupported"));
    let mut out = BufferSink::new();
    let err = filter.run(&b"not an image"[..], &mut out, bounds()).await.unwrap_err();

    match &err {
        ThumbError::Conversion { message, exit_code } => {
            assert_eq!(message, "convert: no decode delegate for this image format");
            assert_eq!(*exit_code, Some(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), 500);
}

#[tokio::test]
async fn silent_failure_reports_exit_code() {
    let filter = ResizeFilter::new(script("quiet-failure"));
    let mut out = BufferSink::new();
    let err = filter.run(&b"x"[..], &mut out, bounds()).await.unwrap_err();
    assert_eq!(err.to_string(), "Error converting image, exit code: 3");
}

#[tokio::test]
async fn filter_that_stops_reading_fails_by_exit_status() {
    let input = vec![0u8; 4 * 1024 * 1024];
    let filter = ResizeFilter::new(script("early-exit"));
    let mut out = BufferSink::new();

    let err = tokio::time::timeout(Duration::from_secs(60), filter.run(&input[..], &mut out, bounds()))
        .await
        .expect("filter run timed out")
        .unwrap_err();

    assert_eq!(err.to_string(), "convert: improper image header");
    assert!(out.is_empty());
    out.abort(&err).await.unwrap();
}
