#![allow(dead_code)]

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use thumb_blob::{MemoryMultipartStore, UploadRules};
use thumb_core::{pipe, PipeSink, ResizeBounds, ResizeFilter};
use thumb_pipeline::{Pipeline, PipelineSettings};
use tokio::task::JoinHandle;

pub const PART: usize = 16 * 1024;

/// Filter scripts, written once before any test spawns a process.
fn scripts() -> &'static tempfile::TempDir {
    static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().expect("script dir");
        let scripts = [
            ("identity", "#!/bin/sh\nexec cat\n"),
            ("unsupported", "#!/bin/sh\ncat > /dev/null\necho 'unsupported format' >&2\nexit 1\n"),
            ("fixed-jpeg", "#!/bin/sh\ncat > /dev/null\nprintf 'JPEGDATA'\n"),
        ];
        for (name, body) in scripts {
            let path = dir.path().join(name);
            std::fs::write(&path, body).expect("write script");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        dir
    })
}

pub fn filter(name: &str) -> ResizeFilter {
    ResizeFilter::new(script(name))
}

pub fn script(name: &str) -> PathBuf {
    scripts().path().join(name)
}

pub fn store() -> Arc<MemoryMultipartStore> {
    Arc::new(MemoryMultipartStore::new().with_bucket("images"))
}

pub fn settings() -> PipelineSettings {
    PipelineSettings::default()
        .with_upload(UploadRules::new().with_part_size(PART))
        .with_bounds(ResizeBounds::new(Some(200), Some(200)))
}

pub fn pipeline(store: &Arc<MemoryMultipartStore>, script: &str) -> Pipeline {
    Pipeline::new(filter(script), store.clone(), settings()).expect("pipeline")
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

/// Response sink plus a task draining it like an HTTP client would.
pub fn response() -> (PipeSink, JoinHandle<io::Result<Vec<u8>>>) {
    let (sink, mut stream) = pipe("response", 8);
    let reader = tokio::spawn(async move {
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    });
    (sink, reader)
}
