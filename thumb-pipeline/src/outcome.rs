use std::io;

use serde::Serialize;
use thumb_blob::{SessionHandle, UploadSession};
use thumb_core::pipe::classify_read_error;
use thumb_core::{ByteSink, ThumbError};

/// Result of a completed request: both objects committed.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub input_bytes: u64,
    pub fullsize: UploadSession,
    pub thumbnail: UploadSession,
}

/// Map a failed read of the caller's input.
pub(crate) fn input_read_error(err: io::Error) -> ThumbError {
    match classify_read_error(err) {
        ThumbError::Io { source } => ThumbError::input_with("Unable to read input", source),
        other => other,
    }
}

/// Abort `sink`, logging a failing abort.
pub(crate) async fn abort_quietly(sink: &mut dyn ByteSink, reason: &ThumbError) {
    if let Err(err) = sink.abort(reason).await {
        tracing::warn!(sink = sink.name(), error = %err, "abort failed");
    }
}

/// Roll back objects that already committed for a failed request.
pub(crate) async fn discard_committed(sessions: &[&SessionHandle]) {
    for session in sessions {
        if let Err(err) = session.discard().await {
            tracing::error!(key = %session.key(), error = %err, "failed to discard committed object");
        }
    }
}
