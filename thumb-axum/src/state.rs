use std::sync::Arc;

use thumb_core::ThumbConfigSnapshot;
use thumb_pipeline::Pipeline;

/// Thumbnail bytes held back before the status line is committed (256 KiB).
pub const DEFAULT_RESPONSE_BUFFER_BYTES: usize = 256 * 1024;
pub const DEFAULT_RESPONSE_CHUNKS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// A request finishing within this many thumbnail bytes gets its true status
    pub response_buffer_bytes: usize,
    /// Chunks the response body may lag behind the filter
    pub response_chunks: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            response_buffer_bytes: DEFAULT_RESPONSE_BUFFER_BYTES,
            response_chunks: DEFAULT_RESPONSE_CHUNKS,
        }
    }
}

impl ServerSettings {
    /// Reads `http.response_buffer_bytes` and `http.response_chunks`.
    pub fn from_config(config: &ThumbConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            response_buffer_bytes: config
                .get_usize("http.response_buffer_bytes")
                .unwrap_or(defaults.response_buffer_bytes),
            response_chunks: config
                .get_usize("http.response_chunks")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.response_chunks),
        }
    }
}

#[derive(Clone)]
pub struct ThumbAxumState {
    pub pipeline: Arc<Pipeline>,
    pub settings: ServerSettings,
}

impl ThumbAxumState {
    pub fn new(pipeline: Pipeline, settings: ServerSettings) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            settings,
        }
    }
}
