use thumb_blob::UploadRules;
use thumb_core::{ResizeBounds, ThumbConfigSnapshot, DEFAULT_PASS_THROUGH_CAPACITY};

/// Spool limit for buffered mode (100 MiB).
pub const DEFAULT_MAX_BUFFERED_INPUT: u64 = 100 * 1024 * 1024;

/// Typed pipeline settings read from a config snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub bounds: ResizeBounds,
    pub upload: UploadRules,
    /// Bucket named in public locations
    pub bucket: Option<String>,
    pub public_endpoint: Option<String>,
    /// Largest input buffered mode accepts
    pub max_buffered_input: u64,
    /// Chunks the filter input may lag behind the request body
    pub pass_through_chunks: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bounds: ResizeBounds::new(
                Some(thumb_core::filter::DEFAULT_MAX_WIDTH),
                Some(thumb_core::filter::DEFAULT_MAX_HEIGHT),
            ),
            upload: UploadRules::default(),
            bucket: None,
            public_endpoint: None,
            max_buffered_input: DEFAULT_MAX_BUFFERED_INPUT,
            pass_through_chunks: DEFAULT_PASS_THROUGH_CAPACITY,
        }
    }
}

impl PipelineSettings {
    /// Keys: `filter.max_width`, `filter.max_height`, `upload.*`, `s3.bucket`,
    /// `s3.public_endpoint`, `pipeline.max_buffered_input`,
    /// `pipeline.pass_through_chunks`.
    pub fn from_config(config: &ThumbConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            bounds: ResizeBounds::from_config(config),
            upload: UploadRules::from_config(config),
            bucket: config.get_string("s3.bucket"),
            public_endpoint: config.get_string("s3.public_endpoint"),
            max_buffered_input: config
                .get_u64("pipeline.max_buffered_input")
                .unwrap_or(defaults.max_buffered_input),
            pass_through_chunks: config
                .get_usize("pipeline.pass_through_chunks")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.pass_through_chunks),
        }
    }

    pub fn with_upload(mut self, upload: UploadRules) -> Self {
        self.upload = upload;
        self
    }

    pub fn with_bounds(mut self, bounds: ResizeBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_max_buffered_input(mut self, bytes: u64) -> Self {
        self.max_buffered_input = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thumb_core::ThumbConfig;

    #[test]
    fn reads_every_key_with_defaults() {
        let mut config = ThumbConfig::new();
        config.set("s3.bucket", "images");
        config.set("filter.max_height", "120");
        config.set("pipeline.pass_through_chunks", "0");

        let settings = PipelineSettings::from_config(&config.snapshot());
        assert_eq!(settings.bucket.as_deref(), Some("images"));
        assert_eq!(settings.bounds, ResizeBounds::new(Some(200), Some(120)));
        assert_eq!(settings.pass_through_chunks, DEFAULT_PASS_THROUGH_CAPACITY);
        assert_eq!(settings.max_buffered_input, DEFAULT_MAX_BUFFERED_INPUT);
        assert_eq!(settings.upload, UploadRules::default());
    }
}
