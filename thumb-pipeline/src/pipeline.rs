use std::sync::Arc;

use thumb_blob::{MultipartStore, MultipartUploadSink};
use thumb_core::{ResizeFilter, ThumbConfigSnapshot, ThumbResult};

use crate::{ObjectNames, PipelineSettings};

/// Request-independent pipeline wiring, shared by every request.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) filter: ResizeFilter,
    pub(crate) store: Arc<dyn MultipartStore>,
    pub(crate) settings: PipelineSettings,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("filter", &self.filter)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Pipeline {
    /// Fails if the upload rules do not fit the store.
    pub fn new(filter: ResizeFilter, store: Arc<dyn MultipartStore>, settings: PipelineSettings) -> ThumbResult<Self> {
        settings.upload.validate(&store.capabilities())?;
        Ok(Self {
            filter,
            store,
            settings,
        })
    }

    pub fn from_config(store: Arc<dyn MultipartStore>, config: &ThumbConfigSnapshot) -> ThumbResult<Self> {
        Self::new(
            ResizeFilter::from_config(config),
            store,
            PipelineSettings::from_config(config),
        )
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn filter(&self) -> &ResizeFilter {
        &self.filter
    }

    /// Fresh object names for a request with the given `Content-Type`.
    pub fn names(&self, content_type: Option<&str>) -> ObjectNames {
        ObjectNames::generate(content_type)
    }

    /// Public location of the full-size object, as sent in `X-Fullsize`.
    pub fn fullsize_url(&self, names: &ObjectNames) -> String {
        names.fullsize_url(self.settings.bucket.as_deref(), self.settings.public_endpoint.as_deref())
    }

    /// Public location of the thumbnail, as sent in `X-Thumbnail`.
    pub fn thumbnail_url(&self, names: &ObjectNames) -> String {
        names.thumbnail_url(self.settings.bucket.as_deref(), self.settings.public_endpoint.as_deref())
    }

    pub(crate) fn upload_sink(&self, key: &str, content_type: Option<String>) -> ThumbResult<MultipartUploadSink> {
        Ok(MultipartUploadSink::new(
            self.store.clone(),
            key,
            &self.settings.upload,
            content_type,
        )?)
    }
}
