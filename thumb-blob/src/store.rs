use async_trait::async_trait;
use bytes::Bytes;

use crate::{BlobResult, CompletedPart, ObjectLocation, PartETag, UploadId, UploadOptions};

/// Multipart upload primitives of an object store.
///
/// Part numbers start at 1. `complete_multipart` receives the parts in
/// ascending order; an empty list denotes an empty object.
#[async_trait]
pub trait MultipartStore: Send + Sync {
    /// Start a multipart upload for `key`
    async fn create_multipart(&self, key: &str, options: &UploadOptions) -> BlobResult<UploadId>;

    /// Upload one part
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        body: Bytes,
    ) -> BlobResult<PartETag>;

    /// Make the object visible, assembled from `parts`
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> BlobResult<ObjectLocation>;

    /// Release every uploaded part; the object never becomes visible
    async fn abort_multipart(&self, key: &str, upload_id: &UploadId) -> BlobResult<()>;

    /// Delete a committed object
    async fn delete(&self, key: &str) -> BlobResult<()>;

    fn capabilities(&self) -> StoreCapabilities;
}

/// Store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    pub min_part_size: Option<u64>,
    pub max_part_size: Option<u64>,
    pub max_parts: Option<u32>,
}

impl StoreCapabilities {
    /// Limits documented for S3 multipart uploads.
    pub fn s3() -> Self {
        Self {
            min_part_size: Some(5 * 1024 * 1024),
            max_part_size: Some(5 * 1024 * 1024 * 1024),
            max_parts: Some(10_000),
        }
    }

    pub fn with_min_part_size(mut self, bytes: u64) -> Self {
        self.min_part_size = Some(bytes);
        self
    }
}
