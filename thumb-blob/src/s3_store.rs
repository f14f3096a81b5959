use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use bytes::Bytes;
use thumb_core::ThumbConfigSnapshot;

use crate::{
    BlobError, BlobResult, CompletedPart, MultipartStore, ObjectLocation, PartETag, StoreCapabilities, UploadId,
    UploadOptions,
};

/// Connection settings for an S3-compatible service.
///
/// Credentials and region fall back to the SDK's default provider chain when
/// not given explicitly.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: Option<String>,
    pub service_url: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3Settings {
    /// Read the `s3.*` keys.
    pub fn from_config(config: &ThumbConfigSnapshot) -> Self {
        Self {
            bucket: config.get_string("s3.bucket"),
            service_url: config.get_string("s3.service_url"),
            region: config.get_string("s3.region"),
            access_key_id: config.get_string("s3.access_key_id"),
            secret_access_key: config.get_string("s3.secret_access_key"),
        }
    }
}

/// Multipart uploads against S3 (or anything speaking its API).
#[derive(Clone)]
pub struct S3MultipartStore {
    client: Client,
    bucket: String,
}

impl S3MultipartStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from `settings`; the bucket must be set.
    pub async fn connect(settings: S3Settings) -> BlobResult<Self> {
        let bucket = settings
            .bucket
            .clone()
            .ok_or_else(|| BlobError::invalid("an S3 bucket name is required"))?;
        let client = Self::create_client(&settings).await;
        Ok(Self { client, bucket })
    }

    /// Build a client without a default bucket, for per-object buckets.
    pub async fn client(settings: &S3Settings) -> Client {
        Self::create_client(settings).await
    }

    /// Same client, different bucket.
    pub fn with_bucket(&self, bucket: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_client(settings: &S3Settings) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(key), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(key, secret, None, None, "thumb-config"));
        }
        if let Some(url) = &settings.service_url {
            loader = loader.endpoint_url(url);
        }
        let aws_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if settings.service_url.is_some() {
            // Custom endpoints (MinIO, RustFS, ...) rarely support virtual-hosted buckets.
            builder = builder.force_path_style(true);
        }
        Client::from_conf(builder.build())
    }

    fn map_aws_error(err: impl std::error::Error + Send + Sync + 'static) -> BlobError {
        BlobError::backend(err)
    }
}

#[async_trait]
impl MultipartStore for S3MultipartStore {
    async fn create_multipart(&self, key: &str, options: &UploadOptions) -> BlobResult<UploadId> {
        let mut request = self.client.create_multipart_upload().bucket(&self.bucket).key(key);
        if let Some(acl) = &options.acl {
            request = request.acl(ObjectCannedAcl::from(acl.as_str()));
        }
        if let Some(content_type) = &options.content_type {
            request = request.content_type(content_type);
        }

        let output = request.send().await.map_err(Self::map_aws_error)?;
        let upload_id = output
            .upload_id()
            .ok_or_else(|| BlobError::upload_failed(format!("no upload id returned for {key}")))?;
        tracing::debug!(bucket = %self.bucket, key, upload_id, "multipart upload created");
        Ok(UploadId::from_string(upload_id.to_string()))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        body: Bytes,
    ) -> BlobResult<PartETag> {
        let part_number_i32 = i32::try_from(part_number)
            .map_err(|_| BlobError::invalid(format!("part number {part_number} out of range")))?;

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .part_number(part_number_i32)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(Self::map_aws_error)?;

        let etag = output
            .e_tag()
            .ok_or_else(|| BlobError::upload_failed(format!("no ETag returned for part {part_number} of {key}")))?;
        Ok(PartETag {
            part_number,
            etag: etag.to_string(),
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> BlobResult<ObjectLocation> {
        // S3 refuses a completion without parts; an empty object is one empty part.
        let parts = if parts.is_empty() {
            let etag = self.upload_part(key, upload_id, 1, Bytes::new()).await?;
            vec![CompletedPart {
                part_number: 1,
                etag: etag.etag,
                size_bytes: 0,
            }]
        } else {
            parts
        };

        let completed = parts
            .iter()
            .map(|part| {
                AwsCompletedPart::builder()
                    .e_tag(&part.etag)
                    .part_number(part.part_number as i32)
                    .build()
            })
            .collect::<Vec<_>>();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed)).build())
            .send()
            .await
            .map_err(Self::map_aws_error)?;

        Ok(ObjectLocation::new(Some(self.bucket.clone()), key))
    }

    async fn abort_multipart(&self, key: &str, upload_id: &UploadId) -> BlobResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::s3()
    }
}
