use thiserror::Error;
use thumb_core::ThumbError;

/// Result type for object-store operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors raised by a [`MultipartStore`](crate::MultipartStore) or an upload sink
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Upload session not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn upload_not_found<S: Into<String>>(upload_id: S) -> Self {
        Self::UploadNotFound {
            upload_id: upload_id.into(),
        }
    }

    /// Create an upload failed error
    pub fn upload_failed<S: Into<String>>(reason: S) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }
}

impl From<BlobError> for ThumbError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Invalid { message } => ThumbError::config(message),
            BlobError::UploadFailed { reason } => ThumbError::upload(reason),
            other => ThumbError::upload_with(other.to_string(), other),
        }
    }
}
