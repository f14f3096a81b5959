//! # thumb-blob: multipart object storage for thumbnail pipelines
//!
//! `thumb-blob` turns an unbounded byte stream into a multipart upload that is
//! either committed as a whole or not at all.
//!
//! ```text
//! ┌──────────────────────┐
//! │ MultipartUploadSink  │  ← ByteSink: buffers parts, one upload in flight
//! ├──────────────────────┤
//! │   MultipartStore     │  ← create / upload_part / complete / abort
//! └──────────────────────┘
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//! use thumb_blob::{MemoryMultipartStore, MultipartUploadSink, SessionState, UploadRules};
//! use thumb_core::ByteSink;
//!
//! # #[tokio::main]
//! # async fn main() -> thumb_core::ThumbResult<()> {
//! let store = Arc::new(MemoryMultipartStore::new());
//! let mut sink = MultipartUploadSink::new(store.clone(), "photo.png", &UploadRules::default(), None)?;
//!
//! sink.write(bytes::Bytes::from_static(b"\x89PNG...")).await?;
//! let session = sink.commit().await?;
//! assert_eq!(session.state, SessionState::Committed);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod memory_store;
mod s3_store;
mod store;
mod types;
mod upload;

pub use config::{UploadRules, DEFAULT_ACL, DEFAULT_PART_SIZE};
pub use error::{BlobError, BlobResult};
pub use memory_store::{MemoryMultipartStore, StoreCall, StoredObject};
pub use s3_store::{S3MultipartStore, S3Settings};
pub use store::{MultipartStore, StoreCapabilities};
pub use types::{CompletedPart, ObjectLocation, PartETag, SessionState, UploadId, UploadOptions, UploadSession};
pub use upload::{MultipartUploadSink, SessionHandle};
