//! In-process [`MultipartStore`] that records every call.
//!
//! Faults can be injected per key fragment, which is how the pipeline tests
//! make one object of a request fail while its siblings succeed.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::{
    BlobError, BlobResult, CompletedPart, MultipartStore, ObjectLocation, PartETag, StoreCapabilities, UploadId,
    UploadOptions,
};

/// One call made against the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Create { key: String },
    UploadPart { key: String, part_number: u32, size: usize },
    Complete { key: String, parts: usize },
    Abort { key: String },
    Delete { key: String },
}

impl StoreCall {
    pub fn key(&self) -> &str {
        match self {
            Self::Create { key }
            | Self::UploadPart { key, .. }
            | Self::Complete { key, .. }
            | Self::Abort { key }
            | Self::Delete { key } => key,
        }
    }
}

/// A committed object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Empty when the store was built with [`MemoryMultipartStore::discard_payload`]
    pub data: Bytes,
    pub size_bytes: u64,
    pub part_sizes: Vec<u64>,
    pub options: UploadOptions,
}

struct PendingUpload {
    key: String,
    options: UploadOptions,
    parts: BTreeMap<u32, (String, Bytes, u64)>,
}

#[derive(Default)]
struct State {
    uploads: HashMap<UploadId, PendingUpload>,
    objects: HashMap<String, StoredObject>,
    calls: Vec<StoreCall>,
    parts_in_flight: usize,
    max_parts_in_flight: usize,
}

#[derive(Default)]
struct Faults {
    create: Vec<String>,
    part: Vec<(String, u32)>,
    complete: Vec<String>,
    part_delay: Option<Duration>,
    create_delay: Option<Duration>,
}

pub struct MemoryMultipartStore {
    bucket: Option<String>,
    keep_payload: bool,
    capabilities: StoreCapabilities,
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl Default for MemoryMultipartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMultipartStore {
    pub fn new() -> Self {
        Self {
            bucket: None,
            keep_payload: true,
            capabilities: StoreCapabilities::default(),
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn with_bucket<S: Into<String>>(mut self, bucket: S) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Keep only sizes, not bytes (large-input tests).
    pub fn discard_payload(mut self) -> Self {
        self.keep_payload = false;
        self
    }

    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Fail `create_multipart` for keys containing `fragment`.
    pub fn fail_create_for<S: Into<String>>(&self, fragment: S) {
        self.faults.lock().create.push(fragment.into());
    }

    /// Fail part `part_number` for keys containing `fragment`.
    pub fn fail_part_for<S: Into<String>>(&self, fragment: S, part_number: u32) {
        self.faults.lock().part.push((fragment.into(), part_number));
    }

    /// Fail `complete_multipart` for keys containing `fragment`.
    pub fn fail_complete_for<S: Into<String>>(&self, fragment: S) {
        self.faults.lock().complete.push(fragment.into());
    }

    /// Make every `create_multipart` take at least `delay`.
    pub fn set_create_delay(&self, delay: Duration) {
        self.faults.lock().create_delay = Some(delay);
    }

    /// Make every part upload take at least `delay`.
    pub fn set_part_delay(&self, delay: Duration) {
        self.faults.lock().part_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_for(&self, fragment: &str) -> Vec<StoreCall> {
        self.calls().into_iter().filter(|c| c.key().contains(fragment)).collect()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Uploads created but neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    pub fn max_parts_in_flight(&self) -> usize {
        self.state.lock().max_parts_in_flight
    }

    fn record(&self, call: StoreCall) {
        self.state.lock().calls.push(call);
    }

    fn location(&self, key: &str) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), key)
    }
}

/// Decrements the in-flight counter even if the upload future is dropped.
struct InFlight<'a>(&'a Mutex<State>);

impl<'a> InFlight<'a> {
    fn enter(state: &'a Mutex<State>) -> Self {
        let mut guard = state.lock();
        guard.parts_in_flight += 1;
        guard.max_parts_in_flight = guard.max_parts_in_flight.max(guard.parts_in_flight);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().parts_in_flight -= 1;
    }
}

#[async_trait]
impl MultipartStore for MemoryMultipartStore {
    async fn create_multipart(&self, key: &str, options: &UploadOptions) -> BlobResult<UploadId> {
        self.record(StoreCall::Create { key: key.to_string() });
        let (delay, fail) = {
            let faults = self.faults.lock();
            (faults.create_delay, faults.create.iter().any(|f| key.contains(f.as_str())))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BlobError::upload_failed(format!("create rejected for {key}")));
        }

        let upload_id = UploadId::new();
        self.state.lock().uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                options: options.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        body: Bytes,
    ) -> BlobResult<PartETag> {
        let size = body.len();
        self.record(StoreCall::UploadPart {
            key: key.to_string(),
            part_number,
            size,
        });
        let _in_flight = InFlight::enter(&self.state);

        let (delay, fail) = {
            let faults = self.faults.lock();
            let fail = faults
                .part
                .iter()
                .any(|(f, n)| *n == part_number && key.contains(f.as_str()));
            (faults.part_delay, fail)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BlobError::upload_failed(format!("part {part_number} of {key} rejected")));
        }

        let etag = format!("\"{}-{}\"", upload_id, part_number);
        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| BlobError::upload_not_found(upload_id.as_str()))?;
        let kept = if self.keep_payload { body } else { Bytes::new() };
        upload.parts.insert(part_number, (etag.clone(), kept, size as u64));

        Ok(PartETag { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &UploadId,
        parts: Vec<CompletedPart>,
    ) -> BlobResult<ObjectLocation> {
        self.record(StoreCall::Complete {
            key: key.to_string(),
            parts: parts.len(),
        });
        if self.faults.lock().complete.iter().any(|f| key.contains(f.as_str())) {
            return Err(BlobError::upload_failed(format!("completion rejected for {key}")));
        }

        let mut state = self.state.lock();
        let (object_key, object) = {
            let upload = state
                .uploads
                .get(upload_id)
                .ok_or_else(|| BlobError::upload_not_found(upload_id.as_str()))?;

            let mut data = BytesMut::new();
            let mut part_sizes = Vec::with_capacity(parts.len());
            for (index, part) in parts.iter().enumerate() {
                if part.part_number as usize != index + 1 {
                    return Err(BlobError::invalid(format!(
                        "part numbers must be contiguous from 1, found {} at position {}",
                        part.part_number,
                        index + 1
                    )));
                }
                let (etag, bytes, size) = upload
                    .parts
                    .get(&part.part_number)
                    .ok_or_else(|| BlobError::invalid(format!("part {} was never uploaded", part.part_number)))?;
                if *etag != part.etag {
                    return Err(BlobError::invalid(format!("etag mismatch for part {}", part.part_number)));
                }
                data.extend_from_slice(bytes);
                part_sizes.push(*size);
            }

            let object = StoredObject {
                data: data.freeze(),
                size_bytes: part_sizes.iter().sum(),
                part_sizes,
                options: upload.options.clone(),
            };
            (upload.key.clone(), object)
        };

        state.uploads.remove(upload_id);
        state.objects.insert(object_key, object);
        Ok(self.location(key))
    }

    async fn abort_multipart(&self, key: &str, upload_id: &UploadId) -> BlobResult<()> {
        self.record(StoreCall::Abort { key: key.to_string() });
        self.state
            .lock()
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| BlobError::upload_not_found(upload_id.as_str()))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.record(StoreCall::Delete { key: key.to_string() });
        self.state.lock().objects.remove(key);
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities.clone()
    }
}
