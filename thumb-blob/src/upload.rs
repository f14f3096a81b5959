//! Part buffer: turns a byte stream of unknown length into a multipart upload.
//!
//! Bytes accumulate until a full part is available, which is then uploaded in
//! a background task while the next part fills. A part upload only starts
//! once the previous one succeeded, so at most one part is in flight and the
//! sink holds at most about two parts plus one incoming chunk.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use thumb_core::{ByteSink, ThumbError, ThumbResult};
use tokio::task::JoinHandle;

use crate::{
    BlobResult, CompletedPart, MultipartStore, ObjectLocation, PartETag, SessionState, UploadId, UploadOptions,
    UploadRules, UploadSession,
};

struct InFlightPart {
    part_number: u32,
    size: usize,
    task: JoinHandle<BlobResult<PartETag>>,
}

/// [`ByteSink`] backed by one multipart upload session.
pub struct MultipartUploadSink {
    store: Arc<dyn MultipartStore>,
    key: String,
    options: UploadOptions,
    part_size: usize,
    buffer: BytesMut,
    upload_id: Option<UploadId>,
    /// `create_multipart` in progress; kept so `abort` can still reach it
    opening: Option<JoinHandle<BlobResult<UploadId>>>,
    in_flight: Option<InFlightPart>,
    next_part: u32,
    flushed: bool,
    failed: bool,
    session: Arc<Mutex<UploadSession>>,
}

impl std::fmt::Debug for MultipartUploadSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartUploadSink")
            .field("key", &self.key)
            .field("part_size", &self.part_size)
            .field("buffered", &self.buffer.len())
            .field("next_part", &self.next_part)
            .finish()
    }
}

impl MultipartUploadSink {
    /// Create a sink for `key`. Fails if `rules` do not fit the store.
    pub fn new<K: Into<String>>(
        store: Arc<dyn MultipartStore>,
        key: K,
        rules: &UploadRules,
        content_type: Option<String>,
    ) -> BlobResult<Self> {
        rules.validate(&store.capabilities())?;
        let key = key.into();
        let options = UploadOptions {
            acl: Some(rules.acl.clone()),
            content_type,
        };

        Ok(Self {
            store,
            session: Arc::new(Mutex::new(UploadSession::new(key.clone()))),
            key,
            options,
            part_size: rules.part_size,
            buffer: BytesMut::new(),
            upload_id: None,
            opening: None,
            in_flight: None,
            next_part: 1,
            flushed: false,
            failed: false,
        })
    }

    /// Observer that stays valid after the sink is moved into a tee.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session: self.session.clone(),
            store: self.store.clone(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Close and return the final session.
    pub async fn commit(mut self) -> ThumbResult<UploadSession> {
        self.close().await?;
        Ok(self.session.lock().clone())
    }

    fn state(&self) -> SessionState {
        self.session.lock().state
    }

    fn ensure_writable(&self) -> ThumbResult<()> {
        if self.failed {
            return Err(ThumbError::cancelled(format!("upload of {} has failed", self.key)));
        }
        match self.state() {
            SessionState::Open if !self.flushed => Ok(()),
            SessionState::Open => Err(ThumbError::cancelled(format!("upload of {} is sealed", self.key))),
            state => Err(ThumbError::cancelled(format!("upload of {} is {state:?}", self.key))),
        }
    }

    async fn ensure_session(&mut self) -> ThumbResult<UploadId> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }
        let (store, key, options) = (self.store.clone(), self.key.clone(), self.options.clone());
        let opening = self
            .opening
            .get_or_insert_with(|| tokio::spawn(async move { store.create_multipart(&key, &options).await }));
        // Same as parts: the task stays reachable until joined.
        let joined = opening.await;
        self.opening = None;
        let id = joined.map_err(|err| ThumbError::upload_with("upload session task failed", err))??;
        self.opened(id.clone());
        Ok(id)
    }

    fn opened(&mut self, id: UploadId) {
        tracing::debug!(key = %self.key, upload_id = %id, "upload session opened");
        self.session.lock().upload_id = Some(id.clone());
        self.upload_id = Some(id);
    }

    /// Wait for the part in flight, if any, and record it.
    async fn settle_in_flight(&mut self) -> ThumbResult<()> {
        let Some(part) = self.in_flight.as_mut() else {
            return Ok(());
        };
        let (part_number, size) = (part.part_number, part.size);
        // Stays in `in_flight` until joined; `abort` waits on it if this
        // future is dropped.
        let joined = (&mut part.task).await;
        self.in_flight = None;
        let etag = joined
            .map_err(|err| ThumbError::upload_with(format!("part {part_number} upload task failed"), err))??;

        tracing::debug!(key = %self.key, part = part_number, size, "part committed");
        self.session.lock().parts.push(CompletedPart {
            part_number: etag.part_number,
            etag: etag.etag,
            size_bytes: size as u64,
        });
        Ok(())
    }

    /// Hand `body` to a background upload once the previous part is done.
    async fn start_part(&mut self, body: Bytes) -> ThumbResult<()> {
        let upload_id = self.ensure_session().await?;
        self.settle_in_flight().await?;

        let part_number = self.next_part;
        self.next_part += 1;
        let size = body.len();
        let store = self.store.clone();
        let key = self.key.clone();
        let task = tokio::spawn(async move { store.upload_part(&key, &upload_id, part_number, body).await });

        self.in_flight = Some(InFlightPart {
            part_number,
            size,
            task,
        });
        Ok(())
    }

    fn track_memory(&self) {
        let held = self.buffer.len() + self.in_flight.as_ref().map_or(0, |p| p.size);
        let mut session = self.session.lock();
        session.peak_buffered = session.peak_buffered.max(held);
    }

    async fn write_inner(&mut self, chunk: Bytes) -> ThumbResult<()> {
        self.ensure_session().await?;
        self.buffer.extend_from_slice(&chunk);
        self.session.lock().bytes_written += chunk.len() as u64;
        self.track_memory();

        while self.buffer.len() >= self.part_size {
            let part = self.buffer.split_to(self.part_size).freeze();
            self.start_part(part).await?;
        }
        Ok(())
    }

    async fn flush_inner(&mut self) -> ThumbResult<()> {
        self.ensure_session().await?;
        if !self.buffer.is_empty() {
            let last = self.buffer.split().freeze();
            self.start_part(last).await?;
        }
        self.settle_in_flight().await?;
        self.flushed = true;
        Ok(())
    }

    async fn finalize(&mut self) -> ThumbResult<ObjectLocation> {
        if !self.flushed {
            self.flush_inner().await?;
        }
        let upload_id = self.ensure_session().await?;

        let parts = {
            let mut session = self.session.lock();
            session.state = SessionState::Committing;
            session.parts.clone()
        };
        let count = parts.len();
        let location = self.store.complete_multipart(&self.key, &upload_id, parts).await?;
        tracing::debug!(key = %self.key, parts = count, "upload session committed");
        Ok(location)
    }
}

#[async_trait]
impl ByteSink for MultipartUploadSink {
    fn name(&self) -> &str {
        &self.key
    }

    async fn write(&mut self, chunk: Bytes) -> ThumbResult<()> {
        self.ensure_writable()?;
        if chunk.is_empty() {
            return Ok(());
        }
        let result = self.write_inner(chunk).await;
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    async fn flush(&mut self) -> ThumbResult<()> {
        if self.flushed && !self.failed {
            return Ok(());
        }
        self.ensure_writable()?;
        let result = self.flush_inner().await;
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    async fn close(&mut self) -> ThumbResult<()> {
        if self.failed {
            return Err(ThumbError::cancelled(format!("upload of {} has failed", self.key)));
        }
        if self.state() != SessionState::Open {
            return Err(ThumbError::cancelled(format!("upload of {} is already finished", self.key)));
        }

        match self.finalize().await {
            Ok(location) => {
                let mut session = self.session.lock();
                session.state = SessionState::Committed;
                session.location = Some(location);
                Ok(())
            }
            Err(err) => {
                self.failed = true;
                if let Err(abort_err) = self.abort(&err).await {
                    tracing::warn!(key = %self.key, error = %abort_err, "abort after failed commit also failed");
                }
                Err(err)
            }
        }
    }

    async fn abort(&mut self, reason: &ThumbError) -> ThumbResult<()> {
        if self.state().is_terminal() {
            return Ok(());
        }
        self.failed = true;
        self.buffer.clear();

        // A session still being created may exist on the store already.
        if let Some(opening) = self.opening.take() {
            match opening.await {
                Ok(Ok(id)) => self.opened(id),
                Ok(Err(err)) => tracing::debug!(key = %self.key, error = %err, "session creation failed during abort"),
                Err(err) => tracing::debug!(key = %self.key, error = %err, "session task failed during abort"),
            }
        }

        // The part already on the wire is allowed to finish before the abort.
        if let Some(part) = self.in_flight.take() {
            if let Ok(Err(err)) = part.task.await {
                tracing::debug!(key = %self.key, part = part.part_number, error = %err, "in-flight part failed during abort");
            }
        }

        let result = match self.upload_id.clone() {
            Some(upload_id) => self.store.abort_multipart(&self.key, &upload_id).await,
            None => Ok(()),
        };
        self.session.lock().state = SessionState::Aborted;
        tracing::debug!(key = %self.key, reason = %reason, "upload session aborted");
        result.map_err(ThumbError::from)
    }
}

/// Shared view of a [`MultipartUploadSink`]'s session.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<UploadSession>>,
    store: Arc<dyn MultipartStore>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionHandle").field(&*self.session.lock()).finish()
    }
}

impl SessionHandle {
    pub fn snapshot(&self) -> UploadSession {
        self.session.lock().clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    pub fn key(&self) -> String {
        self.session.lock().key.clone()
    }

    pub fn location(&self) -> Option<ObjectLocation> {
        self.session.lock().location.clone()
    }

    /// Delete a committed object and mark the session aborted.
    ///
    /// Sessions that never committed are left as they are.
    pub async fn discard(&self) -> ThumbResult<()> {
        let key = {
            let session = self.session.lock();
            if session.state != SessionState::Committed {
                return Ok(());
            }
            session.key.clone()
        };

        self.store.delete(&key).await?;
        let mut session = self.session.lock();
        session.state = SessionState::Aborted;
        session.location = None;
        tracing::debug!(key = %key, "committed object discarded");
        Ok(())
    }
}
