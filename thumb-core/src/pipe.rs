//! Bounded in-process byte pipe.
//!
//! The write half is a [`ByteSink`]; the read half is a [`PipeStream`] that can
//! be handed to an HTTP body or turned into an `AsyncRead` with
//! [`PipeStream::into_reader`]. Capacity is counted in chunks, so a writer can
//! run at most `capacity` chunks ahead of its reader.
//!
//! Ending the pipe with `close` yields a clean end-of-stream. Ending it with
//! `abort` yields an error item after the already queued chunks, so a reader
//! never mistakes a failed stream for a complete one.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::StreamReader;

use crate::{ByteSink, ThumbError, ThumbResult};

/// Reader side of a pipe as an `AsyncRead`.
pub type PipeReader = StreamReader<PipeStream, Bytes>;

/// Error item delivered to readers of an aborted pipe.
#[derive(Error, Debug, Clone)]
#[error("stream aborted: {reason}")]
pub struct StreamAborted {
    pub reason: String,
}

/// Create a pipe holding at most `capacity` chunks in flight.
pub fn pipe<S: Into<String>>(name: S, capacity: usize) -> (PipeSink, PipeStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (failure_tx, failure_rx) = oneshot::channel();
    (
        PipeSink {
            name: name.into(),
            tx: Some(tx),
            failure: Some(failure_tx),
            aborted: false,
        },
        PipeStream {
            rx,
            failure: failure_rx,
            done: false,
        },
    )
}

/// Map a read error from a pipe (or any input) into the pipeline taxonomy.
pub fn classify_read_error(err: io::Error) -> ThumbError {
    match err.get_ref().and_then(|inner| inner.downcast_ref::<StreamAborted>()) {
        Some(aborted) => ThumbError::cancelled(aborted.reason.clone()),
        None => ThumbError::Io { source: err },
    }
}

pub struct PipeSink {
    name: String,
    tx: Option<mpsc::Sender<Bytes>>,
    failure: Option<oneshot::Sender<io::Error>>,
    aborted: bool,
}

impl PipeSink {
    /// True once the reader half has been dropped.
    pub fn is_reader_gone(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

#[async_trait]
impl ByteSink for PipeSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, chunk: Bytes) -> ThumbResult<()> {
        let tx = match self.tx.as_ref() {
            Some(tx) => tx,
            None if self.aborted => {
                return Err(ThumbError::cancelled(format!("{} was aborted", self.name)))
            }
            None => return Err(ThumbError::cancelled(format!("{} is already closed", self.name))),
        };
        tx.send(chunk)
            .await
            .map_err(|_| ThumbError::cancelled(format!("{} reader went away", self.name)))
    }

    async fn close(&mut self) -> ThumbResult<()> {
        if self.aborted {
            return Err(ThumbError::cancelled(format!("{} was aborted", self.name)));
        }
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        self.failure.take();
        // Queued chunks are lost with the reader; the stream never completed.
        if tx.is_closed() {
            return Err(ThumbError::cancelled(format!("{} reader went away", self.name)));
        }
        Ok(())
    }

    async fn abort(&mut self, reason: &ThumbError) -> ThumbResult<()> {
        if self.aborted {
            return Ok(());
        }
        self.aborted = true;
        if let Some(failure) = self.failure.take() {
            let item = io::Error::new(
                io::ErrorKind::Other,
                StreamAborted {
                    reason: reason.to_string(),
                },
            );
            // Reader may already be gone; nothing left to notify then.
            let _ = failure.send(item);
        }
        self.tx.take();
        Ok(())
    }
}

/// Read half of a [`pipe`].
#[derive(Debug)]
pub struct PipeStream {
    rx: mpsc::Receiver<Bytes>,
    failure: oneshot::Receiver<io::Error>,
    done: bool,
}

impl PipeStream {
    pub fn into_reader(self) -> PipeReader {
        StreamReader::new(self)
    }
}

impl Stream for PipeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => {
                self.done = true;
                // The failure is sent before the sender is dropped, so it is
                // already visible once the channel reports closed.
                match self.failure.try_recv() {
                    Ok(err) => Poll::Ready(Some(Err(err))),
                    Err(_) => Poll::Ready(None),
                }
            }
        }
    }
}
