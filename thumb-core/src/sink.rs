use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{ThumbError, ThumbResult};

/// Boxed source of chunks, e.g. a request body or a download.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Destination for an ordered byte stream.
///
/// Lifecycle: any number of `write` calls, then exactly one of `close`
/// (success) or `abort` (error mode). `flush` may be called before `close`
/// to push every buffered byte downstream while keeping the final commit
/// pending; a sink that has nothing to commit treats it as a no-op.
///
/// After `abort`, or after a failed `write`, further writes fail with a
/// cancellation error.
#[async_trait]
pub trait ByteSink: Send {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn write(&mut self, chunk: Bytes) -> ThumbResult<()>;

    async fn flush(&mut self) -> ThumbResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> ThumbResult<()>;

    async fn abort(&mut self, reason: &ThumbError) -> ThumbResult<()>;
}

/// Sink over any `AsyncWrite` (stdout, sockets).
///
/// Bytes already written cannot be retracted, so `abort` only stops writing.
pub struct WriterSink<W> {
    name: String,
    writer: Option<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new<S: Into<String>>(name: S, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: Some(writer),
        }
    }

    fn writer(&mut self) -> ThumbResult<&mut W> {
        let name = &self.name;
        self.writer
            .as_mut()
            .ok_or_else(|| ThumbError::cancelled(format!("{name} is already closed")))
    }
}

#[async_trait]
impl<W> ByteSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, chunk: Bytes) -> ThumbResult<()> {
        self.writer()?.write_all(&chunk).await?;
        Ok(())
    }

    async fn flush(&mut self) -> ThumbResult<()> {
        self.writer()?.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> ThumbResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.shutdown().await?;
        }
        Ok(())
    }

    async fn abort(&mut self, reason: &ThumbError) -> ThumbResult<()> {
        if self.writer.take().is_some() {
            tracing::warn!(sink = %self.name, reason = %reason, "output abandoned");
        }
        Ok(())
    }
}

/// Collects everything in memory, optionally refusing to grow past a limit.
///
/// Used for thumbnail-class payloads only.
#[derive(Debug, Default)]
pub struct BufferSink {
    buffer: BytesMut,
    limit: Option<usize>,
    closed: bool,
    aborted: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the collected bytes, leaving the sink empty.
    pub fn take(&mut self) -> Bytes {
        std::mem::take(&mut self.buffer).freeze()
    }
}

#[async_trait]
impl ByteSink for BufferSink {
    fn name(&self) -> &str {
        "buffer"
    }

    async fn write(&mut self, chunk: Bytes) -> ThumbResult<()> {
        if self.closed || self.aborted {
            return Err(ThumbError::cancelled("buffer is no longer accepting bytes"));
        }
        if let Some(limit) = self.limit {
            if self.buffer.len() + chunk.len() > limit {
                return Err(ThumbError::InputTooLarge { max: limit as u64 });
            }
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(&mut self) -> ThumbResult<()> {
        self.closed = true;
        Ok(())
    }

    async fn abort(&mut self, _reason: &ThumbError) -> ThumbResult<()> {
        self.aborted = true;
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_sink_forwards_in_order() {
        let mut out = Vec::new();
        {
            let mut sink = WriterSink::new("vec", &mut out);
            sink.write(Bytes::from_static(b"hello ")).await.unwrap();
            sink.write(Bytes::from_static(b"world")).await.unwrap();
            sink.close().await.unwrap();
            assert!(sink.write(Bytes::from_static(b"!")).await.is_err());
        }
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn buffer_sink_enforces_limit() {
        let mut sink = BufferSink::new().with_limit(4);
        sink.write(Bytes::from_static(b"abc")).await.unwrap();
        let err = sink.write(Bytes::from_static(b"de")).await.unwrap_err();
        assert!(matches!(err, ThumbError::InputTooLarge { max: 4 }));
        assert_eq!(sink.take(), Bytes::from_static(b"abc"));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn buffer_sink_refuses_writes_after_abort() {
        let mut sink = BufferSink::with_capacity(8);
        sink.write(Bytes::from_static(b"abc")).await.unwrap();
        sink.abort(&ThumbError::upload("boom")).await.unwrap();
        assert!(sink.is_empty());
        assert!(sink.write(Bytes::from_static(b"x")).await.unwrap_err().is_cancellation());
    }
}
