//! Bounded-buffering mode: spool, convert, respond, then upload.
//!
//! Simpler than streaming and easier on a slow filter, at the cost of a
//! temporary file per request and a response that starts only after the
//! conversion finished.

use std::io::SeekFrom;

use bytes::Bytes;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use thumb_blob::MultipartUploadSink;
use thumb_core::{BufferSink, ByteSink, ThumbError, ThumbResult};

use crate::naming::THUMBNAIL_CONTENT_TYPE;
use crate::outcome::{abort_quietly, discard_committed, input_read_error};
use crate::{ObjectNames, Pipeline, PipelineOutcome};

const SPOOL_CHUNK_BYTES: usize = 64 * 1024;

impl Pipeline {
    /// Convert `input` through a temporary file.
    ///
    /// The thumbnail is written to `response` once converted, but `response`
    /// is only closed after both objects committed.
    #[instrument(skip_all, fields(fullsize = %names.fullsize_key, thumbnail = %names.thumbnail_key))]
    pub async fn buffered<R>(
        &self,
        input: R,
        mut response: Box<dyn ByteSink>,
        names: &ObjectNames,
    ) -> ThumbResult<PipelineOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut fullsize = self.upload_sink(&names.fullsize_key, names.content_type.clone())?;
        let mut thumbnail = self.upload_sink(&names.thumbnail_key, Some(THUMBNAIL_CONTENT_TYPE.to_string()))?;
        let fullsize_handle = fullsize.handle();
        let thumbnail_handle = thumbnail.handle();

        let input_bytes = match self
            .convert_and_upload(input, &mut fullsize, &mut thumbnail, response.as_mut())
            .await
        {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "thumbnail request failed");
                abort_quietly(&mut fullsize, &err).await;
                abort_quietly(&mut thumbnail, &err).await;
                abort_quietly(response.as_mut(), &err).await;
                return Err(err);
            }
        };

        if let Err(err) = fullsize.close().await {
            abort_quietly(&mut thumbnail, &err).await;
            abort_quietly(response.as_mut(), &err).await;
            return Err(err);
        }
        if let Err(err) = thumbnail.close().await {
            discard_committed(&[&fullsize_handle]).await;
            abort_quietly(response.as_mut(), &err).await;
            return Err(err);
        }
        if let Err(err) = response.close().await {
            discard_committed(&[&fullsize_handle, &thumbnail_handle]).await;
            return Err(err);
        }

        tracing::info!(input_bytes, "thumbnail request committed");
        Ok(PipelineOutcome {
            input_bytes,
            fullsize: fullsize_handle.snapshot(),
            thumbnail: thumbnail_handle.snapshot(),
        })
    }

    /// Everything up to (not including) the finalize calls.
    async fn convert_and_upload<R>(
        &self,
        input: R,
        fullsize: &mut MultipartUploadSink,
        thumbnail: &mut MultipartUploadSink,
        response: &mut dyn ByteSink,
    ) -> ThumbResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut spool = File::from_std(tempfile::tempfile()?);
        let input_bytes = spool_input(input, &mut spool, self.settings.max_buffered_input).await?;
        tracing::debug!(input_bytes, "input spooled");

        spool.seek(SeekFrom::Start(0)).await?;
        let mut converted = BufferSink::new().with_limit(self.settings.max_buffered_input as usize);
        self.filter.run(&mut spool, &mut converted, self.settings.bounds).await?;
        let jpeg = converted.take();
        tracing::debug!(thumbnail_bytes = jpeg.len(), "thumbnail converted");

        if !jpeg.is_empty() {
            response.write(jpeg.clone()).await?;
        }

        spool.seek(SeekFrom::Start(0)).await?;
        tokio::try_join!(
            upload_spool(&mut spool, fullsize),
            upload_bytes(jpeg, thumbnail),
        )?;
        Ok(input_bytes)
    }
}

/// Copy `input` into `spool`, refusing more than `max` bytes.
async fn spool_input<R>(input: R, spool: &mut File, max: u64) -> ThumbResult<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut chunks = ReaderStream::with_capacity(input, SPOOL_CHUNK_BYTES);
    let mut total = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(input_read_error)?;
        total += chunk.len() as u64;
        if total > max {
            return Err(ThumbError::InputTooLarge { max });
        }
        spool.write_all(&chunk).await?;
    }
    spool.flush().await?;
    Ok(total)
}

async fn upload_spool(spool: &mut File, sink: &mut MultipartUploadSink) -> ThumbResult<()> {
    let mut chunks = ReaderStream::with_capacity(spool, SPOOL_CHUNK_BYTES);
    while let Some(chunk) = chunks.next().await {
        sink.write(chunk?).await?;
    }
    sink.flush().await
}

async fn upload_bytes(bytes: Bytes, sink: &mut MultipartUploadSink) -> ThumbResult<()> {
    if !bytes.is_empty() {
        sink.write(bytes).await?;
    }
    sink.flush().await
}
