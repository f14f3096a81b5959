//! Direct-streaming mode.
//!
//! ```text
//! input ─▶ Tee{pass-through, full-size upload}
//!                 │
//!                 ▼
//!              filter ─▶ Tee{thumbnail upload, response}
//! ```
//!
//! Nothing is spooled: the request body, the filter and both uploads move
//! together, each held back by the slowest consumer.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use thumb_core::{root_cause, ByteSink, TeeBranch, TeeSink, ThumbError, ThumbResult};

use crate::naming::THUMBNAIL_CONTENT_TYPE;
use crate::outcome::{abort_quietly, discard_committed, input_read_error};
use crate::{ObjectNames, Pipeline, PipelineOutcome};

const INPUT_CHUNK_BYTES: usize = 64 * 1024;

impl Pipeline {
    /// Convert `input`, streaming the thumbnail to `response` while both
    /// objects upload.
    ///
    /// On success every object is committed and `response` is closed. On
    /// failure nothing stays committed and `response` is aborted.
    #[instrument(skip_all, fields(fullsize = %names.fullsize_key, thumbnail = %names.thumbnail_key))]
    pub async fn stream<R>(
        &self,
        input: R,
        response: Box<dyn ByteSink>,
        names: &ObjectNames,
    ) -> ThumbResult<PipelineOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let fullsize = self.upload_sink(&names.fullsize_key, names.content_type.clone())?;
        let thumbnail = self.upload_sink(&names.thumbnail_key, Some(THUMBNAIL_CONTENT_TYPE.to_string()))?;
        let fullsize_handle = fullsize.handle();
        let thumbnail_handle = thumbnail.handle();

        let (mut input_tee, reader) = TeeSink::new(
            "input",
            vec![TeeBranch::PassThrough, TeeBranch::sink(fullsize)],
            self.settings.pass_through_chunks,
        )?;
        let reader = reader.ok_or_else(|| ThumbError::config("input tee has no pass-through reader"))?;
        let (mut output_tee, _) = TeeSink::new(
            "output",
            vec![TeeBranch::sink(thumbnail), TeeBranch::Sink(response)],
            self.settings.pass_through_chunks,
        )?;

        let (fed, converted) = tokio::join!(
            feed(input, &mut input_tee),
            self.filter.run(reader, &mut output_tee, self.settings.bounds),
        );

        let input_bytes = match (fed, converted) {
            (Ok(bytes), Ok(())) => bytes,
            (fed, converted) => {
                let err = root_cause(converted.err().into_iter().chain(fed.err()))
                    .unwrap_or_else(|| ThumbError::cancelled("conversion did not complete"));
                tracing::warn!(error = %err, "thumbnail request failed");
                abort_quietly(&mut input_tee, &err).await;
                abort_quietly(&mut output_tee, &err).await;
                return Err(err);
            }
        };

        // Every byte of both objects is stored before anything is finalized.
        let (flushed_input, flushed_output) = tokio::join!(input_tee.flush(), output_tee.flush());
        if let Some(err) = root_cause(flushed_input.err().into_iter().chain(flushed_output.err())) {
            abort_quietly(&mut input_tee, &err).await;
            abort_quietly(&mut output_tee, &err).await;
            return Err(err);
        }

        if let Err(err) = input_tee.close().await {
            abort_quietly(&mut output_tee, &err).await;
            return Err(err);
        }
        if let Err(err) = output_tee.close().await {
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
}

/// Pump `input` into the input tee, then end the pass-through branch.
async fn feed<R>(input: R, tee: &mut TeeSink) -> ThumbResult<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut chunks = ReaderStream::with_capacity(input, INPUT_CHUNK_BYTES);
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => tee.write(chunk).await?,
            Err(err) => {
                let err = input_read_error(err);
                tee.abort(&err).await?;
                return Err(err);
            }
        }
    }
    tee.end_pass_through().await?;
    tracing::debug!(bytes = tee.bytes_written(), "input consumed");
    Ok(tee.bytes_written())
}
