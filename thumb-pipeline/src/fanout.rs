use tokio::io::AsyncRead;
use tracing::instrument;

use thumb_blob::{MultipartUploadSink, SessionHandle};
use thumb_core::{ByteSink, ResizeBounds, ResizeFilter, TeeSink, ThumbConfigSnapshot, ThumbError, ThumbResult};

use crate::outcome::discard_committed;

/// One destination of a fan-out conversion.
pub struct FanOutput {
    sink: Box<dyn ByteSink>,
    session: Option<SessionHandle>,
}

impl FanOutput {
    pub fn sink<S: ByteSink + 'static>(sink: S) -> Self {
        Self {
            sink: Box::new(sink),
            session: None,
        }
    }

    /// Object-store output; rolled back if a later output fails to commit.
    pub fn upload(sink: MultipartUploadSink) -> Self {
        Self {
            session: Some(sink.handle()),
            sink: Box::new(sink),
        }
    }

    pub fn name(&self) -> &str {
        self.sink.name()
    }
}

/// Input → filter → N outputs, for the console entry point.
#[derive(Debug, Clone)]
pub struct FanOut {
    filter: ResizeFilter,
    bounds: ResizeBounds,
}

impl FanOut {
    pub fn new(filter: ResizeFilter, bounds: ResizeBounds) -> Self {
        Self { filter, bounds }
    }

    pub fn from_config(config: &ThumbConfigSnapshot) -> Self {
        Self::new(ResizeFilter::from_config(config), ResizeBounds::from_config(config))
    }

    /// Convert `input` into every output; returns the thumbnail size.
    #[instrument(skip_all, fields(outputs = outputs.len()))]
    pub async fn run<R>(&self, input: R, outputs: Vec<FanOutput>) -> ThumbResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut sessions = Vec::new();
        let mut sinks = Vec::with_capacity(outputs.len());
        for output in outputs {
            sessions.extend(output.session);
            sinks.push(output.sink);
        }
        if sinks.is_empty() {
            return Err(ThumbError::config("at least one output is required"));
        }
        let mut tee = TeeSink::from_sinks("outputs", sinks)?;

        let converted = self.filter.run(input, &mut tee, self.bounds).await;
        if let Err(err) = converted {
            tee.abort(&err).await?;
            return Err(err);
        }

        tee.flush().await?;
        if let Err(err) = tee.close().await {
            let handles: Vec<&SessionHandle> = sessions.iter().collect();
            discard_committed(&handles).await;
            return Err(err);
        }

        tracing::info!(bytes = tee.bytes_written(), "thumbnail written to every output");
        Ok(tee.bytes_written())
    }
}
