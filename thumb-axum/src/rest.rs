//! `POST /`, `POST /stream` and `POST /file`.
//!
//! The thumbnail is streamed back while the pipeline still runs, so the
//! status line cannot wait for the final outcome. The handler holds back the
//! first `response_buffer_bytes` of output: a request that finishes inside
//! that window gets its real status (and a JSON error on failure); a longer
//! one is committed as `200` and a later failure breaks the body off with an
//! error instead of ending it.

use std::io;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt, TryStreamExt};
use thumb_core::{pipe, ByteStream, PipeSink, ThumbError};
use thumb_pipeline::{ObjectNames, PipelineOutcome, THUMBNAIL_CONTENT_TYPE};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;

use crate::{ThumbAxumError, ThumbAxumState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Stream,
    File,
}

impl Mode {
    fn from_option(option: Option<&str>) -> Result<Self, ThumbError> {
        match option {
            None | Some("stream") => Ok(Self::Stream),
            Some("file") => Ok(Self::File),
            Some(_) => Err(ThumbError::input("Invalid route")),
        }
    }
}

pub async fn generate_default(
    State(state): State<ThumbAxumState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ThumbAxumError> {
    handle(state, Mode::Stream, headers, body).await
}

pub async fn generate(
    State(state): State<ThumbAxumState>,
    Path(option): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ThumbAxumError> {
    let mode = Mode::from_option(Some(option.as_str()))?;
    handle(state, mode, headers, body).await
}

async fn handle(
    state: ThumbAxumState,
    mode: Mode,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ThumbAxumError> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let names = state.pipeline.names(content_type);
    let fullsize_url = state.pipeline.fullsize_url(&names);
    let thumbnail_url = state.pipeline.thumbnail_url(&names);
    tracing::info!(?mode, fullsize = %names.fullsize_key, "thumbnail request");

    let (response_sink, mut response_stream) = pipe("response", state.settings.response_chunks);
    let task = spawn_pipeline(state.clone(), mode, body, names, response_sink);

    let mut held = BytesMut::new();
    let ended_cleanly = loop {
        match response_stream.next().await {
            Some(Ok(chunk)) => {
                held.extend_from_slice(&chunk);
                if held.len() >= state.settings.response_buffer_bytes {
                    // Too big to wait for: commit to success and stream the rest.
                    let head = stream::once(async move { Ok::<Bytes, io::Error>(held.freeze()) });
                    let body = Body::from_stream(head.chain(response_stream));
                    return Ok(thumbnail_response(body, &fullsize_url, &thumbnail_url));
                }
            }
            Some(Err(_)) => break false,
            None => break true,
        }
    };

    let outcome = match task.await {
        Ok(result) => result?,
        Err(join) => return Err(ThumbError::cancelled(format!("pipeline task failed: {join}")).into()),
    };
    if !ended_cleanly {
        return Err(ThumbError::cancelled("response ended with an error").into());
    }

    tracing::debug!(
        fullsize_parts = outcome.fullsize.parts.len(),
        thumbnail_parts = outcome.thumbnail.parts.len(),
        "thumbnail request completed within response window"
    );
    Ok(thumbnail_response(Body::from(held.freeze()), &fullsize_url, &thumbnail_url))
}

/// Run the pipeline detached from the handler; it keeps going after the
/// status line is sent and stops on its own if the client goes away.
fn spawn_pipeline(
    state: ThumbAxumState,
    mode: Mode,
    body: Body,
    names: ObjectNames,
    response: PipeSink,
) -> JoinHandle<Result<PipelineOutcome, ThumbError>> {
    let chunks: ByteStream = Box::pin(body.into_data_stream().map_err(io::Error::other));
    let input = StreamReader::new(chunks);
    tokio::spawn(async move {
        let result = match mode {
            Mode::Stream => state.pipeline.stream(input, Box::new(response), &names).await,
            Mode::File => state.pipeline.buffered(input, Box::new(response), &names).await,
        };
        if let Err(err) = &result {
            tracing::warn!(error = %err, fullsize = %names.fullsize_key, "pipeline failed");
        }
        result
    })
}

fn thumbnail_response(body: Body, fullsize_url: &str, thumbnail_url: &str) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(THUMBNAIL_CONTENT_TYPE));
    headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
    for (name, value) in [("x-fullsize", fullsize_url), ("x-thumbnail", thumbnail_url)] {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(err) => tracing::warn!(header = name, error = %err, "location is not a valid header value"),
        }
    }
    response
}
