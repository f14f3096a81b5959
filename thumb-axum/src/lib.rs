//! thumb-axum: HTTP boundary for the thumbnail pipeline.
//!
//! Routes `POST /`, `POST /stream` (direct streaming) and `POST /file`
//! (buffered) to a shared [`thumb_pipeline::Pipeline`], with request tracing
//! and `x-request-id` propagation.

pub mod app;
mod error;
pub mod rest;
pub mod state;

pub use app::{axum, AxumApp};
pub use error::ThumbAxumError;
pub use state::{ServerSettings, ThumbAxumState, DEFAULT_RESPONSE_BUFFER_BYTES};
