//! thumb-core: streaming primitives for thumbnail generation.
//!
//! Everything here is storage- and transport-agnostic: byte sinks, the tee
//! that fans one stream out to several of them, a bounded in-process pipe,
//! and the driver for the external resize filter.

pub mod config;
pub mod errors;
pub mod file_sink;
pub mod filter;
pub mod pipe;
pub mod sink;
pub mod tee;

pub use config::{ThumbConfig, ThumbConfigSnapshot, ENV_PREFIX};
pub use errors::{root_cause, BoxError, ErrorKind, ThumbError, ThumbResult};
pub use file_sink::FileSink;
pub use filter::{ResizeBounds, ResizeFilter};
pub use pipe::{pipe, PipeReader, PipeSink, PipeStream, StreamAborted};
pub use sink::{BufferSink, ByteSink, ByteStream, WriterSink};
pub use tee::{TeeBranch, TeeSink, DEFAULT_PASS_THROUGH_CAPACITY};
