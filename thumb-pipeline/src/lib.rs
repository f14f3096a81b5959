//! thumb-pipeline: end-to-end thumbnail flows.
//!
//! * [`Pipeline::stream`] - request body teed into the filter and a
//!   full-size upload, filter output teed into a thumbnail upload and the
//!   response.
//! * [`Pipeline::buffered`] - spool to a temporary file, convert, respond,
//!   then upload both objects.
//! * [`FanOut`] - input through the filter into N outputs (console).
//!
//! Every mode either commits all of its objects or none: finalize calls are
//! issued only after every byte of every object is stored, full-size first,
//! thumbnail second, response last, and a later failure deletes objects that
//! already committed.

mod buffered;
mod fanout;
mod naming;
mod outcome;
mod pipeline;
mod settings;
mod streaming;

pub use fanout::{FanOut, FanOutput};
pub use naming::{ObjectNames, THUMBNAIL_CONTENT_TYPE};
pub use outcome::PipelineOutcome;
pub use pipeline::Pipeline;
pub use settings::{PipelineSettings, DEFAULT_MAX_BUFFERED_INPUT};
