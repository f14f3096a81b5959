//! # Errors
//!
//! Every failure inside a thumbnail request falls into one of a few categories.
//! Each category carries a Feathers-style [`ErrorKind`] so the transport layer
//! can pick a status code without knowing anything about pipelines:
//! - caller faults (bad input) map to 4xx
//! - launch, conversion, upload and local I/O failures map to 5xx
//!
//! Cancellation errors are secondary by nature: they describe a leg that was
//! stopped because something else failed. [`root_cause`] picks the real failure
//! out of a set of leg results.

use std::io;

use serde_json::json;
use thiserror::Error;

/// Boxed error used as a `source` for lower-level causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pipeline operations
pub type ThumbResult<T> = Result<T, ThumbError>;

/// Feathers-ish class names + status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,      // 400
    PayloadTooLarge, // 413
    GeneralError,    // 500
    BadGateway,      // 502
    Unavailable,     // 503
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::GeneralError => 500,
            ErrorKind::BadGateway => 502,
            ErrorKind::Unavailable => 503,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::BadGateway => "BadGateway",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::PayloadTooLarge => "payload-too-large",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::BadGateway => "bad-gateway",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    /// True for the 4xx family.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Errors that can occur while generating and storing a thumbnail
#[derive(Error, Debug)]
pub enum ThumbError {
    /// Malformed or inaccessible source
    #[error("{message}")]
    Input {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Input exceeds the maximum of {max} bytes")]
    InputTooLarge { max: u64 },

    /// Resize executable missing or unstartable
    #[error("Unable to start \"{program}\": {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Filter exited non-zero; message is its diagnostic output verbatim
    #[error("{message}")]
    Conversion {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Upload failed: {reason}")]
    Upload {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Stopped because the caller went away or a sibling leg failed
    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ThumbError {
    /// Create an input error
    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::Input {
            message: message.into(),
            source: None,
        }
    }

    /// Create an input error with the underlying cause attached
    pub fn input_with<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Input {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn conversion<S: Into<String>>(message: S, exit_code: Option<i32>) -> Self {
        Self::Conversion {
            message: message.into(),
            exit_code,
        }
    }

    /// Create an upload error
    pub fn upload<S: Into<String>>(reason: S) -> Self {
        Self::Upload {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an upload error from a storage backend failure
    pub fn upload_with<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upload {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn cancelled<S: Into<String>>(reason: S) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Cancellation caused by another failure.
    pub fn cancelled_by(cause: &ThumbError) -> Self {
        match cause {
            Self::Cancelled { reason } => Self::cancelled(reason.clone()),
            other => Self::cancelled(other.to_string()),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input { .. } => ErrorKind::BadRequest,
            Self::InputTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::Launch { .. } | Self::Conversion { .. } | Self::Config { .. } | Self::Io { .. } => {
                ErrorKind::GeneralError
            }
            Self::Upload { .. } => ErrorKind::BadGateway,
            Self::Cancelled { .. } => ErrorKind::Unavailable,
        }
    }

    pub fn code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Message safe to hand back to the caller: no source chain.
    pub fn client_message(&self) -> String {
        self.to_string()
    }

    /// Feathers-ish JSON payload.
    pub fn to_json(&self) -> serde_json::Value {
        let kind = self.kind();
        json!({
            "name": kind.name(),
            "message": self.client_message(),
            "code": kind.status_code(),
            "className": kind.class_name(),
        })
    }

}

/// Pick the error that describes what actually went wrong.
///
/// The first non-cancellation error wins; if every leg was cancelled the first
/// cancellation is returned. Everything else is logged as secondary.
pub fn root_cause<I>(errors: I) -> Option<ThumbError>
where
    I: IntoIterator<Item = ThumbError>,
{
    let mut errors: Vec<ThumbError> = errors.into_iter().collect();
    if errors.is_empty() {
        return None;
    }

    let index = errors
        .iter()
        .position(|e| !e.is_cancellation())
        .unwrap_or(0);
    let root = errors.remove(index);

    for secondary in &errors {
        tracing::debug!(root = %root, secondary = %secondary, "suppressed secondary failure");
    }

    Some(root)
}
