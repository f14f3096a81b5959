use serde::{Deserialize, Serialize};

/// Identifier of a multipart upload, as issued by the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID (in-process stores)
    pub fn new() -> Self {
        Self(format!("upl_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ETag returned for an uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartETag {
    pub part_number: u32,
    pub etag: String,
}

/// Part as listed in the finalize call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
    pub size_bytes: u64,
}

/// Where a committed object lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: Option<String>,
    pub key: String,
}

impl ObjectLocation {
    pub fn new<S: Into<String>>(bucket: Option<String>, key: S) -> Self {
        Self {
            bucket,
            key: key.into(),
        }
    }

    /// `<endpoint>/<bucket>/<key>` when a public endpoint is known, else the bare key.
    pub fn public_url(&self, endpoint: Option<&str>) -> String {
        match (endpoint, self.bucket.as_deref()) {
            (Some(endpoint), Some(bucket)) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, self.key)
            }
            (Some(endpoint), None) => format!("{}/{}", endpoint.trim_end_matches('/'), self.key),
            (None, _) => self.key.clone(),
        }
    }
}

/// Per-object options passed to `create_multipart`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub acl: Option<String>,
    pub content_type: Option<String>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_acl<S: Into<String>>(mut self, acl: S) -> Self {
        self.acl = Some(acl.into());
        self
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Lifecycle of one multipart upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Committing,
    Committed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Point-in-time view of a multipart upload session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub key: String,
    pub upload_id: Option<UploadId>,
    pub state: SessionState,
    /// Committed parts, ascending and contiguous from 1
    pub parts: Vec<CompletedPart>,
    pub bytes_written: u64,
    /// Largest number of bytes held in memory at once (open buffer plus part in flight)
    pub peak_buffered: usize,
    pub location: Option<ObjectLocation>,
}

impl UploadSession {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self {
            key: key.into(),
            upload_id: None,
            state: SessionState::Open,
            parts: Vec::new(),
            bytes_written: 0,
            peak_buffered: 0,
            location: None,
        }
    }

    pub fn part_sizes(&self) -> Vec<u64> {
        self.parts.iter().map(|p| p.size_bytes).collect()
    }
}
