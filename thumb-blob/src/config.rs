use thumb_core::ThumbConfigSnapshot;

use crate::{BlobError, BlobResult, StoreCapabilities};

/// 5 MiB, the smallest part S3 accepts for anything but the last part.
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_ACL: &str = "public-read";

/// Rules for part-based uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRules {
    /// Size of every part except the last (bytes)
    pub part_size: usize,

    /// Canned ACL applied to every created object
    pub acl: String,
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            acl: DEFAULT_ACL.to_string(),
        }
    }
}

impl UploadRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `upload.part_size` and `upload.acl`.
    pub fn from_config(config: &ThumbConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            part_size: config.get_usize("upload.part_size").unwrap_or(defaults.part_size),
            acl: config.get_string("upload.acl").unwrap_or(defaults.acl),
        }
    }

    /// Set part size
    pub fn with_part_size(mut self, bytes: usize) -> Self {
        self.part_size = bytes;
        self
    }

    pub fn with_acl<S: Into<String>>(mut self, acl: S) -> Self {
        self.acl = acl.into();
        self
    }

    /// Check the rules against what a store accepts.
    pub fn validate(&self, capabilities: &StoreCapabilities) -> BlobResult<()> {
        if self.part_size == 0 {
            return Err(BlobError::invalid("part size must be greater than zero"));
        }
        if let Some(min) = capabilities.min_part_size {
            if (self.part_size as u64) < min {
                return Err(BlobError::invalid(format!(
                    "part size {} is below the store minimum of {min} bytes",
                    self.part_size
                )));
            }
        }
        if let Some(max) = capabilities.max_part_size {
            if self.part_size as u64 > max {
                return Err(BlobError::invalid(format!(
                    "part size {} exceeds the store maximum of {max} bytes",
                    self.part_size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thumb_core::ThumbConfig;

    #[test]
    fn defaults_match_s3_minimums() {
        let rules = UploadRules::default();
        assert_eq!(rules.part_size, 5 * 1024 * 1024);
        assert_eq!(rules.acl, "public-read");
        assert!(rules.validate(&StoreCapabilities::s3()).is_ok());
    }

    #[test]
    fn small_parts_are_rejected_by_s3_rules() {
        let mut config = ThumbConfig::new();
        config.set("upload.part_size", "1024");
        config.set("upload.acl", "private");

        let rules = UploadRules::from_config(&config.snapshot());
        assert_eq!(rules.acl, "private");
        assert!(matches!(
            rules.validate(&StoreCapabilities::s3()),
            Err(BlobError::Invalid { .. })
        ));
        assert!(rules.validate(&StoreCapabilities::default()).is_ok());
        assert!(UploadRules::new().with_part_size(0).validate(&StoreCapabilities::default()).is_err());
    }
}
