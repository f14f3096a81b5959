use thumb_blob::ObjectLocation;
use uuid::Uuid;

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Object keys for one request: `<id><ext>` and `<id>_thumbnail.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNames {
    pub id: Uuid,
    pub fullsize_key: String,
    pub thumbnail_key: String,
    /// Content type of the uploaded original, if the caller sent one
    pub content_type: Option<String>,
}

impl ObjectNames {
    pub fn generate(content_type: Option<&str>) -> Self {
        Self::with_id(Uuid::new_v4(), content_type)
    }

    pub fn with_id(id: Uuid, content_type: Option<&str>) -> Self {
        let content_type = content_type.map(str::trim).filter(|c| !c.is_empty());
        Self {
            id,
            fullsize_key: format!("{id}{}", extension_for(content_type)),
            thumbnail_key: format!("{id}_thumbnail.jpg"),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn fullsize_url(&self, bucket: Option<&str>, public_endpoint: Option<&str>) -> String {
        ObjectLocation::new(bucket.map(str::to_string), &self.fullsize_key).public_url(public_endpoint)
    }

    pub fn thumbnail_url(&self, bucket: Option<&str>, public_endpoint: Option<&str>) -> String {
        ObjectLocation::new(bucket.map(str::to_string), &self.thumbnail_key).public_url(public_endpoint)
    }
}

/// `image/png` → `.png`; parameters are dropped, no subtype means no extension.
fn extension_for(content_type: Option<&str>) -> String {
    let Some(content_type) = content_type else {
        return String::new();
    };
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.rsplit_once('/') {
        Some((_, subtype)) if !subtype.is_empty() => format!(".{}", subtype.to_ascii_lowercase()),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::parse_str("6f1c2a9e-8d3b-4c1e-9a57-0b2d4e6f8a10").unwrap()
    }

    #[test]
    fn extension_follows_content_subtype() {
        let names = ObjectNames::with_id(id(), Some("image/png"));
        assert_eq!(names.fullsize_key, "6f1c2a9e-8d3b-4c1e-9a57-0b2d4e6f8a10.png");
        assert_eq!(names.thumbnail_key, "6f1c2a9e-8d3b-4c1e-9a57-0b2d4e6f8a10_thumbnail.jpg");

        let names = ObjectNames::with_id(id(), Some("image/JPEG; q=0.9"));
        assert!(names.fullsize_key.ends_with(".jpeg"));
    }

    #[test]
    fn missing_or_malformed_content_type_has_no_extension() {
        for content_type in [None, Some(""), Some("png"), Some("image/")] {
            let names = ObjectNames::with_id(id(), content_type);
            assert_eq!(names.fullsize_key, id().to_string(), "{content_type:?}");
        }
    }

    #[test]
    fn urls_use_public_endpoint_when_configured() {
        let names = ObjectNames::with_id(id(), Some("image/gif"));
        assert_eq!(names.thumbnail_url(Some("images"), None), names.thumbnail_key);
        assert_eq!(
            names.fullsize_url(Some("images"), Some("http://localhost:9000/")),
            format!("http://localhost:9000/images/{}", names.fullsize_key)
        );
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ObjectNames::generate(None).id, ObjectNames::generate(None).id);
    }
}
