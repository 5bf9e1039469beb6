//! Upstream response model.

use serde::Deserialize;

use crate::upstream::UpstreamError;

/// One record returned by the image search endpoint.
///
/// Only `url` is required; the remaining fields default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamItem {
    #[serde(default)]
    pub id: String,

    /// Category tags.
    #[serde(default)]
    pub breeds: Vec<String>,

    pub url: String,

    #[serde(default)]
    pub width: u64,

    #[serde(default)]
    pub height: u64,
}

impl UpstreamItem {
    /// Decode the first element of a JSON array body.
    ///
    /// An empty array or an item with an empty URL is an error rather than
    /// a default value.
    pub fn first_from_json(body: &[u8]) -> Result<Self, UpstreamError> {
        let items: Vec<UpstreamItem> = serde_json::from_slice(body)?;
        let item = items.into_iter().next().ok_or(UpstreamError::Empty)?;
        if item.url.is_empty() {
            return Err(UpstreamError::MissingUrl);
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_item() {
        let body = br#"[
            {"id":"abc","url":"http://x/1.jpg","breeds":[],"width":100,"height":100},
            {"id":"def","url":"http://x/2.jpg","breeds":[],"width":50,"height":60}
        ]"#;

        let item = UpstreamItem::first_from_json(body).unwrap();
        assert_eq!(item.id, "abc");
        assert_eq!(item.url, "http://x/1.jpg");
        assert_eq!((item.width, item.height), (100, 100));
        assert!(item.breeds.is_empty());
    }

    #[test]
    fn test_missing_optional_fields() {
        let item = UpstreamItem::first_from_json(br#"[{"url":"http://x/3.png"}]"#).unwrap();
        assert_eq!(item.url, "http://x/3.png");
        assert_eq!(item.id, "");
        assert_eq!(item.width, 0);
    }

    #[test]
    fn test_empty_array() {
        let err = UpstreamItem::first_from_json(b"[]").unwrap_err();
        assert!(matches!(err, UpstreamError::Empty));
    }

    #[test]
    fn test_malformed_json() {
        let err = UpstreamItem::first_from_json(b"{not json").unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));

        let err = UpstreamItem::first_from_json(br#"{"url":"http://x/1.jpg"}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[test]
    fn test_empty_url() {
        let err = UpstreamItem::first_from_json(br#"[{"id":"a","url":""}]"#).unwrap_err();
        assert!(matches!(err, UpstreamError::MissingUrl));
    }
}
