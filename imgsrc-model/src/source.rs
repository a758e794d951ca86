use std::collections::BTreeMap;

/// Request headers attached to a source, ordered so equal maps compare and
/// serialize identically.
pub type Headers = BTreeMap<String, String>;

/// Canonical, post-resolution description of an image to load.
///
/// Produced by the resolver and treated as immutable afterwards. Two sources
/// are "the same request" when they compare equal field by field.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageSource {
    pub uri: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub width: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub height: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub headers: Option<Headers>,
}

impl ImageSource {
    /// The canonical empty source (`uri == ""`).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn has_uri(&self) -> bool {
        !self.uri.is_empty()
    }

    /// True when loading this source needs custom request headers.
    pub fn has_headers(&self) -> bool {
        self.headers.is_some()
    }

    /// Shallow merge of a loader result over this source. Fields reported by
    /// the loader win; headers are carried over untouched.
    pub fn merged_with(&self, result: &ImageResult) -> Self {
        Self {
            uri: result.uri.clone(),
            width: Some(f64::from(result.width)),
            height: Some(f64::from(result.height)),
            headers: self.headers.clone(),
        }
    }
}

/// What the loader reports once an image finished loading.
///
/// `uri` is the handle's final load target, which is a local object URL when
/// the image was fetched with custom headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageResult {
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_loader_fields_and_keeps_headers() {
        let mut headers = Headers::new();
        headers.insert("authorization".into(), "Bearer abc".into());
        let source = ImageSource::from_uri("https://cdn.test/a.png")
            .with_size(10.0, 20.0)
            .with_headers(headers.clone());

        let merged = source.merged_with(&ImageResult {
            uri: "blob:imgsrc/1".into(),
            width: 64,
            height: 32,
        });

        assert_eq!(merged.uri, "blob:imgsrc/1");
        assert_eq!(merged.width, Some(64.0));
        assert_eq!(merged.height, Some(32.0));
        assert_eq!(merged.headers, Some(headers));
    }

    #[test]
    fn empty_headers_still_count_as_headers() {
        let source =
            ImageSource::from_uri("https://cdn.test/a.png").with_headers(
                Headers::new(),
            );
        assert!(source.has_headers());
        assert!(!ImageSource::empty().has_uri());
    }
}
