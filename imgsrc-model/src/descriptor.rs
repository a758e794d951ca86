use crate::asset::AssetId;
use crate::source::Headers;

/// Caller-supplied, pre-resolution description of an image.
///
/// With the `serde` feature this deserializes untagged, so JSON numbers,
/// strings, arrays and objects map onto the matching variant. Anything else
/// (`null`, booleans, fractional or negative numbers) becomes `None`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SourceDescriptor {
    /// Packaged asset, looked up in the asset registry.
    Asset(AssetId),
    /// Plain URI.
    Uri(String),
    /// Multiple sources; only the first one is honoured.
    Many(Vec<SourceDescriptor>),
    /// Structured source with optional size and request headers.
    Object(SourceObject),
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceObject {
    #[cfg_attr(feature = "serde", serde(default))]
    pub uri: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub width: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub height: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub headers: Option<Headers>,
}

impl From<AssetId> for SourceDescriptor {
    fn from(id: AssetId) -> Self {
        SourceDescriptor::Asset(id)
    }
}

impl From<&str> for SourceDescriptor {
    fn from(uri: &str) -> Self {
        SourceDescriptor::Uri(uri.to_string())
    }
}

impl From<String> for SourceDescriptor {
    fn from(uri: String) -> Self {
        SourceDescriptor::Uri(uri)
    }
}

impl From<SourceObject> for SourceDescriptor {
    fn from(object: SourceObject) -> Self {
        SourceDescriptor::Object(object)
    }
}

impl<T: Into<SourceDescriptor>> From<Option<T>> for SourceDescriptor {
    fn from(value: Option<T>) -> Self {
        value.map_or(SourceDescriptor::None, Into::into)
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawDescriptor {
    Asset(AssetId),
    Uri(String),
    Many(Vec<SourceDescriptor>),
    Object(SourceObject),
    Other(serde::de::IgnoredAny),
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SourceDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match RawDescriptor::deserialize(deserializer)? {
            RawDescriptor::Asset(id) => SourceDescriptor::Asset(id),
            RawDescriptor::Uri(uri) => SourceDescriptor::Uri(uri),
            RawDescriptor::Many(items) => SourceDescriptor::Many(items),
            RawDescriptor::Object(object) => SourceDescriptor::Object(object),
            RawDescriptor::Other(_) => SourceDescriptor::None,
        })
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn deserializes_every_descriptor_shape() {
        let parsed: Vec<SourceDescriptor> = serde_json::from_str(
            r#"[42, "https://x/y.png", null, ["a.png", "b.png"],
                {"uri": "https://x/z.png", "headers": {"x-token": "t"}}]"#,
        )
        .unwrap();

        assert_eq!(parsed[0], SourceDescriptor::Asset(42));
        assert_eq!(parsed[1], SourceDescriptor::Uri("https://x/y.png".into()));
        assert_eq!(parsed[2], SourceDescriptor::None);
        assert!(matches!(&parsed[3], SourceDescriptor::Many(items) if items.len() == 2));
        match &parsed[4] {
            SourceDescriptor::Object(object) => {
                assert_eq!(object.uri.as_deref(), Some("https://x/z.png"));
                assert_eq!(object.width, None);
                assert_eq!(
                    object.headers.as_ref().and_then(|h| h.get("x-token")),
                    Some(&"t".to_string())
                );
            }
            other => panic!("expected object descriptor, got {other:?}"),
        }
    }

    #[test]
    fn unrecognised_shapes_become_none() {
        let parsed: Vec<SourceDescriptor> =
            serde_json::from_str(r#"[true, 42.5, -1, {"uri": 5}]"#).unwrap();
        assert!(parsed.iter().all(|d| *d == SourceDescriptor::None));

        // Nested lists fall back per element.
        let nested: SourceDescriptor =
            serde_json::from_str(r#"[false, "a.png"]"#).unwrap();
        assert_eq!(
            nested,
            SourceDescriptor::Many(vec![
                SourceDescriptor::None,
                SourceDescriptor::Uri("a.png".into()),
            ])
        );
    }
}
