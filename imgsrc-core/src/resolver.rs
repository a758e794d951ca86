//! Descriptor to [`ImageSource`] resolution.
//!
//! Resolution is pure and synchronous: the only inputs besides the
//! descriptor are the asset registry and the current device pixel ratio.

use crate::error::ResolveError;
use imgsrc_model::{AssetId, ImageSource, PackagerAsset, SourceDescriptor};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

static SVG_DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(data:image/svg\+xml;utf8,)(.*)$")
        .expect("static svg data uri pattern")
});

/// Lookup of packaged assets by numeric id.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait AssetRegistry: Send + Sync {
    fn lookup(&self, id: AssetId) -> Option<PackagerAsset>;
}

/// Source of the current device pixel ratio.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait PixelRatio: Send + Sync {
    fn current(&self) -> f64;
}

/// In-memory registry, filled at startup from the packager manifest.
#[derive(Debug, Default, Clone)]
pub struct StaticAssetRegistry {
    assets: HashMap<AssetId, PackagerAsset>,
}

impl StaticAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset and returns its id. Ids start at 1.
    pub fn register(&mut self, asset: PackagerAsset) -> AssetId {
        let id = self.assets.len() as AssetId + 1;
        self.assets.insert(id, asset);
        id
    }

    pub fn insert(&mut self, id: AssetId, asset: PackagerAsset) {
        self.assets.insert(id, asset);
    }
}

impl AssetRegistry for StaticAssetRegistry {
    fn lookup(&self, id: AssetId) -> Option<PackagerAsset> {
        self.assets.get(&id).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPixelRatio(pub f64);

impl Default for FixedPixelRatio {
    fn default() -> Self {
        Self(1.0)
    }
}

impl PixelRatio for FixedPixelRatio {
    fn current(&self) -> f64 {
        self.0
    }
}

/// Turns caller descriptors into canonical [`ImageSource`]s.
#[derive(Clone)]
pub struct SourceResolver {
    registry: Arc<dyn AssetRegistry>,
    pixel_ratio: Arc<dyn PixelRatio>,
}

impl fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceResolver")
            .field("pixel_ratio", &self.pixel_ratio.current())
            .finish_non_exhaustive()
    }
}

impl SourceResolver {
    pub fn new(
        registry: Arc<dyn AssetRegistry>,
        pixel_ratio: Arc<dyn PixelRatio>,
    ) -> Self {
        Self {
            registry,
            pixel_ratio,
        }
    }

    /// Resolver with an empty registry and a pixel ratio of 1. Numeric
    /// descriptors always fail with it.
    pub fn uris_only() -> Self {
        Self::new(
            Arc::new(StaticAssetRegistry::new()),
            Arc::new(FixedPixelRatio::default()),
        )
    }

    pub fn resolve(
        &self,
        descriptor: &SourceDescriptor,
    ) -> Result<ImageSource, ResolveError> {
        let mut resolved = match descriptor {
            SourceDescriptor::Asset(id) => self.resolve_asset(*id)?,
            SourceDescriptor::Uri(uri) => ImageSource::from_uri(uri.clone()),
            SourceDescriptor::Many(sources) => {
                log::warn!(
                    "multiple image sources are not supported, falling back to the first of {} sources",
                    sources.len()
                );
                return match sources.first() {
                    Some(first) => self.resolve(first),
                    None => Ok(ImageSource::empty()),
                };
            }
            SourceDescriptor::Object(object) => match &object.uri {
                Some(uri) => ImageSource {
                    uri: uri.clone(),
                    width: object.width,
                    height: object.height,
                    headers: object.headers.clone(),
                },
                None => ImageSource::empty(),
            },
            SourceDescriptor::None => ImageSource::empty(),
        };

        if resolved.has_uri() {
            resolved.uri = escape_svg_data_uri(&resolved.uri);
        }
        Ok(resolved)
    }

    fn resolve_asset(&self, id: AssetId) -> Result<ImageSource, ResolveError> {
        let asset = self
            .registry
            .lookup(id)
            .ok_or(ResolveError::AssetNotFound(id))?;

        let scale = if asset.scales.len() > 1 {
            select_scale(&asset.scales, self.pixel_ratio.current())
        } else {
            asset.scales.first().copied().unwrap_or(1.0)
        };

        Ok(ImageSource {
            uri: asset.uri_for_scale(scale),
            width: asset.width,
            height: asset.height,
            headers: None,
        })
    }
}

/// Picks the scale closest to `preferred`. On an exact tie the scale that
/// appears first in `scales` wins.
pub fn select_scale(scales: &[f64], preferred: f64) -> f64 {
    scales
        .iter()
        .copied()
        .reduce(|prev, curr| {
            if (curr - preferred).abs() < (prev - preferred).abs() {
                curr
            } else {
                prev
            }
        })
        .unwrap_or(1.0)
}

/// Percent-encodes the payload of a `data:image/svg+xml;utf8,` URI so that
/// characters like `#` and `"` survive being embedded in `url(...)`.
///
/// Payloads that are already fully percent-encoded are returned unchanged,
/// so escaping happens once per raw input.
pub fn escape_svg_data_uri(uri: &str) -> String {
    let Some(captures) = SVG_DATA_URI.captures(uri) else {
        return uri.to_string();
    };
    let prefix = &captures[1];
    let payload = &captures[2];
    if is_percent_encoded(payload) {
        return uri.to_string();
    }
    format!("{prefix}{}", urlencoding::encode(payload))
}

fn is_percent_encoded(payload: &str) -> bool {
    let bytes = payload.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let valid = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                    && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
                if !valid {
                    return false;
                }
                i += 3;
            }
            b if b.is_ascii_alphanumeric() => i += 1,
            b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' => {
                i += 1
            }
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgsrc_model::{Headers, SourceObject};

    fn logo() -> PackagerAsset {
        PackagerAsset {
            name: "logo".into(),
            kind: "png".into(),
            http_server_location: "/assets".into(),
            scales: vec![1.0, 2.0],
            width: Some(100.0),
            height: Some(50.0),
        }
    }

    fn resolver_with(asset: Option<PackagerAsset>, ratio: f64) -> SourceResolver {
        let mut registry = MockAssetRegistry::new();
        registry.expect_lookup().returning(move |_| asset.clone());
        let mut pixel_ratio = MockPixelRatio::new();
        pixel_ratio.expect_current().return_const(ratio);
        SourceResolver::new(Arc::new(registry), Arc::new(pixel_ratio))
    }

    #[test]
    fn numeric_asset_picks_scale_for_device_ratio() {
        let resolver = resolver_with(Some(logo()), 2.0);
        let resolved = resolver.resolve(&SourceDescriptor::Asset(42)).unwrap();
        assert_eq!(
            resolved,
            ImageSource::from_uri("/assets/logo@2x.png").with_size(100.0, 50.0)
        );
    }

    #[test]
    fn single_scale_asset_ignores_device_ratio() {
        let mut asset = logo();
        asset.scales = vec![3.0];
        let mut registry = MockAssetRegistry::new();
        registry.expect_lookup().returning(move |_| Some(asset.clone()));
        let mut pixel_ratio = MockPixelRatio::new();
        pixel_ratio.expect_current().never();
        let resolver =
            SourceResolver::new(Arc::new(registry), Arc::new(pixel_ratio));

        let resolved = resolver.resolve(&SourceDescriptor::Asset(1)).unwrap();
        assert_eq!(resolved.uri, "/assets/logo@3x.png");
    }

    #[test]
    fn missing_asset_is_a_resolution_error() {
        let resolver = resolver_with(None, 1.0);
        let err = resolver.resolve(&SourceDescriptor::Asset(7)).unwrap_err();
        assert_eq!(err, ResolveError::AssetNotFound(7));
        assert!(err.to_string().contains("asset with ID \"7\""));
    }

    #[test]
    fn scale_ties_go_to_the_first_listed_scale() {
        assert_eq!(select_scale(&[1.0, 2.0, 3.0], 2.5), 2.0);
        assert_eq!(select_scale(&[1.0, 3.0, 2.0], 2.5), 3.0);
        assert_eq!(select_scale(&[1.0, 3.0], 2.0), 1.0);
        assert_eq!(select_scale(&[3.0, 1.0], 2.0), 3.0);
        assert_eq!(select_scale(&[1.0, 2.0, 3.0], 2.9), 3.0);
    }

    #[test]
    fn string_and_empty_descriptors() {
        let resolver = SourceResolver::uris_only();
        assert_eq!(
            resolver.resolve(&"https://x/y.png".into()).unwrap(),
            ImageSource::from_uri("https://x/y.png")
        );
        assert_eq!(
            resolver.resolve(&SourceDescriptor::None).unwrap(),
            ImageSource::empty()
        );
        assert_eq!(
            resolver.resolve(&SourceDescriptor::Many(vec![])).unwrap(),
            ImageSource::empty()
        );
    }

    #[test]
    fn array_resolves_first_element_only() {
        let resolver = SourceResolver::uris_only();
        let resolved = resolver
            .resolve(&SourceDescriptor::Many(vec![
                "https://x/first.png".into(),
                "https://x/second.png".into(),
            ]))
            .unwrap();
        assert_eq!(resolved.uri, "https://x/first.png");
    }

    #[test]
    fn object_fields_pass_through_without_defaults() {
        let mut headers = Headers::new();
        headers.insert("x-token".into(), "secret".into());
        let resolver = SourceResolver::uris_only();

        let resolved = resolver
            .resolve(&SourceDescriptor::Object(SourceObject {
                uri: Some("https://x/y.png".into()),
                width: Some(10.0),
                height: None,
                headers: Some(headers.clone()),
            }))
            .unwrap();
        assert_eq!(resolved.width, Some(10.0));
        assert_eq!(resolved.height, None);
        assert_eq!(resolved.headers, Some(headers));

        let no_uri = resolver
            .resolve(&SourceDescriptor::Object(SourceObject {
                width: Some(10.0),
                ..SourceObject::default()
            }))
            .unwrap();
        assert_eq!(no_uri, ImageSource::empty());
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = resolver_with(Some(logo()), 1.0);
        let a = resolver.resolve(&SourceDescriptor::Asset(3)).unwrap();
        let b = resolver.resolve(&SourceDescriptor::Asset(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn inline_svg_is_escaped_exactly_once() {
        let raw = r##"data:image/svg+xml;utf8,<svg><use href="#frag"/></svg>"##;
        let resolver = SourceResolver::uris_only();

        let once = resolver.resolve(&raw.into()).unwrap().uri;
        assert!(once.starts_with("data:image/svg+xml;utf8,%3Csvg%3E"));
        assert!(!once.contains('#'));
        assert!(!once.contains('"'));

        let twice = resolver.resolve(&once.clone().into()).unwrap().uri;
        assert_eq!(once, twice);
    }

    #[test]
    fn static_registry_serves_registered_and_inserted_assets() {
        let mut registry = StaticAssetRegistry::new();
        let first = registry.register(logo());
        assert_eq!(first, 1);
        let mut icon = logo();
        icon.name = "icon".into();
        icon.scales = vec![1.0];
        registry.insert(42, icon);

        let resolver = SourceResolver::new(
            Arc::new(registry),
            Arc::new(FixedPixelRatio(2.0)),
        );
        assert_eq!(
            resolver.resolve(&SourceDescriptor::Asset(first)).unwrap().uri,
            "/assets/logo@2x.png"
        );
        assert_eq!(
            resolver.resolve(&SourceDescriptor::Asset(42)).unwrap().uri,
            "/assets/icon.png"
        );
        assert!(resolver.resolve(&SourceDescriptor::Asset(2)).is_err());
    }

    #[test]
    fn other_data_uris_are_left_alone() {
        let uri = "data:image/png;base64,iVBORw0KGgo=";
        assert_eq!(escape_svg_data_uri(uri), uri);
    }
}
