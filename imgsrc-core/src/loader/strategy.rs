//! The two ways an image gets fetched.
//!
//! Sources without headers go through [`DirectFetch`]: the URI itself is the
//! load target. Sources with headers go through [`HeaderFetch`]: the bytes are
//! fetched with the headers attached and exposed under a local object URL,
//! which then becomes the load target.

use super::element::ImageElement;
use crate::blob::{Blob, BlobStore};
use crate::error::{LoadError, Result};
use base64::Engine;
use imgsrc_model::{Headers, ImageSource};
use reqwest::Client;
use reqwest::header::{
    ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use std::sync::Arc;
use url::Url;

const DATA_URI_PREFIX: &str = "data:";
const ACCEPT_IMAGES: &str = "image/*";

/// Which strategy a source needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    Direct,
    Headers,
}

impl LoadStrategy {
    pub fn for_source(source: &ImageSource) -> Self {
        if source.has_headers() {
            LoadStrategy::Headers
        } else {
            LoadStrategy::Direct
        }
    }
}

/// Raw bytes as delivered by the network or a data URI.
#[derive(Debug, Clone)]
pub(crate) struct Fetched {
    pub(crate) content_type: Option<String>,
    pub(crate) bytes: Arc<[u8]>,
}

#[async_trait::async_trait]
pub(crate) trait FetchStrategy: Send + Sync {
    /// Fetches `source`, leaving `element` pointing at the final load target.
    async fn fetch(
        &self,
        source: &ImageSource,
        element: &ImageElement,
    ) -> Result<Fetched>;
}

/// HTTP plumbing shared by both strategies.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    client: Client,
    base_url: Option<Url>,
}

impl Transport {
    pub(crate) fn new(client: Client, base_url: Option<Url>) -> Self {
        Self { client, base_url }
    }

    fn absolute_url(&self, uri: &str) -> Result<Url> {
        let url = match Url::parse(uri) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .as_ref()
                .ok_or_else(|| LoadError::UnsupportedUri(uri.to_string()))?
                .join(uri)
                .map_err(|_| LoadError::UnsupportedUri(uri.to_string()))?,
            Err(_) => return Err(LoadError::UnsupportedUri(uri.to_string())),
        };
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(LoadError::UnsupportedUri(uri.to_string())),
        }
    }

    async fn get(
        &self,
        uri: &str,
        headers: Option<HeaderMap>,
    ) -> Result<Fetched> {
        if uri.starts_with(DATA_URI_PREFIX) {
            return decode_data_uri(uri);
        }

        let url = self.absolute_url(uri)?;
        let mut request = self.client.get(url);
        if let Some(headers) = headers {
            request = request.headers(headers);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        Ok(Fetched {
            content_type,
            bytes: Arc::from(bytes.as_ref()),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DirectFetch {
    transport: Transport,
}

impl DirectFetch {
    pub(crate) fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

#[async_trait::async_trait]
impl FetchStrategy for DirectFetch {
    async fn fetch(
        &self,
        source: &ImageSource,
        _element: &ImageElement,
    ) -> Result<Fetched> {
        // The load target was assigned when the request was registered.
        self.transport.get(&source.uri, None).await
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HeaderFetch {
    transport: Transport,
    blobs: Arc<BlobStore>,
}

impl HeaderFetch {
    pub(crate) fn new(transport: Transport, blobs: Arc<BlobStore>) -> Self {
        Self { transport, blobs }
    }
}

#[async_trait::async_trait]
impl FetchStrategy for HeaderFetch {
    async fn fetch(
        &self,
        source: &ImageSource,
        element: &ImageElement,
    ) -> Result<Fetched> {
        let headers = header_map(source.headers.as_ref())?;
        let fetched = self.transport.get(&source.uri, Some(headers)).await?;

        let object_url = self.blobs.create_object_url(Blob {
            content_type: fetched.content_type.clone(),
            bytes: fetched.bytes.clone(),
        });
        if !element.set_src(object_url.clone()) {
            // Released while the body was in flight.
            self.blobs.revoke_object_url(&object_url);
            return Err(LoadError::Aborted);
        }
        Ok(fetched)
    }
}

/// Caller headers plus `Accept: image/*`.
fn header_map(headers: Option<&Headers>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers.into_iter().flatten() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| LoadError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            LoadError::InvalidHeader(name.as_str().to_string())
        })?;
        map.append(name, value);
    }
    map.append(ACCEPT, HeaderValue::from_static(ACCEPT_IMAGES));
    Ok(map)
}

/// Decodes `data:[<mediatype>][;base64],<payload>`.
fn decode_data_uri(uri: &str) -> Result<Fetched> {
    let rest = &uri[DATA_URI_PREFIX.len()..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::InvalidDataUri("missing ','".to_string()))?;

    let (media_type, is_base64) = match meta.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (meta, false),
    };

    let bytes = if is_base64 {
        let compact: String =
            payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| LoadError::InvalidDataUri(e.to_string()))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    let content_type = media_type
        .split(';')
        .next()
        .filter(|mime| !mime.is_empty())
        .map(str::to_string);

    Ok(Fetched {
        content_type,
        bytes: Arc::from(bytes),
    })
}
