//! Local object URLs for bytes fetched with custom headers.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const BLOB_URL_PREFIX: &str = "blob:imgsrc/";

/// Bytes behind an object URL.
#[derive(Debug, Clone)]
pub struct Blob {
    pub content_type: Option<String>,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: RwLock<HashMap<String, Blob>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `blob` and returns a fresh `blob:` URL for it.
    pub fn create_object_url(&self, blob: Blob) -> String {
        let url = format!("{BLOB_URL_PREFIX}{}", Uuid::new_v4());
        self.blobs.write().insert(url.clone(), blob);
        url
    }

    /// Forgets an object URL. Unknown URLs are ignored.
    pub fn revoke_object_url(&self, url: &str) {
        if self.blobs.write().remove(url).is_some() {
            log::trace!("revoked object url {url}");
        }
    }

    pub fn get(&self, url: &str) -> Option<Blob> {
        self.blobs.read().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

pub fn is_blob_url(uri: &str) -> bool {
    uri.starts_with(BLOB_URL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_urls_are_unique_and_revocable() {
        let store = BlobStore::new();
        let blob = Blob {
            content_type: Some("image/png".into()),
            bytes: Arc::from(&b"png"[..]),
        };
        let a = store.create_object_url(blob.clone());
        let b = store.create_object_url(blob);
        assert_ne!(a, b);
        assert!(is_blob_url(&a));
        assert_eq!(store.get(&a).map(|blob| blob.bytes.len()), Some(3));

        store.revoke_object_url(&a);
        store.revoke_object_url(&a);
        assert!(store.get(&a).is_none());
        assert_eq!(store.len(), 1);
    }
}
