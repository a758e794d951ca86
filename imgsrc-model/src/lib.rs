//! Data model definitions shared across imgsrc crates.
#![allow(missing_docs)]

pub mod asset;
pub mod descriptor;
pub mod events;
pub mod source;
pub mod status;

// Intentionally curated re-exports for downstream consumers.
pub use asset::{AssetId, PackagerAsset};
pub use descriptor::{SourceDescriptor, SourceObject};
pub use events::{LoadErrorEvent, LoadEvent};
pub use source::{Headers, ImageResult, ImageSource};
pub use status::{CacheStatus, LoadStatus};
