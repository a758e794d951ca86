//! # imgsrc core
//!
//! Resolution, loading and presence caching for image sources.
//!
//! ## Overview
//!
//! - **Resolution**: [`SourceResolver`] turns asset ids, URIs, objects and
//!   lists into a canonical [`ImageSource`](imgsrc_model::ImageSource)
//! - **Loading**: [`Loader`] fetches sources directly or with custom headers
//!   behind a local object URL, with cancellable request handles
//! - **Caching**: [`UriCache`] remembers which URIs loaded, reference
//!   counted with least-recently-used eviction
//! - **Display state**: [`DualSourceController`] drives a main and a
//!   fallback source and decides which one to draw
//!
//! ## Examples
//!
//! ```no_run
//! use imgsrc_core::{
//!     DualSourceController, ImageCallbacks, Loader, LoaderConfig,
//!     SourceResolver,
//! };
//! use imgsrc_model::SourceDescriptor;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = Loader::new(LoaderConfig::from_env()?)?;
//! let controller = DualSourceController::new(
//!     loader,
//!     SourceResolver::uris_only(),
//!     "https://cdn.example.com/poster.png",
//!     SourceDescriptor::None,
//!     ImageCallbacks::new().on_error(|event| eprintln!("{}", event.error)),
//! )?;
//!
//! let mut updates = controller.subscribe();
//! updates.changed().await?;
//! println!("drawing {}", controller.display_uri());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Local object URLs for header-fetched bytes
pub mod blob;

/// Loader configuration and environment overrides
pub mod config;

/// Main + fallback display state machine
pub mod controller;

/// Error types
pub mod error;

/// Cancellable image loading
pub mod loader;

/// Descriptor resolution and collaborator traits
pub mod resolver;

/// Reference-counted URI presence cache
pub mod uri_cache;

pub use blob::{Blob, BlobStore};
pub use config::LoaderConfig;
pub use controller::{
    ControllerSnapshot, DualSourceController, ImageCallbacks, SourceState,
    select_display_source,
};
pub use error::{ConfigError, LoadError, ResolveError, Result};
pub use loader::{LoadStrategy, Loader, RequestId};
pub use resolver::{
    AssetRegistry, FixedPixelRatio, PixelRatio, SourceResolver,
    StaticAssetRegistry,
};
#[cfg(feature = "mocks")]
pub use resolver::{MockAssetRegistry, MockPixelRatio};
pub use uri_cache::UriCache;
