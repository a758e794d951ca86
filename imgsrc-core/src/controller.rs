//! Main + fallback loading state machine for one image display site.
//!
//! Each track resolves its descriptor, loads it through the shared
//! [`Loader`] and moves `IDLE -> LOADING -> LOADED | ERRORED`. A change of
//! resolved source releases the track's request and starts over. The
//! presentation layer reads [`DualSourceController::display_source`] to pick
//! what to draw, or subscribes to snapshots.

use crate::error::{LoadError, ResolveError};
use crate::loader::{Loader, RequestId};
use crate::resolver::SourceResolver;
use imgsrc_model::{
    ImageResult, ImageSource, LoadErrorEvent, LoadEvent, LoadStatus,
    SourceDescriptor,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

pub type LoadHandler = Arc<dyn Fn(LoadEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(LoadErrorEvent) + Send + Sync>;
pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// Consumer callbacks. Replacing them never restarts a load; the ones
/// registered when a load settles are the ones invoked.
#[derive(Clone, Default)]
pub struct ImageCallbacks {
    pub on_load: Option<LoadHandler>,
    pub on_load_start: Option<Notify>,
    pub on_load_end: Option<Notify>,
    pub on_error: Option<ErrorHandler>,
}

impl ImageCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_load(
        mut self,
        handler: impl Fn(LoadEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_load = Some(Arc::new(handler));
        self
    }

    pub fn on_load_start(
        mut self,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_load_start = Some(Arc::new(handler));
        self
    }

    pub fn on_load_end(
        mut self,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_load_end = Some(Arc::new(handler));
        self
    }

    pub fn on_error(
        mut self,
        handler: impl Fn(LoadErrorEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    // The fallback track only reports errors.
    fn errors_only(&self) -> Self {
        Self {
            on_error: self.on_error.clone(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for ImageCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCallbacks")
            .field("on_load", &self.on_load.is_some())
            .field("on_load_start", &self.on_load_start.is_some())
            .field("on_load_end", &self.on_load_end.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Observable state of one track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceState {
    pub status: LoadStatus,
    /// Latest resolved source for the track.
    pub resolved: ImageSource,
    /// Last successfully merged result, or the resolved source before any
    /// load completed.
    pub display: ImageSource,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSnapshot {
    pub main: SourceState,
    pub fallback: SourceState,
}

impl ControllerSnapshot {
    pub fn display_source(&self) -> &ImageSource {
        select_display_source(&self.main, &self.fallback)
    }
}

/// Picks the source to draw.
///
/// A loaded main source always wins. A loading main source is shown
/// optimistically when there is no fallback URI and it needs no headers;
/// with headers its final URI is a local object URL that does not exist yet.
/// Everything else shows the fallback.
pub fn select_display_source<'a>(
    main: &'a SourceState,
    fallback: &'a SourceState,
) -> &'a ImageSource {
    match main.status {
        LoadStatus::Loaded => &main.display,
        LoadStatus::Loading
            if !fallback.resolved.has_uri() && !main.resolved.has_headers() =>
        {
            &main.display
        }
        _ => &fallback.display,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackKind {
    Main,
    Fallback,
}

#[derive(Debug, Default)]
struct Track {
    state: SourceState,
    // Bumped on every resolved-source change; completions from older
    // generations are dropped.
    generation: u64,
    active: Option<RequestId>,
}

#[derive(Debug, Default)]
struct Tracks {
    main: Track,
    fallback: Track,
}

impl Tracks {
    fn get_mut(&mut self, kind: TrackKind) -> &mut Track {
        match kind {
            TrackKind::Main => &mut self.main,
            TrackKind::Fallback => &mut self.fallback,
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            main: self.main.state.clone(),
            fallback: self.fallback.state.clone(),
        }
    }
}

struct ControllerShared {
    tracks: Mutex<Tracks>,
    callbacks: RwLock<ImageCallbacks>,
    updates: watch::Sender<ControllerSnapshot>,
}

impl ControllerShared {
    fn callbacks_for(&self, kind: TrackKind) -> ImageCallbacks {
        let callbacks = self.callbacks.read();
        match kind {
            TrackKind::Main => callbacks.clone(),
            TrackKind::Fallback => callbacks.errors_only(),
        }
    }

    /// Runs `update` on the track if `generation` is still current and
    /// publishes the new snapshot.
    fn update_track(
        &self,
        kind: TrackKind,
        generation: u64,
        update: impl FnOnce(&mut Track),
    ) -> bool {
        let mut tracks = self.tracks.lock();
        let track = tracks.get_mut(kind);
        if track.generation != generation {
            return false;
        }
        update(track);
        self.updates.send_replace(tracks.snapshot());
        true
    }

    fn is_current(&self, kind: TrackKind, generation: u64) -> bool {
        self.tracks.lock().get_mut(kind).generation == generation
    }

    fn handle_load(
        &self,
        kind: TrackKind,
        generation: u64,
        resolved: &ImageSource,
        result: ImageResult,
    ) {
        if !self.is_current(kind, generation) {
            return;
        }
        let callbacks = self.callbacks_for(kind);
        if let Some(on_load) = &callbacks.on_load {
            on_load(LoadEvent {
                source: result.clone(),
            });
        }
        if let Some(on_load_end) = &callbacks.on_load_end {
            on_load_end();
        }

        let merged = resolved.merged_with(&result);
        self.update_track(kind, generation, |track| {
            track.state.status = LoadStatus::Loaded;
            track.state.display = merged;
        });
    }

    fn handle_error(
        &self,
        kind: TrackKind,
        generation: u64,
        resolved: &ImageSource,
        err: LoadError,
    ) {
        if !self.is_current(kind, generation) {
            return;
        }
        log::debug!("{kind:?} image {} errored: {err}", resolved.uri);
        let callbacks = self.callbacks_for(kind);
        if let Some(on_error) = &callbacks.on_error {
            on_error(LoadErrorEvent::for_uri(&resolved.uri));
        }
        if let Some(on_load_end) = &callbacks.on_load_end {
            on_load_end();
        }

        self.update_track(kind, generation, |track| {
            track.state.status = LoadStatus::Errored;
        });
    }
}

/// State machine for one display site with a main and a fallback source.
///
/// Dropping the controller releases both tracks' requests.
pub struct DualSourceController {
    loader: Loader,
    resolver: SourceResolver,
    shared: Arc<ControllerShared>,
}

impl fmt::Debug for DualSourceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualSourceController")
            .field("snapshot", &self.snapshot())
            .field("callbacks", &*self.shared.callbacks.read())
            .finish_non_exhaustive()
    }
}

impl DualSourceController {
    /// Resolves both descriptors and starts loading them.
    ///
    /// Resolution failures are returned before anything is loaded.
    pub fn new(
        loader: Loader,
        resolver: SourceResolver,
        source: impl Into<SourceDescriptor>,
        default_source: impl Into<SourceDescriptor>,
        callbacks: ImageCallbacks,
    ) -> Result<Self, ResolveError> {
        let main = resolver.resolve(&source.into())?;
        let fallback = resolver.resolve(&default_source.into())?;

        let mut tracks = Tracks::default();
        tracks.main.state.display = main.clone();
        tracks.fallback.state.display = fallback.clone();
        let (updates, _) = watch::channel(tracks.snapshot());

        let controller = Self {
            loader,
            resolver,
            shared: Arc::new(ControllerShared {
                tracks: Mutex::new(tracks),
                callbacks: RwLock::new(callbacks),
                updates,
            }),
        };
        controller.apply(TrackKind::Fallback, fallback);
        controller.apply(TrackKind::Main, main);
        Ok(controller)
    }

    pub fn set_source(
        &self,
        source: impl Into<SourceDescriptor>,
    ) -> Result<(), ResolveError> {
        let resolved = self.resolver.resolve(&source.into())?;
        self.apply(TrackKind::Main, resolved);
        Ok(())
    }

    pub fn set_default_source(
        &self,
        source: impl Into<SourceDescriptor>,
    ) -> Result<(), ResolveError> {
        let resolved = self.resolver.resolve(&source.into())?;
        self.apply(TrackKind::Fallback, resolved);
        Ok(())
    }

    /// Replaces the consumer callbacks. In-flight loads report to the new
    /// ones.
    pub fn set_callbacks(&self, callbacks: ImageCallbacks) {
        *self.shared.callbacks.write() = callbacks;
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.shared.tracks.lock().snapshot()
    }

    pub fn display_source(&self) -> ImageSource {
        self.snapshot().display_source().clone()
    }

    /// URI to hand to the renderer. Header-loaded sources map to their local
    /// object URL.
    pub fn display_uri(&self) -> String {
        self.loader.resolve_blob_uri(&self.display_source().uri)
    }

    /// Receives a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.shared.updates.subscribe()
    }

    fn apply(&self, kind: TrackKind, resolved: ImageSource) {
        let (generation, superseded) = {
            let mut tracks = self.shared.tracks.lock();
            let track = tracks.get_mut(kind);
            if track.state.resolved == resolved {
                return;
            }
            track.generation += 1;
            track.state.resolved = resolved.clone();
            (track.generation, track.active.take())
        };
        if let Some(id) = superseded {
            self.loader.release(id);
        }

        if !resolved.has_uri() {
            self.shared.update_track(kind, generation, |track| {
                track.state.status = LoadStatus::Idle;
                track.state.display = resolved;
            });
            return;
        }

        if let Some(on_load_start) =
            self.shared.callbacks_for(kind).on_load_start
        {
            on_load_start();
        }
        if !self.shared.update_track(kind, generation, |track| {
            track.state.status = LoadStatus::Loading;
        }) {
            return;
        }

        let on_load = {
            let shared = Arc::downgrade(&self.shared);
            let resolved = resolved.clone();
            move |result: ImageResult| {
                if let Some(shared) = Weak::upgrade(&shared) {
                    shared.handle_load(kind, generation, &resolved, result);
                }
            }
        };
        let on_error = {
            let shared = Arc::downgrade(&self.shared);
            let resolved = resolved.clone();
            move |err: LoadError| {
                if let Some(shared) = Weak::upgrade(&shared) {
                    shared.handle_error(kind, generation, &resolved, err);
                }
            }
        };
        let id = self.loader.load(resolved, on_load, on_error);

        let recorded = {
            let mut tracks = self.shared.tracks.lock();
            let track = tracks.get_mut(kind);
            if track.generation == generation {
                track.active = Some(id);
                true
            } else {
                false
            }
        };
        if !recorded {
            self.loader.release(id);
        }
    }
}

impl Drop for DualSourceController {
    fn drop(&mut self) {
        let released = {
            let mut tracks = self.shared.tracks.lock();
            [TrackKind::Main, TrackKind::Fallback].map(|kind| {
                let track = tracks.get_mut(kind);
                track.generation += 1;
                track.active.take()
            })
        };
        for id in released.into_iter().flatten() {
            self.loader.release(id);
        }
    }
}
