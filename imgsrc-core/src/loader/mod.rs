//! Cancellable image loading with request bookkeeping.
//!
//! Every [`Loader::load`] registers a request in the loader's table and
//! spawns a task that fetches the image with the strategy the source needs.
//! A settling task takes the callbacks out of the table under its lock and
//! invokes them after the lock is released, so a request aborted or released
//! before it settles never reports.

mod element;
mod probe;
mod strategy;

pub use strategy::LoadStrategy;

use self::element::ImageElement;
use self::strategy::{DirectFetch, FetchStrategy, HeaderFetch, Transport};
use crate::blob::{Blob, BlobStore, is_blob_url};
use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::uri_cache::UriCache;
use imgsrc_model::{CacheStatus, ImageResult, ImageSource};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Opaque handle to a load request. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type OnLoad = Box<dyn FnOnce(ImageResult) + Send + 'static>;
pub type OnError = Box<dyn FnOnce(LoadError) + Send + 'static>;

struct Callbacks {
    on_load: OnLoad,
    on_error: OnError,
}

struct LoadRequest {
    element: Arc<ImageElement>,
    source: ImageSource,
    task: CancellationToken,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
    callbacks: Option<Callbacks>,
    // Set once the success path added the URI to the cache.
    cached: bool,
}

struct LoaderShared {
    config: LoaderConfig,
    cache: Arc<UriCache>,
    blobs: Arc<BlobStore>,
    direct: DirectFetch,
    headers: HeaderFetch,
    runtime: Handle,
    next_id: AtomicU64,
    requests: Mutex<BTreeMap<RequestId, LoadRequest>>,
}

/// Shared handle to the loader. Clones refer to the same request table and
/// cache.
#[derive(Clone)]
pub struct Loader {
    shared: Arc<LoaderShared>,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("in_flight", &self.shared.requests.lock().len())
            .field("cached_uris", &self.shared.cache.len())
            .field("object_urls", &self.shared.blobs.len())
            .finish()
    }
}

impl Loader {
    /// Builds a loader on the current tokio runtime with a fresh cache.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|_| LoadError::RuntimeUnavailable)?;
        let cache = Arc::new(UriCache::new(config.max_cache_entries));
        Self::with_parts(config, cache, runtime)
    }

    /// Builds a loader that shares `cache` with other loaders.
    pub fn with_parts(
        config: LoaderConfig,
        cache: Arc<UriCache>,
        runtime: Handle,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(config.request_timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| LoadError::Client(e.to_string()))?;

        let transport = Transport::new(client, config.base_url.clone());
        let blobs = Arc::new(BlobStore::new());

        Ok(Self {
            shared: Arc::new(LoaderShared {
                direct: DirectFetch::new(transport.clone()),
                headers: HeaderFetch::new(transport, blobs.clone()),
                config,
                cache,
                blobs,
                runtime,
                next_id: AtomicU64::new(0),
                requests: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    pub fn cache(&self) -> &Arc<UriCache> {
        &self.shared.cache
    }

    /// Starts loading `source` and returns immediately.
    ///
    /// Exactly one of `on_load`/`on_error` fires, on a runtime worker, unless
    /// the request is aborted or released first. On success the source URI is
    /// added to the cache before `on_load` runs.
    pub fn load<L, E>(
        &self,
        source: ImageSource,
        on_load: L,
        on_error: E,
    ) -> RequestId
    where
        L: FnOnce(ImageResult) + Send + 'static,
        E: FnOnce(LoadError) + Send + 'static,
    {
        let shared = &self.shared;
        let id = RequestId(shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let element = Arc::new(ImageElement::default());
        let task = CancellationToken::new();
        let strategy = LoadStrategy::for_source(&source);

        let cleanup: Option<Box<dyn FnOnce() + Send>> = match strategy {
            LoadStrategy::Direct => {
                element.set_src(source.uri.clone());
                None
            }
            LoadStrategy::Headers => {
                let task = task.clone();
                let element = element.clone();
                let blobs = shared.blobs.clone();
                Some(Box::new(move || {
                    task.cancel();
                    let src = element.clear();
                    if is_blob_url(&src) {
                        blobs.revoke_object_url(&src);
                    }
                }))
            }
        };

        log::debug!("load {id} {:?} {}", strategy, source.uri);

        shared.requests.lock().insert(
            id,
            LoadRequest {
                element: element.clone(),
                source: source.clone(),
                task: task.clone(),
                cleanup,
                callbacks: Some(Callbacks {
                    on_load: Box::new(on_load),
                    on_error: Box::new(on_error),
                }),
                cached: false,
            },
        );

        let worker = self.shared.clone();
        shared.runtime.spawn(async move {
            let started = Instant::now();
            let fetch: &dyn FetchStrategy = match strategy {
                LoadStrategy::Direct => &worker.direct,
                LoadStrategy::Headers => &worker.headers,
            };
            let outcome = tokio::select! {
                _ = task.cancelled() => Err(LoadError::Aborted),
                fetched = fetch.fetch(&source, &element) => fetched,
            };
            let outcome = outcome.and_then(|fetched| {
                let bytes = &fetched.bytes;
                let (width, height) = match probe::natural_size(bytes) {
                    Some(size) => size,
                    // An image whose size cannot be probed still counts as
                    // loaded with zero dimensions.
                    None if probe::is_image(
                        fetched.content_type.as_deref(),
                        bytes,
                    ) =>
                    {
                        log::debug!(
                            "load {id}: no natural size for {}",
                            source.uri
                        );
                        (0, 0)
                    }
                    None => return Err(LoadError::Decode(source.uri.clone())),
                };
                element.set_natural_size((width, height));
                Ok(ImageResult {
                    uri: element.src(),
                    width,
                    height,
                })
            });
            log::trace!("load {id} settled after {:?}", started.elapsed());
            worker.settle(id, outcome);
        });

        id
    }

    /// Cancels a request without touching the cache. Idempotent.
    pub fn abort(&self, id: RequestId) {
        self.dispose(id);
    }

    /// Cancels a request and drops the cache reference its success added.
    /// Idempotent.
    pub fn release(&self, id: RequestId) {
        if let Some(request) = self.dispose(id)
            && request.cached
        {
            self.shared.cache.remove(&request.source.uri);
        }
    }

    fn dispose(&self, id: RequestId) -> Option<LoadRequest> {
        let mut request = self.shared.requests.lock().remove(&id)?;
        if let Some(cleanup) = request.cleanup.take() {
            cleanup();
        }
        request.callbacks = None;
        request.element.clear();
        request.task.cancel();
        log::debug!("disposed {id} {}", request.source.uri);
        Some(request)
    }

    pub fn has(&self, uri: &str) -> bool {
        self.shared.cache.has(uri)
    }

    /// Natural dimensions of a live request's image, once known.
    pub fn natural_size(&self, id: RequestId) -> Option<(u32, u32)> {
        self.shared
            .requests
            .lock()
            .get(&id)
            .and_then(|request| request.element.natural_size())
    }

    /// Current load target of the oldest request for `uri`, or `uri` itself.
    ///
    /// For header-loaded sources this is a local object URL once the body
    /// arrived, and empty before that.
    pub fn resolve_blob_uri(&self, uri: &str) -> String {
        self.shared
            .requests
            .lock()
            .values()
            .find(|request| request.source.uri == uri)
            .map(|request| request.element.src())
            .unwrap_or_else(|| uri.to_string())
    }

    /// Bytes behind a local object URL handed out by the header strategy.
    pub fn blob(&self, object_url: &str) -> Option<Blob> {
        self.shared.blobs.get(object_url)
    }

    /// Loads `uri` and reports its natural size.
    ///
    /// Dimensions are polled every `size_poll_interval` after completion,
    /// for at most `size_poll_timeout`.
    pub async fn get_size(&self, uri: &str) -> Result<(u32, u32)> {
        let (id, completion) =
            self.load_with_completion(ImageSource::from_uri(uri));
        let mut guard = ReleaseOnDrop::new(self, id);

        completion.await.unwrap_or(Err(LoadError::Aborted))?;

        let deadline =
            tokio::time::Instant::now() + self.shared.config.size_poll_timeout;
        // `interval` rejects a zero period.
        let period = self
            .shared
            .config
            .size_poll_interval
            .max(Duration::from_millis(1));
        let mut poll = tokio::time::interval(period);
        loop {
            poll.tick().await;
            if let Some((width, height)) = self.natural_size(id)
                && width > 0
                && height > 0
            {
                guard.release();
                return Ok((width, height));
            }
            if tokio::time::Instant::now() >= deadline {
                guard.release();
                return Err(LoadError::SizeUnavailable(uri.to_string()));
            }
        }
    }

    /// Callback flavour of [`Loader::get_size`].
    pub fn get_size_with<S, F>(&self, uri: &str, success: S, failure: F)
    where
        S: FnOnce(u32, u32) + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let loader = self.clone();
        let uri = uri.to_string();
        self.shared.runtime.spawn(async move {
            match loader.get_size(&uri).await {
                Ok((width, height)) => success(width, height),
                Err(err) => {
                    log::debug!("get_size {uri} failed: {err}");
                    failure();
                }
            }
        });
    }

    /// Loads `uri` so later displays find it in the cache.
    ///
    /// The URI ends up cached with no outstanding references, so it stays
    /// until evicted.
    pub async fn prefetch(&self, uri: &str) -> Result<()> {
        let (id, completion) =
            self.load_with_completion(ImageSource::from_uri(uri));
        let mut guard = ReleaseOnDrop::new(self, id);

        let outcome = completion.await.unwrap_or(Err(LoadError::Aborted));
        if outcome.is_ok() {
            self.shared.cache.add(uri);
            self.shared.cache.remove(uri);
        }
        guard.release();
        outcome.map(|_| ())
    }

    /// Reports which of `uris` are cached. Absent URIs are omitted.
    pub async fn query_cache<I, S>(
        &self,
        uris: I,
    ) -> HashMap<String, CacheStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        uris.into_iter()
            .filter(|uri| self.shared.cache.has(uri.as_ref()))
            .map(|uri| (uri.as_ref().to_string(), CacheStatus::DiskMemory))
            .collect()
    }

    fn load_with_completion(
        &self,
        source: ImageSource,
    ) -> (RequestId, oneshot::Receiver<Result<ImageResult>>) {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let on_error_tx = tx.clone();
        let id = self.load(
            source,
            move |result| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Ok(result));
                }
            },
            move |err| {
                if let Some(tx) = on_error_tx.lock().take() {
                    let _ = tx.send(Err(err));
                }
            },
        );
        (id, rx)
    }
}

impl LoaderShared {
    fn settle(&self, id: RequestId, outcome: Result<ImageResult>) {
        let callbacks = {
            let mut requests = self.requests.lock();
            let Some(request) = requests.get_mut(&id) else {
                return;
            };
            let Some(callbacks) = request.callbacks.take() else {
                return;
            };
            if outcome.is_ok() {
                request.cached = true;
                self.cache.add(&request.source.uri);
            }
            callbacks
        };

        match outcome {
            Ok(result) => (callbacks.on_load)(result),
            Err(err) if err.is_aborted() => {}
            Err(err) => {
                log::warn!("load {id} failed: {err}");
                (callbacks.on_error)(err);
            }
        }
    }
}

/// Releases a request when a future driving it is dropped early.
struct ReleaseOnDrop<'a> {
    loader: &'a Loader,
    id: Option<RequestId>,
}

impl<'a> ReleaseOnDrop<'a> {
    fn new(loader: &'a Loader, id: RequestId) -> Self {
        Self {
            loader,
            id: Some(id),
        }
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.loader.release(id);
        }
    }
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
