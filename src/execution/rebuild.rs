//! Incremental rebuild scheduler
//!
//! Watches a directory tree, collects changed paths and re-runs the root of
//! the pipeline that installed it once a burst of changes has settled. A
//! single worker task per scheduler performs the rebuilds. When the root is
//! still running, the worker waits for that run to finish and for one more
//! window before rebuilding.

use crate::core::{Stage, StageContext};
use crate::execution::node::{root_of, PipelineNode};
use crate::execution::ExecutionEvent;
use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Minimum spacing between two rebuilds
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2500);

#[derive(Default)]
struct Shared {
    pending: Mutex<Vec<PathBuf>>,
    active: Mutex<Vec<PathBuf>>,
    wake: Notify,
    started: AtomicBool,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn push(&self, path: PathBuf) {
        lock(&self.pending).push(path);
        self.wake.notify_one();
    }

    /// Move the deduplicated pending paths into the active batch
    fn drain(&self) -> Vec<PathBuf> {
        let pending = std::mem::take(&mut *lock(&self.pending));
        let batch = dedupe(pending);
        *lock(&self.active) = batch.clone();
        batch
    }
}

/// Debounced, deduplicating trigger for rebuilding a pipeline tree
///
/// Clones share the same pending paths, active batch and worker.
#[derive(Clone)]
pub struct RebuildScheduler {
    scope: Scope,
    window: Duration,
    shared: Arc<Shared>,
}

/// Which changed paths a scheduler reacts to
#[derive(Clone)]
struct Scope {
    root: PathBuf,
    filter: Option<GlobMatcher>,
    ignore: Vec<PathBuf>,
}

impl Scope {
    fn accepts(&self, path: &Path) -> bool {
        if self.ignore.iter().any(|ignored| path.starts_with(ignored)) {
            return false;
        }
        let Some(filter) = &self.filter else {
            return true;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        filter.is_match(relative)
    }
}

impl std::fmt::Debug for RebuildScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildScheduler")
            .field("root", &self.scope.root)
            .field("filter", &self.scope.filter.as_ref().map(|m| m.glob().glob()))
            .field("ignore", &self.scope.ignore)
            .field("window", &self.window)
            .field("started", &self.is_started())
            .finish()
    }
}

impl RebuildScheduler {
    /// Create a scheduler watching `root` recursively
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            scope: Scope {
                root,
                filter: None,
                ignore: Vec::new(),
            },
            window: DEFAULT_DEBOUNCE,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Set the debounce window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Only react to paths matching `pattern`, relative to the watched root
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid watch glob: {}", pattern))?;
        self.scope.filter = Some(glob.compile_matcher());
        Ok(self)
    }

    /// Never react to changes under `path`, relative to the watched root
    /// unless absolute
    pub fn with_ignore(mut self, path: impl AsRef<Path>) -> Self {
        let ignored = self.scope.root.join(path);
        self.scope.ignore.push(ignored);
        self
    }

    pub fn root(&self) -> &Path {
        &self.scope.root
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Record one changed path, returning whether it passed the filter
    pub fn record_change(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if !self.scope.accepts(&path) {
            return false;
        }
        debug!("Change recorded: {}", path.display());
        self.shared.push(path);
        true
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    /// Paths of the last debounced trigger that have not been consumed yet
    pub fn active_batch(&self) -> Vec<PathBuf> {
        lock(&self.shared.active).clone()
    }

    /// Take the active batch, leaving it empty
    pub fn take_active(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *lock(&self.shared.active))
    }

    /// Start the worker and the filesystem watch on behalf of the pipeline
    /// behind `ctx`.
    ///
    /// Returns `true` only for the call that actually started them. Both stop
    /// once that pipeline is dropped.
    pub fn start(&self, ctx: &StageContext) -> bool {
        let Some(owner) = ctx.node() else {
            return false;
        };
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.spawn_worker(owner);
        if let Err(e) = self.watch() {
            error!("Failed to watch {}: {:#}", self.scope.root.display(), e);
        }
        true
    }

    /// Whether a filesystem watch is currently held
    pub fn is_watching(&self) -> bool {
        lock(&self.shared.watcher).is_some()
    }

    fn watch(&self) -> Result<()> {
        let scope = self.scope.clone();
        let shared = Arc::downgrade(&self.shared);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let Some(shared) = shared.upgrade() else {
                        return;
                    };
                    for path in event.paths {
                        if scope.accepts(&path) {
                            shared.push(path);
                        }
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            Config::default(),
        )?;
        watcher.watch(&self.scope.root, RecursiveMode::Recursive)?;

        info!("Watching {} for changes", self.scope.root.display());
        *lock(&self.shared.watcher) = Some(watcher);
        Ok(())
    }

    fn spawn_worker(&self, owner: Arc<dyn PipelineNode>) {
        let shared = Arc::clone(&self.shared);
        let window = self.window;
        let mut closed = owner.closed();
        let owner = Arc::downgrade(&owner);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = closed.changed() => break,
                }
                tokio::select! {
                    _ = tokio::time::sleep(window) => {}
                    _ = closed.changed() => break,
                }

                let Some(node) = owner.upgrade() else {
                    break;
                };
                let root = root_of(node);
                if root.is_running() {
                    debug!("{} is running, deferring rebuild", root.name());
                    root.idle().await;
                    tokio::time::sleep(window).await;
                }

                let batch = shared.drain();
                if batch.is_empty() {
                    continue;
                }

                info!("Rebuilding {} ({} changed paths)", root.name(), batch.len());
                root.emit(ExecutionEvent::RebuildTriggered {
                    pipeline: root.name(),
                    paths: batch,
                });
                root.rerun().await;
                lock(&shared.active).clear();
            }

            debug!("Pipeline dropped, stopping rebuild worker");
            lock(&shared.watcher).take();
            shared.started.store(false, Ordering::SeqCst);
        });
    }

    /// Load every path of the active batch, skipping the ones that fail
    async fn load_active<T, F, Fut>(&self, loader: &F) -> Vec<T>
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut items = Vec::new();
        for path in self.take_active() {
            match loader(path.clone()).await {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
            }
        }
        items
    }

    /// An ALL stage that starts watching on its first run and appends the
    /// loaded active batch on every later run.
    pub fn stage<T, F, Fut>(&self, loader: F) -> Stage<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let scheduler = self.clone();
        let loader = Arc::new(loader);
        Stage::all(move |mut items: Vec<T>, ctx| {
            let scheduler = scheduler.clone();
            let loader = Arc::clone(&loader);
            async move {
                if !scheduler.start(&ctx) {
                    items.extend(scheduler.load_active(&*loader).await);
                }
                Ok(items)
            }
        })
        .named("rebuild")
    }

    /// A FROM stage producing the loaded active batch
    pub fn source_stage<T, F, Fut>(&self, loader: F) -> Stage<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let scheduler = self.clone();
        let loader = Arc::new(loader);
        Stage::source(move |ctx| {
            let scheduler = scheduler.clone();
            let loader = Arc::clone(&loader);
            async move {
                if scheduler.start(&ctx) {
                    return Ok(Vec::new());
                }
                Ok(scheduler.load_active(&*loader).await)
            }
        })
        .named("rebuild_source")
    }
}

/// Remove duplicates, keeping the first occurrence of each path
pub fn dedupe(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect()
}
