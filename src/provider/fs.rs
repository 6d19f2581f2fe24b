//! Filesystem provider: directories form the tree.
//!
//! Subscriptions are non-recursive watches through a shared
//! `notify-debouncer-mini` debouncer. Debounced events arrive on the
//! debouncer's thread and are re-posted onto the executor worker, so change
//! handlers always run there.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify::Watcher;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};

use crate::error::ProviderError;
use crate::executor::{Dispatch, ExecutorHandle};

use super::identity::{CanonicalId, RuntimeId};
use super::{
    ChangeHandler, ChangeKind, ElementInfo, StructureChange, SubscriptionId, SubscriptionIds,
    TreeProvider,
};

/// Default patterns to ignore when watching the filesystem.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "target",
];

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default flood threshold (events per debounce window).
pub const DEFAULT_FLOOD_THRESHOLD: usize = 100;

/// Watch behaviour of the filesystem provider.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Install real watches for subscriptions.
    pub enabled: bool,
    pub debounce: Duration,
    /// Path components whose changes are dropped.
    pub ignore_patterns: Vec<String>,
    /// Above this many events in one window, every touched watch gets a
    /// single `ChildrenInvalidated` instead of per-child changes.
    pub flood_threshold: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            flood_threshold: DEFAULT_FLOOD_THRESHOLD,
        }
    }
}

/// Two-way map between identities handed out and their paths.
#[derive(Default)]
struct PathIndex {
    by_id: HashMap<CanonicalId, PathBuf>,
    by_path: HashMap<PathBuf, CanonicalId>,
}

impl PathIndex {
    fn record(&mut self, id: CanonicalId, path: PathBuf) {
        if let Some(stale) = self.by_id.insert(id.clone(), path.clone()) {
            if stale != path {
                self.by_path.remove(&stale);
            }
        }
        self.by_path.insert(path, id);
    }
}

struct Watch {
    source: CanonicalId,
    path: PathBuf,
    handler: ChangeHandler,
}

#[derive(Default)]
struct WatchRegistry {
    watches: HashMap<SubscriptionId, Watch>,
}

impl WatchRegistry {
    fn watchers_of(&self, path: &Path) -> usize {
        self.watches.values().filter(|w| w.path == path).count()
    }
}

/// Provider over a directory tree rooted at `root`.
pub struct FsProvider {
    root: PathBuf,
    executor: ExecutorHandle,
    index: Arc<Mutex<PathIndex>>,
    registry: Arc<Mutex<WatchRegistry>>,
    debouncer: Mutex<Option<Debouncer<notify::RecommendedWatcher>>>,
    ids: SubscriptionIds,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FsProvider {
    /// Create a provider for `root`.
    ///
    /// With watching disabled subscriptions are still registered but never
    /// fire.
    pub fn new(
        root: &Path,
        executor: ExecutorHandle,
        settings: WatchSettings,
    ) -> Result<Self, ProviderError> {
        let index = Arc::new(Mutex::new(PathIndex::default()));
        let registry = Arc::new(Mutex::new(WatchRegistry::default()));

        let debouncer = if settings.enabled {
            let index = Arc::clone(&index);
            let registry = Arc::clone(&registry);
            let executor = executor.clone();
            let WatchSettings {
                debounce,
                ignore_patterns,
                flood_threshold,
                ..
            } = settings;

            let debouncer = new_debouncer(
                debounce,
                move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                    match result {
                        Ok(events) => {
                            let paths: Vec<PathBuf> = events
                                .iter()
                                .filter(|e| e.kind == DebouncedEventKind::Any)
                                .map(|e| e.path.clone())
                                .filter(|p| !should_ignore(p, &ignore_patterns))
                                .collect();
                            if paths.is_empty() {
                                return;
                            }
                            let changes = {
                                let registry = lock(&registry);
                                let index = lock(&index);
                                route_events(&paths, &registry, &index, flood_threshold)
                            };
                            for (handler, change) in changes {
                                if let Err(err) = executor
                                    .post_with(Dispatch::Enqueue, move || handler(change))
                                {
                                    tracing::debug!(%err, "dropping filesystem notification");
                                }
                            }
                        }
                        Err(err) => {
                            // Watcher errors are non-fatal.
                            tracing::warn!(%err, "filesystem watcher error");
                        }
                    }
                },
            )
            .map_err(|e| ProviderError::Watch(e.to_string()))?;
            Some(debouncer)
        } else {
            None
        };

        Ok(Self {
            root: root.to_path_buf(),
            executor,
            index,
            registry,
            debouncer: Mutex::new(debouncer),
            ids: SubscriptionIds::default(),
        })
    }

    /// Path recorded for `id`, if the provider has handed it out.
    pub fn path_of(&self, id: &CanonicalId) -> Option<PathBuf> {
        lock(&self.index).by_id.get(id).cloned()
    }

    fn lookup(&self, id: &CanonicalId) -> Result<PathBuf, ProviderError> {
        self.path_of(id)
            .ok_or_else(|| ProviderError::Unknown(id.clone()))
    }

    fn describe(&self, path: &Path) -> io::Result<ElementInfo> {
        let info = element_info(path)?;
        if let Some(id) = info.id() {
            lock(&self.index).record(id, path.to_path_buf());
        }
        Ok(info)
    }
}

impl TreeProvider for FsProvider {
    fn root(&self) -> Result<ElementInfo, ProviderError> {
        self.executor.ensure_on_worker("root")?;
        Ok(self.describe(&self.root)?)
    }

    fn children(&self, id: &CanonicalId) -> Result<Vec<ElementInfo>, ProviderError> {
        self.executor.ensure_on_worker("children")?;
        let path = self.lookup(id)?;
        let entries = fs::read_dir(&path).map_err(|e| map_io(e, id))?;

        // Permission-denied entries and broken symlinks are skipped.
        let mut children: Vec<ElementInfo> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.describe(&entry.path()).ok())
            .collect();
        sort_dirs_first(&mut children);
        Ok(children)
    }

    fn has_children(&self, id: &CanonicalId) -> Result<bool, ProviderError> {
        self.executor.ensure_on_worker("has_children")?;
        let path = self.lookup(id)?;
        Ok(dir_has_entries(&path))
    }

    fn subscribe(
        &self,
        id: &CanonicalId,
        handler: ChangeHandler,
    ) -> Result<SubscriptionId, ProviderError> {
        self.executor.ensure_on_worker("subscribe")?;
        let path = self.lookup(id)?;
        let mut registry = lock(&self.registry);

        if registry.watchers_of(&path) == 0 && path.is_dir() {
            if let Some(debouncer) = lock(&self.debouncer).as_mut() {
                debouncer
                    .watcher()
                    .watch(&path, notify::RecursiveMode::NonRecursive)
                    .map_err(|e| ProviderError::Watch(e.to_string()))?;
            }
        }

        let subscription = self.ids.next();
        registry.watches.insert(
            subscription,
            Watch {
                source: id.clone(),
                path,
                handler,
            },
        );
        Ok(subscription)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), ProviderError> {
        self.executor.ensure_on_worker("unsubscribe")?;
        let mut registry = lock(&self.registry);
        let Some(watch) = registry.watches.remove(&subscription) else {
            return Ok(());
        };
        if registry.watchers_of(&watch.path) == 0 {
            if let Some(debouncer) = lock(&self.debouncer).as_mut() {
                // The directory may already be gone; the watch died with it.
                let _ = debouncer.watcher().unwatch(&watch.path);
            }
        }
        Ok(())
    }

    fn subscription_count(&self) -> usize {
        lock(&self.registry).watches.len()
    }
}

/// Build the element description of `path`.
fn element_info(path: &Path) -> io::Result<ElementInfo> {
    let metadata = fs::symlink_metadata(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let kind = if metadata.is_symlink() {
        "symlink"
    } else if metadata.is_dir() {
        "directory"
    } else {
        "file"
    };

    Ok(ElementInfo {
        runtime_id: Some(runtime_id(path, &metadata)),
        name,
        kind: kind.to_string(),
        owner: owner(&metadata),
        has_children: metadata.is_dir() && dir_has_entries(path),
    })
}

#[cfg(unix)]
fn runtime_id(_path: &Path, metadata: &fs::Metadata) -> RuntimeId {
    use std::os::unix::fs::MetadataExt;
    RuntimeId::Ints(vec![metadata.dev() as i64, metadata.ino() as i64])
}

#[cfg(not(unix))]
fn runtime_id(path: &Path, _metadata: &fs::Metadata) -> RuntimeId {
    RuntimeId::Tokens(
        path.components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect(),
    )
}

#[cfg(unix)]
fn owner(metadata: &fs::Metadata) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    Some(format!("uid {}", metadata.uid()))
}

#[cfg(not(unix))]
fn owner(_metadata: &fs::Metadata) -> Option<String> {
    None
}

fn dir_has_entries(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn map_io(err: io::Error, id: &CanonicalId) -> ProviderError {
    match err.kind() {
        io::ErrorKind::NotFound => ProviderError::Vanished(id.clone()),
        io::ErrorKind::PermissionDenied => ProviderError::AccessDenied(id.clone()),
        _ => ProviderError::Io(err),
    }
}

/// Directories first, then case-insensitive by name.
fn sort_dirs_first(children: &mut [ElementInfo]) {
    children.sort_by(|a, b| {
        let a_dir = a.kind == "directory";
        let b_dir = b.kind == "directory";
        b_dir
            .cmp(&a_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

/// Turn one debounced batch into per-subscription notifications.
///
/// A path is a change to the children of the watch on its parent directory,
/// and an unspecified change for a watch on the path itself.
fn route_events(
    paths: &[PathBuf],
    registry: &WatchRegistry,
    index: &PathIndex,
    flood_threshold: usize,
) -> Vec<(ChangeHandler, StructureChange)> {
    let flooded = paths.len() > flood_threshold;
    let mut touched: HashMap<SubscriptionId, Vec<&PathBuf>> = HashMap::new();

    for (subscription, watch) in &registry.watches {
        for path in paths {
            if path.parent() == Some(watch.path.as_path()) || *path == watch.path {
                touched.entry(*subscription).or_default().push(path);
            }
        }
    }

    let mut changes = Vec::new();
    for (subscription, hits) in touched {
        let Some(watch) = registry.watches.get(&subscription) else {
            continue;
        };
        let (kind, affected) = match hits.as_slice() {
            [single] if !flooded && **single != watch.path => {
                if single.exists() {
                    let affected = element_info(single).ok().and_then(|info| info.id());
                    (ChangeKind::ChildAdded, affected)
                } else {
                    (ChangeKind::ChildRemoved, index.by_path.get(*single).cloned())
                }
            }
            _ => (ChangeKind::ChildrenInvalidated, None),
        };
        changes.push((
            watch.handler.clone(),
            StructureChange {
                source: watch.source.clone(),
                kind,
                affected,
            },
        ));
    }
    changes
}

/// Check if a path should be ignored based on ignore patterns.
///
/// A path is ignored if any of its components match any ignore pattern exactly.
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    path.components().any(|component| match component {
        std::path::Component::Normal(name) => {
            let name = name.to_string_lossy();
            patterns.iter().any(|pattern| name == pattern.as_str())
        }
        _ => false,
    })
}
