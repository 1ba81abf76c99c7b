//! File watcher for configuration sources.
//!
//! Watches the search directories for changes to files that belong to the
//! factory's base name (`<base>`, `<base>-<profile>`, and their `.def`
//! variants, in any supported extension).
//!
//! Emits events through a tokio watch channel when changes are detected.
//! Uses debouncing to coalesce rapid file changes.

use super::loader::{DEFAULTS_SUFFIX, SOURCE_EXTENSIONS};
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Event types emitted when configuration sources change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceChangeEvent {
    /// One source file changed, appeared, or was removed
    SourceChanged(PathBuf),
    /// Multiple source files changed in quick succession
    BatchChange(Vec<PathBuf>),
    /// Watcher encountered an error
    Error(String),
}

impl SourceChangeEvent {
    /// Returns true if this event requires a reload.
    pub fn requires_reload(&self) -> bool {
        !matches!(self, SourceChangeEvent::Error(_))
    }

    /// Get the affected paths for this event.
    pub fn affected_paths(&self) -> Vec<&Path> {
        match self {
            SourceChangeEvent::SourceChanged(p) => vec![p.as_path()],
            SourceChangeEvent::BatchChange(paths) => paths.iter().map(|p| p.as_path()).collect(),
            SourceChangeEvent::Error(_) => vec![],
        }
    }
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// What to watch.
#[derive(Debug, Clone)]
pub struct WatchPaths {
    /// Directories holding configuration sources
    pub dirs: Vec<PathBuf>,
    /// Base resource name whose files trigger events
    pub base_name: String,
}

/// Handle to control the source watcher.
pub struct SourceWatcherHandle {
    /// Receiver for change events.
    /// Cloning this receiver will allow multiple consumers to receive events.
    pub events: watch::Receiver<Option<SourceChangeEvent>>,
    /// Handle to the watcher task (dropping this will stop the watcher).
    _task_handle: tokio::task::JoinHandle<()>,
}

impl SourceWatcherHandle {
    /// Wait for the next change event.
    pub async fn wait_for_change(&mut self) -> Option<SourceChangeEvent> {
        // Skip the initial None value
        loop {
            if self.events.changed().await.is_err() {
                return None; // Sender dropped
            }
            let event = self.events.borrow().clone();
            if event.is_some() {
                return event;
            }
        }
    }
}

/// Starts the source file watcher.
///
/// Must be called from within a tokio runtime. Directories that do not
/// exist are skipped with a warning.
pub fn start_source_watcher(
    paths: WatchPaths,
    config: WatcherConfig,
) -> Result<SourceWatcherHandle, notify::Error> {
    let (event_tx, event_rx) = watch::channel(None);
    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer = new_debouncer(config.debounce_duration, notify_tx)?;
    let watcher = debouncer.watcher();

    for dir in &paths.dirs {
        if dir.exists() {
            info!("Watching configuration directory: {}", dir.display());
            watcher.watch(dir, notify::RecursiveMode::NonRecursive)?;
        } else {
            warn!(
                "Configuration directory does not exist, skipping watch: {}",
                dir.display()
            );
        }
    }

    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, event_tx, &paths);
    });

    Ok(SourceWatcherHandle {
        events: event_rx,
        _task_handle: task_handle,
    })
}

/// Process events from the notify debouncer and convert to SourceChangeEvents.
fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>>,
    tx: watch::Sender<Option<SourceChangeEvent>>,
    paths: &WatchPaths,
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                if let Some(event) = classify_events(events, paths) {
                    debug!("Source change detected: {:?}", event);
                    if tx.send(Some(event)).is_err() {
                        info!("Source watcher receiver dropped, stopping");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                let _ = tx.send(Some(SourceChangeEvent::Error(e.to_string())));
            }
            Err(_) => {
                info!("Source watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Collapse a debounced batch into at most one event.
fn classify_events(
    events: Vec<notify_debouncer_mini::DebouncedEvent>,
    paths: &WatchPaths,
) -> Option<SourceChangeEvent> {
    let mut changed: Vec<PathBuf> = events
        .into_iter()
        .filter(|event| {
            matches!(
                event.kind,
                DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
            )
        })
        .map(|event| event.path)
        .filter(|path| is_source_file(path, &paths.base_name))
        .collect();
    changed.dedup();

    match changed.len() {
        0 => None,
        1 => changed.pop().map(SourceChangeEvent::SourceChanged),
        _ => Some(SourceChangeEvent::BatchChange(changed)),
    }
}

/// True for `<base>[-<profile>][.def].<ext>` with a supported extension.
pub fn is_source_file(path: &Path, base_name: &str) -> bool {
    let extension = path.extension().and_then(|e| e.to_str());
    if !extension.is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext)) {
        return false;
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    let defaults_suffix = format!(".{}", DEFAULTS_SUFFIX);
    let stem = stem.strip_suffix(defaults_suffix.as_str()).unwrap_or(stem);
    stem == base_name
        || stem
            .strip_prefix(base_name)
            .is_some_and(|rest| rest.starts_with('-') && rest.len() > 1)
}
