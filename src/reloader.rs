//! Hot reload driven by the source watcher.
//!
//! One task consumes watcher events and reloads the shared factory on a
//! blocking thread. The factory's mutex serializes reloads, so triggers
//! that arrive during a reload queue behind it.

use crate::config::FactorySettings;
use crate::config::watcher::{
    SourceWatcherHandle, WatchPaths, WatcherConfig, start_source_watcher,
};
use crate::container::ObjectContainer;
use crate::error::Result;
use crate::factory::SharedFactory;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Reload a shared factory, waiting for any reload already running.
pub fn reload_shared<C: ObjectContainer>(factory: &SharedFactory<C>) -> Result<()> {
    let mut factory = factory.lock().unwrap_or_else(|e| e.into_inner());
    factory.reload()
}

/// Spawn a task that reloads `factory` whenever `watcher` reports a change.
///
/// Failed reloads are logged and the task keeps running; handles keep
/// their last good targets until a later reload succeeds.
pub fn spawn_reloader<C>(
    factory: SharedFactory<C>,
    mut watcher: SourceWatcherHandle,
) -> JoinHandle<()>
where
    C: ObjectContainer + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = watcher.wait_for_change().await {
            if !event.requires_reload() {
                warn!("Source watcher reported: {:?}", event);
                continue;
            }
            info!(paths = ?event.affected_paths(), "Configuration sources changed, reloading");

            let factory = Arc::clone(&factory);
            match tokio::task::spawn_blocking(move || reload_shared(&factory)).await {
                Ok(Ok(())) => info!("Configuration reloaded successfully"),
                Ok(Err(e)) => warn!(
                    code = ?e.code(),
                    "Configuration reload failed: {}. Keeping current handle targets.",
                    e
                ),
                Err(e) => error!("Configuration reload task panicked: {}", e),
            }
        }
        info!("Source watcher stopped; hot reload disabled");
    })
}

/// Watch the settings' search directories and reload `factory` on change.
///
/// Must be called from within a tokio runtime.
pub fn watch_and_reload<C>(
    factory: SharedFactory<C>,
    settings: &FactorySettings,
    config: WatcherConfig,
) -> std::result::Result<JoinHandle<()>, notify::Error>
where
    C: ObjectContainer + Send + 'static,
{
    let paths = WatchPaths {
        dirs: settings.search_dirs.clone(),
        base_name: settings.base_name.clone(),
    };
    let watcher = start_source_watcher(paths, config)?;
    info!("Source watcher started for hot reload");
    Ok(spawn_reloader(factory, watcher))
}
