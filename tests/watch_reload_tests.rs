//! Integration tests for reloads driven by the source watcher.
//!
//! Sources are rewritten on disk while a reloader task runs; the test polls
//! the same handle until it observes the new object.

use confgraph::config::FactorySettings;
use confgraph::config::watcher::WatcherConfig;
use confgraph::reloader::watch_and_reload;
use confgraph::{ConfigurationFactory, DryRunContainer, IndirectionHandle, ObjectSpec};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const WAIT_LIMIT: Duration = Duration::from_secs(10);

fn write(dir: &Path, content: &str) {
    fs::write(dir.join("app.yaml"), content).expect("Failed to write source file");
}

fn key_of(handle: &IndirectionHandle<ObjectSpec>) -> Option<String> {
    handle.with(|spec| {
        spec.property("key")
            .and_then(|p| p.as_literal())
            .and_then(|v| v.as_str())
            .map(str::to_string)
    })
}

/// Poll `check` until it holds or the wait limit passes.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_file_change_retargets_handle() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app: {_type: Holder, _proxy: true, key: value1}\n");

    let settings = FactorySettings::default()
        .with_base_name("app")
        .with_search_dirs([dir.path().to_path_buf()]);
    let shared = ConfigurationFactory::builder(DryRunContainer::new())
        .settings(settings.clone())
        .load()
        .unwrap()
        .into_shared();
    let handle = shared.lock().unwrap().get_handle("app").unwrap();
    assert_eq!(key_of(&handle).as_deref(), Some("value1"));

    let config = WatcherConfig {
        debounce_duration: Duration::from_millis(50),
    };
    let reloader = watch_and_reload(shared.clone(), &settings, config).unwrap();

    write(dir.path(), "app: {_type: Holder, _proxy: true, key: value2}\n");
    assert!(eventually(|| key_of(&handle).as_deref() == Some("value2")).await);

    // Deleting the source drops the object but the handle keeps its target.
    fs::remove_file(dir.path().join("app.yaml")).unwrap();
    assert!(eventually(|| shared.lock().unwrap().indirection_ids().count() == 0).await);
    assert_eq!(key_of(&handle).as_deref(), Some("value2"));

    write(dir.path(), "app: {_type: Holder, _proxy: true, key: value3}\n");
    assert!(eventually(|| key_of(&handle).as_deref() == Some("value3")).await);
    assert!(handle.same_handle(&shared.lock().unwrap().get_handle("app").unwrap()));

    reloader.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_broken_source_keeps_serving_until_fixed() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app: {_type: Holder, _proxy: true, key: good}\n");

    let settings = FactorySettings::default()
        .with_base_name("app")
        .with_search_dirs([dir.path().to_path_buf()]);
    let shared = ConfigurationFactory::builder(DryRunContainer::new())
        .settings(settings.clone())
        .load()
        .unwrap()
        .into_shared();
    let handle = shared.lock().unwrap().get_handle("app").unwrap();

    let config = WatcherConfig {
        debounce_duration: Duration::from_millis(50),
    };
    let reloader = watch_and_reload(shared.clone(), &settings, config).unwrap();

    write(dir.path(), "app: [broken\n");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(key_of(&handle).as_deref(), Some("good"));
    assert!(!reloader.is_finished());

    write(dir.path(), "app: {_type: Holder, _proxy: true, key: fixed}\n");
    assert!(eventually(|| key_of(&handle).as_deref() == Some("fixed")).await);

    reloader.abort();
}
