//! Reload in-memory routes when the configuration file changes.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use eyre::{Result, WrapErr, eyre};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    adapters::memory_store::InMemoryRouteStore, config::loader::load_config,
    ports::reloader::Reloader,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Emits a unit event whenever the watched file is created, modified or removed.
pub struct ConfigWatcher {
    path: PathBuf,
    // dropping the watcher stops the notifications
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<()>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, events) = mpsc::channel(1);
        let file_name = path
            .file_name()
            .ok_or_else(|| eyre!("Invalid config path: {}", path.display()))?
            .to_owned();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        let relevant = (event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(file_name.as_os_str()));
                        if relevant {
                            tracing::debug!(kind = ?event.kind, "Config file changed");
                            // a pending event already covers this one
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Config watch error"),
                }
            })?;

        // watch the directory so editors that replace the file are still seen
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .wrap_err_with(|| format!("Failed to watch {}", dir.display()))?;

        Ok(Self {
            path,
            _watcher: watcher,
            events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next change; `None` once the watcher is gone.
    pub async fn changed(&mut self) -> Option<()> {
        self.events.recv().await
    }

    fn drain(&mut self) {
        while self.events.try_recv().is_ok() {}
    }
}

/// Re-read `routes:` from `path`, replace the store contents, and reload.
///
/// A file that fails to parse leaves the store untouched.
pub async fn sync_routes(
    path: &Path,
    store: &InMemoryRouteStore,
    reloader: &dyn Reloader,
) -> Result<usize> {
    let path_str = path
        .to_str()
        .ok_or_else(|| eyre!("Invalid UTF-8 path: {}", path.display()))?;
    let config = load_config(path_str).await?;
    store.replace_routes(config.routes).await;
    reloader.reload().await.wrap_err("Reload after config change failed")
}

/// Run the watch loop in the background.
///
/// Bursts of change events are coalesced: after the first event the loop waits
/// `debounce`, discards anything queued meanwhile, then syncs once.
pub fn spawn_route_sync(
    mut watcher: ConfigWatcher,
    store: Arc<InMemoryRouteStore>,
    reloader: Arc<dyn Reloader>,
    debounce: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(path = %watcher.path().display(), "Watching config file for route changes");
        while watcher.changed().await.is_some() {
            tokio::time::sleep(debounce).await;
            watcher.drain();

            match sync_routes(watcher.path(), &store, reloader.as_ref()).await {
                Ok(routes) => tracing::info!(routes, "Routes reloaded from config file"),
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to apply config change, keeping current routes")
                }
            }
        }
        tracing::info!("Config watcher stopped");
    })
}
