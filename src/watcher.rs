//! Rebuilds the registry when templates or data stores change on disk.

use log::{debug, info, warn};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::paths::{DATA_STORE_EXT, TEMPLATE_EXT};

/// Whether a change at `path` should trigger a rebuild.
pub fn is_relevant(root: &Path, path: &Path) -> bool {
    if !path.starts_with(root) {
        return false;
    }
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEMPLATE_EXT) || name.ends_with(DATA_STORE_EXT))
}

/// Runs `rebuild` then `reload` once if any of `paths` is relevant.
/// Returns whether a rebuild happened.
pub fn on_paths<I, P>(root: &Path, paths: I, rebuild: &mut dyn FnMut(), reload: &mut dyn FnMut()) -> bool
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let changed = paths.into_iter().find(|p| is_relevant(root, p.as_ref()));
    match changed {
        Some(path) => {
            info!("Change detected in {:?}, rebuilding", path.as_ref());
            rebuild();
            reload();
            true
        }
        None => false,
    }
}

/// Debounced recursive watcher over the template root.
pub struct ChangeWatcher {
    root: PathBuf,
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::Receiver<Vec<PathBuf>>,
}

impl ChangeWatcher {
    pub fn new(root: &Path, config: &WatchConfig) -> Result<Self, WatchError> {
        // Events arrive with canonical paths.
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let (event_tx, event_rx) = mpsc::channel();

        let mut debouncer = new_debouncer(
            Duration::from_millis(config.debounce_ms),
            move |res: Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    if event_tx.send(paths).is_err() {
                        debug!("Event receiver dropped, stopping watcher");
                    }
                }
                Err(e) => warn!("Filesystem watch error: {}", e),
            },
        )
        .map_err(WatchError::Create)?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Watch {
                path: root.clone(),
                source,
            })?;

        info!(
            "Watching {:?} for changes (debounce {} ms)",
            root, config.debounce_ms
        );

        Ok(Self {
            root,
            _debouncer: debouncer,
            event_rx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blocks, rebuilding after every batch that touches a template or data
    /// store. Returns when the underlying watcher goes away.
    pub fn run(&self, rebuild: &mut dyn FnMut(), reload: &mut dyn FnMut()) {
        while let Ok(paths) = self.event_rx.recv() {
            on_paths(&self.root, paths, rebuild, reload);
        }
    }

    /// Waits up to `timeout` for one batch and handles it.
    pub fn poll(&self, timeout: Duration, rebuild: &mut dyn FnMut(), reload: &mut dyn FnMut()) -> bool {
        match self.event_rx.recv_timeout(timeout) {
            Ok(paths) => on_paths(&self.root, paths, rebuild, reload),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_relevant() {
        let root = Path::new("/app/emails");
        assert!(is_relevant(root, Path::new("/app/emails/welcome.vue")));
        assert!(is_relevant(root, Path::new("/app/emails/a/b.data.ts")));
        assert!(!is_relevant(root, Path::new("/app/emails/notes.md")));
        assert!(!is_relevant(root, Path::new("/app/emails/helper.ts")));
        assert!(!is_relevant(root, Path::new("/app/pages/index.vue")));
    }

    #[test]
    fn test_on_paths_rebuilds_once_per_batch() {
        let root = Path::new("/app/emails");
        let mut rebuilds = 0;
        let mut reloads = 0;
        let batch = [
            "/app/emails/a.vue",
            "/app/emails/a.data.ts",
            "/app/emails/b.vue",
        ];
        let hit = on_paths(root, batch, &mut || rebuilds += 1, &mut || reloads += 1);
        assert!(hit);
        assert_eq!((rebuilds, reloads), (1, 1));
    }

    #[test]
    fn test_on_paths_ignores_irrelevant_batch() {
        let root = Path::new("/app/emails");
        let mut rebuilds = 0;
        let hit = on_paths(
            root,
            ["/app/emails/readme.md", "/tmp/x.vue"],
            &mut || rebuilds += 1,
            &mut || {},
        );
        assert!(!hit);
        assert_eq!(rebuilds, 0);
    }

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        let watcher = ChangeWatcher::new(dir.path(), &WatchConfig::default());
        assert!(watcher.is_ok());
    }

    #[test]
    fn test_watching_missing_root_fails() {
        let dir = tempdir().unwrap();
        let result = ChangeWatcher::new(&dir.path().join("missing"), &WatchConfig::default());
        assert!(matches!(result, Err(WatchError::Watch { .. })));
    }
}
