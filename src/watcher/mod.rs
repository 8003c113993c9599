//! Watches the displayed file when its content came from disk.
//!
//! Uses notify crate for cross-platform file system events. Change
//! notifications are forwarded to the relay, which debounces them.
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

/// Watches a single file and reports its path whenever it changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    target_path: PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("target_path", &self.target_path)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Create a watcher for `path` that sends `path` on `changes` for every
    /// relevant event.
    ///
    /// # Errors
    /// Returns an error if the file watcher cannot be created or the path cannot be watched.
    pub fn new(path: impl AsRef<Path>, changes: UnboundedSender<PathBuf>) -> notify::Result<Self> {
        // Canonicalize so event paths from the OS (which are always absolute
        // and canonical) match our stored paths.
        let target_path = path
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| path.as_ref().to_path_buf());
        let filter = EventFilter::new(&target_path);
        let reported = path.as_ref().to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if filter.is_relevant(&event) => {
                let _ = changes.send(reported.clone());
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(%err, "watch error"),
        })?;
        watcher.watch(&watch_root_for(&target_path), RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            target_path,
        })
    }

    /// The canonical path of the file being watched.
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }
}

#[derive(Debug, Clone)]
struct EventFilter {
    watch_root: PathBuf,
    target_path: PathBuf,
    target_name: Option<OsString>,
}

impl EventFilter {
    fn new(target_path: &Path) -> Self {
        Self {
            watch_root: watch_root_for(target_path),
            target_path: target_path.to_path_buf(),
            target_name: target_path.file_name().map(std::ffi::OsStr::to_os_string),
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        // Our own reads show up as access events
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.iter().any(|path| {
            path == &self.watch_root
                || path == &self.target_path
                || self
                    .target_name
                    .as_ref()
                    .is_some_and(|name| path.file_name().is_some_and(|f| f == name))
        })
    }
}

fn watch_root_for(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
