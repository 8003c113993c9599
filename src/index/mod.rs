//! Directory listing for the browser's navigation sidebar.
//!
//! Listings honor gitignore rules rooted at the session root, never list
//! `.git`, and are ordered directories-first. That ordering is part of
//! the wire protocol: the browser renders entries in the order received.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

/// Whether an [`Entry`] is a directory or a file.
///
/// Directories sort before files, so the derived `Ord` is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "dir")]
    Directory,
    #[serde(rename = "file")]
    File,
}

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Absolute path
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl Entry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }
}

/// List the directory that `current_path` lives in (or `current_path`
/// itself when it is a directory).
///
/// Only immediate children are returned. A directory outside `root` is
/// replaced by `root`; an unreadable directory yields an empty listing.
pub fn list(root: &Path, current_path: &Path) -> Vec<Entry> {
    let dir = listing_dir(root, current_path);
    let walker = WalkBuilder::new(&dir)
        .max_depth(Some(1))
        .hidden(false)
        .parents(true)
        .ignore(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir())
            || (entry.path_is_symlink() && entry.path().is_dir());
        let kind = if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        entries.push(Entry {
            path: entry.into_path(),
            kind,
        });
    }

    order_entries(entries)
}

/// The directory whose children make up the listing for `current_path`.
pub fn listing_dir(root: &Path, current_path: &Path) -> PathBuf {
    let dir = if current_path.is_dir() {
        current_path.to_path_buf()
    } else {
        current_path
            .parent()
            .map_or_else(|| root.to_path_buf(), Path::to_path_buf)
    };
    if dir.starts_with(root) {
        dir
    } else {
        root.to_path_buf()
    }
}

/// Directories first, then files; each group sorted by full path.
pub fn order_entries(entries: Vec<Entry>) -> Vec<Entry> {
    let (mut dirs, mut files): (Vec<_>, Vec<_>) = entries.into_iter().partition(Entry::is_dir);
    dirs.sort_by(|a, b| a.path.cmp(&b.path));
    files.sort_by(|a, b| a.path.cmp(&b.path));
    dirs.extend(files);
    dirs
}

/// Resolve `requested` to a path under `root`.
///
/// Relative paths are joined onto `root` and `.`/`..` are collapsed. The
/// longest existing prefix is then canonicalized, so aliases and symlinks
/// resolve to the same path as the (canonical) root while a file that does
/// not exist yet keeps its name. Returns `None` when the result lies
/// outside `root`.
pub fn contain(root: &Path, requested: &Path) -> Option<PathBuf> {
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let resolved = canonicalize_existing(&normalize(&joined));
    resolved.starts_with(root).then_some(resolved)
}

/// [`contain`], with anything outside `root` replaced by `root` itself.
pub fn clamp_to_root(root: &Path, requested: &Path) -> PathBuf {
    contain(root, requested).unwrap_or_else(|| root.to_path_buf())
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn canonicalize_existing(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
