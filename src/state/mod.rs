//! The mirrored browser state and its transitions.
//!
//! [`BrowserState`] is the single record of what the browser shows. Its
//! fields are only written by [`BrowserState::transition`],
//! [`BrowserState::replace_content`] and [`BrowserState::refresh_from_disk`];
//! each returns the [`WsServerMessage`] describing what changed.

mod message;

pub use message::{WireEntry, WsBrowserRequest, WsServerMessage};

use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use crate::config::SyncScrollMode;
use crate::index::{self, Entry};
use crate::resolver::{self, PathKind};

/// Label used when the repository name cannot be determined.
pub const NO_REPO_NAME: &str = "no-repo-name";

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Absolute, normalized navigation boundary
    pub root: PathBuf,
    pub initial_path: PathBuf,
    pub disable_sync_scroll: bool,
    pub sync_scroll_mode: SyncScrollMode,
}

/// Cursor position reported by the editor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorSync {
    /// 0-based line in the buffer
    pub line: usize,
    /// Fraction of the editor window above the cursor, for relative scrolling
    pub top_offset_pct: Option<f64>,
}

impl CursorSync {
    pub const fn at_line(line: usize) -> Self {
        Self {
            line,
            top_offset_pct: None,
        }
    }

    /// Build from the editor's window geometry. `win_line` is the 1-based
    /// screen row of the cursor inside a window `win_height` rows tall.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_window(line: usize, win_line: usize, win_height: usize) -> Self {
        let top_offset_pct = (win_height > 0)
            .then(|| (win_line.saturating_sub(1) as f64 / win_height as f64).clamp(0.0, 1.0));
        Self {
            line,
            top_offset_pct,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserState {
    root: PathBuf,
    listing_dir: PathBuf,
    entries: Vec<Entry>,
    current_path: PathBuf,
    current_kind: PathKind,
    content: Vec<String>,
    cursor_line: Option<usize>,
    top_offset_pct: Option<f64>,
    repo_name: String,
    disable_sync_scroll: bool,
    sync_scroll_mode: SyncScrollMode,
    /// The current path was requested with a trailing separator
    requested_as_dir: bool,
}

impl BrowserState {
    /// Build the initial state: repo label, listing and content for the
    /// initial path, no cursor.
    pub fn init(options: SessionOptions) -> Self {
        let root = options.root.canonicalize().unwrap_or(options.root);
        let current = index::clamp_to_root(&root, &options.initial_path);
        let repo_name = repo_name(&root);
        let listing_dir = index::listing_dir(&root, &current);
        let entries = index::list(&root, &current);
        let resolved = resolver::resolve(&current, &entries);

        tracing::info!(
            root = %root.display(),
            path = %resolved.current_path.display(),
            repo = %repo_name,
            entries = entries.len(),
            "session initialized"
        );

        Self {
            root,
            listing_dir,
            entries,
            current_path: resolved.current_path,
            current_kind: resolved.kind,
            content: resolved.content,
            cursor_line: None,
            top_offset_pct: None,
            repo_name,
            disable_sync_scroll: options.disable_sync_scroll,
            sync_scroll_mode: options.sync_scroll_mode,
            requested_as_dir: ends_with_separator(&options.initial_path),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub const fn current_kind(&self) -> PathKind {
        self.current_kind
    }

    pub fn content(&self) -> &[String] {
        &self.content
    }

    pub const fn cursor_line(&self) -> Option<usize> {
        self.cursor_line
    }

    pub const fn top_offset_pct(&self) -> Option<f64> {
        self.top_offset_pct
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    /// Move to `new_path` with a new cursor.
    ///
    /// The message always carries the cursor, the content and the current
    /// path; it carries entries only when the listed directory changed.
    /// A `content_override` (the editor's live buffer) is used verbatim
    /// instead of reading the file, unless `new_path` lies outside the root:
    /// then the override is discarded and the root is shown from disk.
    pub fn transition(
        &mut self,
        new_path: &Path,
        cursor: Option<CursorSync>,
        content_override: Option<Vec<String>>,
    ) -> WsServerMessage {
        self.cursor_line = cursor.map(|c| c.line);
        self.top_offset_pct = cursor.and_then(|c| c.top_offset_pct);

        let mut message = WsServerMessage {
            cursor_line: Some(self.cursor_line),
            top_offset_pct: Some(self.top_offset_pct),
            ..WsServerMessage::default()
        };
        self.apply_path(new_path, content_override, &mut message);
        message
    }

    /// Replace the content with the editor's live buffer, leaving the cursor
    /// alone.
    pub fn replace_content(&mut self, path: &Path, lines: Vec<String>) -> WsServerMessage {
        let mut message = WsServerMessage::default();
        self.apply_path(path, Some(lines), &mut message);
        message
    }

    /// Re-read the current file from disk after it changed underneath us.
    pub fn refresh_from_disk(&mut self) -> WsServerMessage {
        let path = self.current_path.clone();
        let mut message = WsServerMessage::default();
        self.apply_path(&path, None, &mut message);
        message
    }

    /// Every field, for a newly attached browser.
    pub fn snapshot(&self) -> WsServerMessage {
        WsServerMessage {
            repo_name: Some(self.repo_name.clone()),
            entries: Some(self.wire_entries()),
            current_path: Some(self.wire_current_path()),
            content: Some(self.content.clone()),
            cursor_line: Some(self.cursor_line),
            top_offset_pct: Some(self.top_offset_pct),
            disable_sync_scroll: Some(self.disable_sync_scroll),
            sync_scroll_mode: Some(self.sync_scroll_mode),
            goodbye: None,
        }
    }

    fn apply_path(
        &mut self,
        new_path: &Path,
        content_override: Option<Vec<String>>,
        message: &mut WsServerMessage,
    ) {
        let requested_as_dir = ends_with_separator(new_path);
        let (new_path, content_override) = match index::contain(&self.root, new_path) {
            Some(path) => (path, content_override),
            None => {
                tracing::warn!(path = %new_path.display(), "path outside root, showing root");
                (self.root.clone(), None)
            }
        };

        if new_path != self.current_path {
            let dir = index::listing_dir(&self.root, &new_path);
            if dir != self.listing_dir {
                tracing::debug!(dir = %dir.display(), "directory changed");
                self.entries = index::list(&self.root, &new_path);
                self.listing_dir = dir;
                message.entries = Some(self.wire_entries());
            }
        }

        if let Some(lines) = content_override {
            self.current_path = new_path;
            self.current_kind = PathKind::File;
            self.content = lines;
        } else {
            let resolved = resolver::resolve(&new_path, &self.entries);
            self.current_path = resolved.current_path;
            self.current_kind = resolved.kind;
            self.content = resolved.content;
        }

        self.requested_as_dir = requested_as_dir;
        message.content = Some(self.content.clone());
        message.current_path = Some(self.wire_current_path());
    }

    fn wire_entries(&self) -> Vec<WireEntry> {
        self.entries
            .iter()
            .map(|entry| WireEntry {
                relative_to_root: relative_to(&self.root, &entry.path),
                kind: entry.kind,
            })
            .collect()
    }

    /// Absolute path; directories, and missing paths requested as
    /// directories, carry a trailing separator.
    fn wire_current_path(&self) -> String {
        let mut path = self.current_path.to_string_lossy().into_owned();
        let dir_like = match self.current_kind {
            PathKind::Directory => true,
            PathKind::Missing => self.requested_as_dir,
            PathKind::File => false,
        };
        if dir_like && !path.ends_with(MAIN_SEPARATOR) {
            path.push(MAIN_SEPARATOR);
        }
        path
    }
}

fn ends_with_separator(path: &Path) -> bool {
    path.as_os_str()
        .to_string_lossy()
        .ends_with(|c: char| c == '/' || c == MAIN_SEPARATOR)
}

/// `path` relative to `root`, `/`-separated.
fn relative_to(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Read the `origin` remote from `.git/config` and turn it into an
/// `owner/repo` label.
pub fn repo_name(root: &Path) -> String {
    let config_path = root.join(".git").join("config");
    match std::fs::read_to_string(&config_path) {
        Ok(config) => parse_origin(&config).unwrap_or_else(|| {
            tracing::debug!(path = %config_path.display(), "no usable origin remote");
            NO_REPO_NAME.to_string()
        }),
        Err(err) => {
            tracing::debug!(path = %config_path.display(), %err, "repo name unavailable");
            NO_REPO_NAME.to_string()
        }
    }
}

fn parse_origin(config: &str) -> Option<String> {
    let mut in_origin = false;
    for line in config.lines().map(str::trim) {
        if line.starts_with('[') {
            in_origin = line == "[remote \"origin\"]";
            continue;
        }
        if !in_origin {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() == "url" {
            return repo_from_url(value.trim());
        }
    }
    None
}

fn repo_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let path = match trimmed.split_once("://") {
        Some((_, rest)) => rest.split_once('/')?.1,
        None => trimmed.rsplit_once(':')?.1,
    };
    let path = path.trim_start_matches('/');
    (!path.is_empty()).then(|| path.to_string())
}
