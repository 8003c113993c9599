//! Decides what to show for a path: readme fallback for directories,
//! nothing for binaries and missing paths, lines for text files.

use std::path::{Path, PathBuf};

use crate::index::{Entry, EntryKind};

/// Number of leading bytes inspected when classifying a file.
pub const SNIFF_LEN: usize = 8 * 1024;

/// Readme file name looked up (case-insensitively) in directories.
pub const README_NAME: &str = "readme.md";

/// What was found at a resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
    Missing,
}

/// The outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub current_path: PathBuf,
    pub kind: PathKind,
    pub content: Vec<String>,
}

impl Resolved {
    fn empty(path: &Path, kind: PathKind) -> Self {
        Self {
            current_path: path.to_path_buf(),
            kind,
            content: Vec::new(),
        }
    }
}

/// Resolve `path` to displayable content.
///
/// `entries` must be the listing of `path` when `path` is a directory; it
/// is searched for the readme instead of reading the directory again.
pub fn resolve(path: &Path, entries: &[Entry]) -> Resolved {
    let Ok(metadata) = std::fs::metadata(path) else {
        return Resolved::empty(path, PathKind::Missing);
    };

    if metadata.is_dir() {
        return match find_readme(path, entries) {
            Some(readme) => resolve(&readme.path, entries),
            None => Resolved::empty(path, PathKind::Directory),
        };
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "unreadable file");
            return Resolved::empty(path, PathKind::File);
        }
    };
    if is_binary(&bytes) {
        tracing::debug!(path = %path.display(), "binary file, showing nothing");
        return Resolved::empty(path, PathKind::File);
    }

    Resolved {
        current_path: path.to_path_buf(),
        kind: PathKind::File,
        content: split_lines(&String::from_utf8_lossy(&bytes)),
    }
}

/// Find the readme among the direct children of `dir`.
pub fn find_readme<'a>(dir: &Path, entries: &'a [Entry]) -> Option<&'a Entry> {
    entries.iter().find(|entry| {
        entry.kind == EntryKind::File
            && entry.path.parent() == Some(dir)
            && entry
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.eq_ignore_ascii_case(README_NAME))
    })
}

/// Classify bytes as binary.
///
/// Only the first [`SNIFF_LEN`] bytes are inspected. They are binary when
/// they contain a NUL byte or are not valid UTF-8. A multi-byte sequence
/// cut off by the sniff window is not held against the file.
pub fn is_binary(bytes: &[u8]) -> bool {
    let truncated = bytes.len() > SNIFF_LEN;
    let prefix = &bytes[..bytes.len().min(SNIFF_LEN)];
    if prefix.contains(&0) {
        return true;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => false,
        Err(err) => err.error_len().is_some() || !truncated,
    }
}

/// Split on `\n`, dropping a trailing `\r` from each line.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_owned())
        .collect()
}
