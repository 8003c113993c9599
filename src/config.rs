use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6041;
pub const DEFAULT_SCROLL_DEBOUNCE_MS: u64 = 150;

/// Where the cursor line is placed inside the browser viewport.
#[derive(
    clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SyncScrollMode {
    /// Cursor line at the top of the viewport
    Top,
    /// Cursor line vertically centered
    #[default]
    Middle,
    /// Cursor line at the same relative height as in the editor window
    Relative,
}

impl SyncScrollMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Middle => "middle",
            Self::Relative => "relative",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scroll_debounce_ms: Option<u64>,
    pub disable_sync_scroll: bool,
    pub sync_scroll_mode: Option<SyncScrollMode>,
}

impl ConfigFlags {
    pub fn union(&self, other: &Self) -> Self {
        Self {
            host: other.host.clone().or_else(|| self.host.clone()),
            port: other.port.or(self.port),
            scroll_debounce_ms: other.scroll_debounce_ms.or(self.scroll_debounce_ms),
            disable_sync_scroll: self.disable_sync_scroll || other.disable_sync_scroll,
            sync_scroll_mode: other.sync_scroll_mode.or(self.sync_scroll_mode),
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn scroll_debounce_ms(&self) -> u64 {
        self.scroll_debounce_ms.unwrap_or(DEFAULT_SCROLL_DEBOUNCE_MS)
    }

    pub fn sync_scroll_mode(&self) -> SyncScrollMode {
        self.sync_scroll_mode.unwrap_or_default()
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("tandem").join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("tandem")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("tandem").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config").join("tandem").join("config");
        }
    }

    PathBuf::from(".tandemrc")
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".tandemrc")
}

pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = Vec::new();
    lines.push("# tandem defaults (saved with --save)".to_string());
    if let Some(host) = &flags.host {
        lines.push(format!("--host {host}"));
    }
    if let Some(port) = flags.port {
        lines.push(format!("--port {port}"));
    }
    if let Some(ms) = flags.scroll_debounce_ms {
        lines.push(format!("--scroll-debounce-ms {ms}"));
    }
    if flags.disable_sync_scroll {
        lines.push("--disable-sync-scroll".to_string());
    }
    if let Some(mode) = flags.sync_scroll_mode {
        lines.push(format!("--sync-scroll-mode {}", mode.as_str()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Extract the persistable flags from raw arguments.
///
/// Unknown tokens (the file argument, `--save`, `--root`) are skipped, and
/// a value that does not parse leaves the flag unset.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        let (name, inline_value) = match token.split_once('=') {
            Some((name, value)) if name.starts_with("--") => (name, Some(value)),
            _ => match token.strip_prefix("-p") {
                // `-p 7000`, `-p7000` and `-p=7000`
                Some("") => ("--port", None),
                Some(value) => ("--port", Some(value.strip_prefix('=').unwrap_or(value))),
                None => (token, None),
            },
        };
        if name == "--disable-sync-scroll" {
            flags.disable_sync_scroll = true;
            i += 1;
            continue;
        }
        if !matches!(
            name,
            "--host" | "--port" | "--scroll-debounce-ms" | "--sync-scroll-mode"
        ) {
            i += 1;
            continue;
        }
        let value = match inline_value {
            Some(value) => Some(value),
            None => {
                i += 1;
                tokens.get(i).map(String::as_str)
            }
        };
        if let Some(value) = value {
            match name {
                "--host" => flags.host = Some(value.to_string()),
                "--port" => flags.port = value.parse().ok(),
                "--scroll-debounce-ms" => flags.scroll_debounce_ms = value.parse().ok(),
                _ => flags.sync_scroll_mode = parse_sync_scroll_mode(value),
            }
        }
        i += 1;
    }
    flags
}

fn parse_sync_scroll_mode(s: &str) -> Option<SyncScrollMode> {
    match s {
        "top" => Some(SyncScrollMode::Top),
        "middle" => Some(SyncScrollMode::Middle),
        "relative" => Some(SyncScrollMode::Relative),
        _ => None,
    }
}
