//! Tandem - live browser preview that follows your editor.
//!
//! # Usage
//!
//! ```bash
//! tandem README.md
//! tandem --port 7000 --sync-scroll-mode relative docs/guide.md
//! tandem --root ~/src/project --save
//! ```
//!
//! The editor plugin spawns this process and talks to it over stdio; logs
//! go to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use tandem::app::App;
use tandem::config::{
    ConfigFlags, SyncScrollMode, clear_config_flags, global_config_path, load_config_flags,
    local_override_path, parse_flag_tokens, save_config_flags,
};

/// Live browser preview that follows your editor's buffer and cursor
#[derive(Parser, Debug)]
#[command(name = "tandem", version, about, long_about = None)]
struct Cli {
    /// File or directory to show first (defaults to the current directory)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Navigation boundary (defaults to the enclosing git repository)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Delay between the last cursor move and the browser scrolling
    #[arg(long, value_name = "MS")]
    scroll_debounce_ms: Option<u64>,

    /// Do not scroll the browser along with the cursor
    #[arg(long)]
    disable_sync_scroll: bool,

    /// Where the cursor line lands in the browser viewport
    #[arg(long, value_enum)]
    sync_scroll_mode: Option<SyncScrollMode>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

/// The nearest ancestor of `start` holding a `.git` entry, or `start`'s
/// directory when there is none.
fn discover_root(start: &Path) -> PathBuf {
    let dir = if start.is_dir() {
        start
    } else {
        start.parent().unwrap_or(start)
    };
    dir.ancestors()
        .find(|candidate| candidate.join(".git").exists())
        .unwrap_or(dir)
        .to_path_buf()
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}

fn main() -> Result<()> {
    // stdout belongs to the editor link
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    let file = absolute(&cli.file.unwrap_or_else(|| PathBuf::from(".")))?;
    let root = match cli.root {
        Some(root) => absolute(&root)?,
        None => discover_root(&file),
    };
    if !root.is_dir() {
        anyhow::bail!("Root is not a directory: {}", root.display());
    }

    let app = App::new(root, file)
        .with_host(effective.host())
        .with_port(effective.port())
        .with_scroll_debounce(Duration::from_millis(effective.scroll_debounce_ms()))
        .with_sync_scroll(effective.sync_scroll_mode(), effective.disable_sync_scroll);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(app.run());
    // The stdin reader thread blocks until the editor writes again
    runtime.shutdown_timeout(Duration::from_millis(100));

    result.context("Session error")
}
