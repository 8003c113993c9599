//! Session wiring.
//!
//! [`App`] collects the settings, [`App::bind`] claims the port and builds
//! the initial state, and [`Session::run`] drives the three tasks of a
//! session until it ends:
//! - the relay, which owns the state,
//! - the WebSocket server,
//! - the editor link reading stdin.
//!
//! All three share one [`CancellationToken`]; whichever ends the session
//! cancels it and the others wind down.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SCROLL_DEBOUNCE_MS, SyncScrollMode};
use crate::editor;
use crate::error::{Error, Result};
use crate::relay::Relay;
use crate::server::Server;
use crate::state::{BrowserState, SessionOptions};

/// Settings for one preview session.
#[derive(Debug, Clone)]
pub struct App {
    root: PathBuf,
    file_path: PathBuf,
    host: String,
    port: u16,
    scroll_debounce: Duration,
    sync_scroll_mode: SyncScrollMode,
    disable_sync_scroll: bool,
}

impl App {
    /// Preview `file_path`, never navigating outside `root`.
    pub fn new(root: PathBuf, file_path: PathBuf) -> Self {
        Self {
            root,
            file_path,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            scroll_debounce: Duration::from_millis(DEFAULT_SCROLL_DEBOUNCE_MS),
            sync_scroll_mode: SyncScrollMode::default(),
            disable_sync_scroll: false,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Delay between the last cursor move and the browser update.
    pub const fn with_scroll_debounce(mut self, delay: Duration) -> Self {
        self.scroll_debounce = delay;
        self
    }

    pub const fn with_sync_scroll(mut self, mode: SyncScrollMode, disabled: bool) -> Self {
        self.sync_scroll_mode = mode;
        self.disable_sync_scroll = disabled;
        self
    }

    /// Bind the listener and build the initial state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoot`] if the root is not a directory and
    /// [`Error::Bind`] if the port is taken.
    pub async fn bind(self) -> Result<Session> {
        if !self.root.is_dir() {
            return Err(Error::InvalidRoot(self.root));
        }
        let server = Server::bind(&self.host, self.port).await?;
        let options = SessionOptions {
            root: self.root,
            initial_path: self.file_path,
            disable_sync_scroll: self.disable_sync_scroll,
            sync_scroll_mode: self.sync_scroll_mode,
        };
        let state = tokio::task::spawn_blocking(move || BrowserState::init(options)).await?;
        Ok(Session {
            server,
            state,
            scroll_debounce: self.scroll_debounce,
        })
    }

    /// Run a session connected to the editor over stdio, stopping early on
    /// Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails or a session task fails.
    pub async fn run(self) -> Result<()> {
        let session = self.bind().await?;
        let addr = session.local_addr()?;
        tracing::info!(url = %format!("ws://{addr}"), "preview ready");

        let shutdown = CancellationToken::new();
        let interrupt = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(err) = signal {
                        tracing::warn!(%err, "cannot listen for Ctrl-C");
                        return;
                    }
                    tracing::info!("interrupted");
                    interrupt.cancel();
                }
                () = interrupt.cancelled() => {}
            }
        });

        session
            .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
            .await
    }
}

/// A bound, initialized session waiting to run.
#[derive(Debug)]
pub struct Session {
    server: Server,
    state: BrowserState,
    scroll_debounce: Duration,
}

impl Session {
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    pub const fn state(&self) -> &BrowserState {
        &self.state
    }

    /// Run until the editor leaves, the buffer closes or `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns the first error from the editor link, the relay or the
    /// server. The other tasks are still shut down cleanly.
    pub async fn run<R, W>(self, reader: R, writer: W, shutdown: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (relay, handle) = Relay::new(self.state, self.scroll_debounce, shutdown.clone());
        let relay_task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                let result = relay.run().await;
                shutdown.cancel();
                result
            }
        });
        let server_task = tokio::spawn(self.server.run(handle.clone(), shutdown.clone()));

        let editor_result = editor::pump(reader, writer, handle, shutdown.clone()).await;
        if let Err(err) = &editor_result {
            tracing::warn!(%err, "editor link failed");
            shutdown.cancel();
        }

        let relay_result = relay_task.await?;
        let server_result = server_task.await?;
        tracing::info!("session ended");
        editor_result.and(relay_result).and(server_result)
    }
}
