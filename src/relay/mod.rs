//! Event relay between the editor and attached browsers.
//!
//! One dispatcher task owns the [`BrowserState`] and consumes a single
//! channel of [`RelayEvent`]s. Each event is fully handled before the next
//! is read, so state transitions never interleave and every client sees
//! messages in processing order.
//!
//! - Text changes are pushed immediately.
//! - Cursor moves are debounced (trailing edge, single slot).
//! - The latest text of every edited buffer is remembered and shown in
//!   place of the disk copy whenever the editor returns to that buffer.
//! - Buffer close, the editor's before-exit request and the shutdown token
//!   all end the session: a `goodbye` is broadcast, connections are closed,
//!   and nothing is sent afterward.

mod debounce;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::index;
use crate::resolver::PathKind;
use crate::state::{BrowserState, CursorSync, WsBrowserRequest, WsServerMessage};
use crate::watcher::FileWatcher;

use debounce::Debouncer;

/// Delay between a disk change notification and re-reading the file.
const DISK_DEBOUNCE: Duration = Duration::from_millis(200);

pub type ClientId = u64;

/// Notifications originating in the editor.
#[derive(Debug)]
pub enum EditorEvent {
    /// The buffer at `path` was edited; `content` is its full text.
    TextChanged { path: PathBuf, content: Vec<String> },
    /// The cursor moved. `content` is set when the editor switched to a
    /// buffer it has not sent before; later moves in that buffer reuse it.
    CursorMoved {
        path: PathBuf,
        cursor: CursorSync,
        content: Option<Vec<String>>,
    },
    /// The previewed buffer was closed.
    BufferClosed,
    /// The editor is about to exit; `ack` fires once the session is down.
    BeforeExit { ack: oneshot::Sender<()> },
}

/// Connection lifecycle and requests from browsers.
#[derive(Debug)]
pub enum ClientEvent {
    Attach {
        id: ClientId,
        outbox: mpsc::UnboundedSender<Outbound>,
    },
    Request {
        id: ClientId,
        request: WsBrowserRequest,
    },
    Detach {
        id: ClientId,
    },
}

#[derive(Debug)]
pub enum RelayEvent {
    Editor(EditorEvent),
    Client(ClientEvent),
}

/// A frame queued for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized [`WsServerMessage`]
    Text(Arc<str>),
    /// Close the connection
    Close,
}

/// Cloneable sending side of the relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayHandle {
    /// A handle whose events land on the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the relay has stopped.
    pub fn editor(&self, event: EditorEvent) -> bool {
        self.tx.send(RelayEvent::Editor(event)).is_ok()
    }

    /// Attach a client; its snapshot is the first frame on the returned
    /// receiver.
    pub fn attach(&self, id: ClientId) -> Option<mpsc::UnboundedReceiver<Outbound>> {
        let (outbox, frames) = mpsc::unbounded_channel();
        self.tx
            .send(RelayEvent::Client(ClientEvent::Attach { id, outbox }))
            .ok()
            .map(|()| frames)
    }

    pub fn request(&self, id: ClientId, request: WsBrowserRequest) -> bool {
        self.tx
            .send(RelayEvent::Client(ClientEvent::Request { id, request }))
            .is_ok()
    }

    pub fn detach(&self, id: ClientId) {
        let _ = self.tx.send(RelayEvent::Client(ClientEvent::Detach { id }));
    }
}

#[derive(Debug)]
struct Client {
    id: ClientId,
    outbox: mpsc::UnboundedSender<Outbound>,
}

#[derive(Debug)]
struct PendingCursor {
    path: PathBuf,
    cursor: CursorSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The dispatcher. Create with [`Relay::new`], drive with [`Relay::run`].
#[derive(Debug)]
pub struct Relay {
    state: Arc<Mutex<BrowserState>>,
    root: PathBuf,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    clients: Vec<Client>,
    cursor: Debouncer<PendingCursor>,
    /// Latest editor text per buffer, keyed by contained path
    live: HashMap<PathBuf, Vec<String>>,
    /// The displayed content came from a live buffer
    showing_live: bool,
    disk: Debouncer<()>,
    disk_tx: mpsc::UnboundedSender<PathBuf>,
    disk_rx: mpsc::UnboundedReceiver<PathBuf>,
    watcher: Option<FileWatcher>,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(
        state: BrowserState,
        cursor_debounce: Duration,
        shutdown: CancellationToken,
    ) -> (Self, RelayHandle) {
        let (tx, events) = mpsc::unbounded_channel();
        let (disk_tx, disk_rx) = mpsc::unbounded_channel();
        let root = state.root().to_path_buf();
        let relay = Self {
            state: Arc::new(Mutex::new(state)),
            root,
            events,
            clients: Vec::new(),
            cursor: Debouncer::new(cursor_debounce),
            live: HashMap::new(),
            showing_live: false,
            disk: Debouncer::new(DISK_DEBOUNCE),
            disk_tx,
            disk_rx,
            watcher: None,
            shutdown,
        };
        (relay, RelayHandle { tx })
    }

    /// Process events until the session ends.
    ///
    /// # Errors
    ///
    /// Returns an error if a state transition panics on the blocking pool.
    pub async fn run(mut self) -> Result<()> {
        self.sync_watcher();
        loop {
            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return self.finish(Ok(())),
                Err(err) => {
                    tracing::warn!(%err, "relay failed");
                    return self.finish(Err(err));
                }
            }
        }
    }

    /// Wait for and handle the next event or timer.
    async fn step(&mut self) -> Result<Flow> {
        let cursor_deadline = self.cursor.deadline();
        let disk_deadline = self.disk.deadline();

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                tracing::info!("stop requested");
                Ok(Flow::Stop)
            }
            event = self.events.recv() => match event {
                Some(event) => self.handle(event).await,
                None => Ok(Flow::Stop),
            },
            Some(path) = self.disk_rx.recv() => {
                self.on_disk_change(&path);
                Ok(Flow::Continue)
            }
            () = sleep_until(cursor_deadline.unwrap_or_else(Instant::now)),
                if cursor_deadline.is_some() => self.flush_cursor().await,
            () = sleep_until(disk_deadline.unwrap_or_else(Instant::now)),
                if disk_deadline.is_some() => self.flush_disk().await,
        }
    }

    /// Tear the session down and pass `outcome` through.
    fn finish(&mut self, outcome: Result<()>) -> Result<()> {
        self.teardown();
        outcome
    }

    async fn handle(&mut self, event: RelayEvent) -> Result<Flow> {
        match event {
            RelayEvent::Editor(EditorEvent::TextChanged { path, content }) => {
                let Some(path) = self.contain(&path) else {
                    return Ok(Flow::Continue);
                };
                tracing::debug!(path = %path.display(), lines = content.len(), "text changed");
                self.live.insert(path.clone(), content.clone());
                let message = self
                    .apply(move |state| state.replace_content(&path, content))
                    .await?;
                self.showing_live = true;
                self.broadcast(&message);
                self.sync_watcher();
            }
            RelayEvent::Editor(EditorEvent::CursorMoved {
                path,
                cursor,
                content,
            }) => {
                let Some(path) = self.contain(&path) else {
                    return Ok(Flow::Continue);
                };
                if let Some(content) = content {
                    self.live.insert(path.clone(), content);
                }
                self.cursor
                    .queue(PendingCursor { path, cursor }, Instant::now());
            }
            RelayEvent::Editor(EditorEvent::BufferClosed) => {
                tracing::info!("buffer closed");
                return Ok(Flow::Stop);
            }
            RelayEvent::Editor(EditorEvent::BeforeExit { ack }) => {
                tracing::info!("editor exiting");
                self.teardown();
                let _ = ack.send(());
                return Ok(Flow::Stop);
            }
            RelayEvent::Client(ClientEvent::Attach { id, outbox }) => {
                let snapshot = self.lock_state().snapshot();
                if send_message(&outbox, &snapshot) {
                    tracing::info!(client = id, clients = self.clients.len() + 1, "client attached");
                    self.clients.push(Client { id, outbox });
                }
            }
            RelayEvent::Client(ClientEvent::Request {
                id,
                request: WsBrowserRequest::GetEntry { path },
            }) => {
                tracing::debug!(client = id, %path, "entry requested");
                let target = index::clamp_to_root(&self.root, Path::new(&path));
                let message = self
                    .apply(move |state| state.transition(&target, None, None))
                    .await?;
                self.showing_live = false;
                self.broadcast(&message);
                self.sync_watcher();
            }
            RelayEvent::Client(ClientEvent::Detach { id }) => {
                self.clients.retain(|client| client.id != id);
                tracing::info!(client = id, clients = self.clients.len(), "client detached");
            }
        }
        Ok(Flow::Continue)
    }

    async fn flush_cursor(&mut self) -> Result<Flow> {
        let Some(PendingCursor { path, cursor }) = self.cursor.take_ready(Instant::now()) else {
            return Ok(Flow::Continue);
        };
        tracing::debug!(path = %path.display(), line = cursor.line, "cursor sync");
        let content = self.live.get(&path).cloned();
        self.showing_live = content.is_some();
        let message = self
            .apply(move |state| state.transition(&path, Some(cursor), content))
            .await?;
        self.broadcast(&message);
        self.sync_watcher();
        Ok(Flow::Continue)
    }

    fn on_disk_change(&mut self, path: &Path) {
        let watching = self
            .watcher
            .as_ref()
            .is_some_and(|_| self.lock_state().current_path() == path);
        if watching {
            self.disk.queue((), Instant::now());
        }
    }

    async fn flush_disk(&mut self) -> Result<Flow> {
        if self.disk.take_ready(Instant::now()).is_none() || self.watcher.is_none() {
            return Ok(Flow::Continue);
        }
        tracing::debug!("displayed file changed on disk");
        let message = self.apply(BrowserState::refresh_from_disk).await?;
        self.broadcast(&message);
        Ok(Flow::Continue)
    }

    /// Run a state operation on the blocking pool; it may read the disk.
    async fn apply<F>(&self, operation: F) -> Result<WsServerMessage>
    where
        F: FnOnce(&mut BrowserState) -> WsServerMessage + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let message = tokio::task::spawn_blocking(move || {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            operation(&mut state)
        })
        .await?;
        Ok(message)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The path of an editor buffer under the root, or `None` (logged) when
    /// the buffer lives elsewhere.
    fn contain(&self, path: &Path) -> Option<PathBuf> {
        let contained = index::contain(&self.root, path);
        if contained.is_none() {
            tracing::warn!(path = %path.display(), "ignoring buffer outside root");
        }
        contained
    }

    /// Watch the displayed file when it came from disk, and only then.
    fn sync_watcher(&mut self) {
        let (path, from_disk) = {
            let state = self.lock_state();
            let from_disk = state.current_kind() == PathKind::File && !self.showing_live;
            (state.current_path().to_path_buf(), from_disk)
        };

        if !from_disk {
            if self.watcher.take().is_some() {
                self.disk.cancel();
                tracing::debug!("stopped watching disk");
            }
            return;
        }
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if self
            .watcher
            .as_ref()
            .is_some_and(|w| w.target_path() == canonical)
        {
            return;
        }

        self.disk.cancel();
        match FileWatcher::new(&path, self.disk_tx.clone()) {
            Ok(watcher) => {
                tracing::debug!(path = %path.display(), "watching disk");
                self.watcher = Some(watcher);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "watch unavailable");
                self.watcher = None;
            }
        }
    }

    fn broadcast(&mut self, message: &WsServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        self.clients.retain(|client| {
            let delivered = client.outbox.send(Outbound::Text(Arc::clone(&frame))).is_ok();
            if !delivered {
                tracing::warn!(client = client.id, "connection lost, dropping client");
            }
            delivered
        });
    }

    /// End the session. Safe to call more than once; only the first call
    /// sends anything.
    fn teardown(&mut self) {
        if self.cursor.is_pending() {
            tracing::debug!("dropping pending cursor sync");
        }
        self.cursor.cancel();
        self.disk.cancel();
        self.watcher = None;
        self.events.close();

        if !self.clients.is_empty() {
            self.broadcast(&WsServerMessage::goodbye());
            for client in self.clients.drain(..) {
                let _ = client.outbox.send(Outbound::Close);
            }
        }
        self.shutdown.cancel();
    }
}

fn encode(message: &WsServerMessage) -> Option<Arc<str>> {
    match message.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(err) => {
            tracing::warn!(%err, "failed to encode message");
            None
        }
    }
}

fn send_message(outbox: &mpsc::UnboundedSender<Outbound>, message: &WsServerMessage) -> bool {
    encode(message).is_some_and(|frame| outbox.send(Outbound::Text(frame)).is_ok())
}

#[cfg(test)]
mod tests;
