//! Line-delimited JSON link to the editor.
//!
//! The editor plugin writes one JSON object per line on our stdin. Most are
//! notifications forwarded to the relay as-is; `before_exit` is a request
//! and gets a `{"id":N,"result":null}` reply on stdout once the session has
//! shut down, so the editor can block its own exit on it.
//!
//! ```text
//! {"event":"text_changed","path":"/repo/README.md","content":["# Title"]}
//! {"event":"cursor_moved","path":"/repo/README.md","line":0,"winLine":1,"winHeight":40}
//! {"event":"buffer_closed"}
//! {"event":"before_exit","id":3}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::relay::{EditorEvent, RelayHandle};
use crate::state::CursorSync;

/// One line from the editor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EditorNotification {
    TextChanged {
        path: PathBuf,
        content: Vec<String>,
    },
    /// `line` is 0-based. `winLine` (1-based) and `winHeight` describe where
    /// the cursor sits in the editor window and feed relative scrolling.
    #[serde(rename_all = "camelCase")]
    CursorMoved {
        path: PathBuf,
        line: usize,
        #[serde(default)]
        win_line: Option<usize>,
        #[serde(default)]
        win_height: Option<usize>,
        /// Sent when the editor switched to a buffer not shown before
        #[serde(default)]
        content: Option<Vec<String>>,
    },
    BufferClosed,
    BeforeExit {
        id: u64,
    },
}

#[derive(Debug, Serialize)]
struct Reply {
    id: u64,
    result: (),
}

impl EditorNotification {
    /// The relay event for a notification. `None` for `before_exit`, which
    /// needs an acknowledgement channel.
    fn into_event(self) -> Option<EditorEvent> {
        match self {
            Self::TextChanged { path, content } => Some(EditorEvent::TextChanged { path, content }),
            Self::CursorMoved {
                path,
                line,
                win_line,
                win_height,
                content,
            } => {
                let cursor = match (win_line, win_height) {
                    (Some(win_line), Some(win_height)) => {
                        CursorSync::from_window(line, win_line, win_height)
                    }
                    _ => CursorSync::at_line(line),
                };
                Some(EditorEvent::CursorMoved {
                    path,
                    cursor,
                    content,
                })
            }
            Self::BufferClosed => Some(EditorEvent::BufferClosed),
            Self::BeforeExit { .. } => None,
        }
    }
}

/// Read editor messages from `reader` until EOF, `before_exit`, or
/// `shutdown`, forwarding them to `relay`.
///
/// EOF means the editor went away, so it cancels `shutdown`.
///
/// # Errors
///
/// Returns an error if reading the input or writing a reply fails.
pub async fn pump<R, W>(
    reader: R,
    mut writer: W,
    relay: RelayHandle,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("editor input closed");
            shutdown.cancel();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let notification = match serde_json::from_str::<EditorNotification>(line) {
            Ok(notification) => notification,
            Err(err) => {
                tracing::warn!(%err, "skipping malformed editor message");
                continue;
            }
        };

        if let EditorNotification::BeforeExit { id } = notification {
            let (ack, acked) = oneshot::channel();
            if relay.editor(EditorEvent::BeforeExit { ack }) {
                // A dropped sender means the relay already stopped
                let _ = acked.await;
            }
            write_reply(&mut writer, id).await?;
            break;
        }

        if let Some(event) = notification.into_event()
            && !relay.editor(event)
        {
            tracing::debug!("relay stopped, ignoring editor message");
        }
    }
    Ok(())
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, id: u64) -> Result<()> {
    let mut reply = serde_json::to_vec(&Reply { id, result: () })?;
    reply.push(b'\n');
    writer.write_all(&reply).await?;
    writer.flush().await?;
    Ok(())
}
