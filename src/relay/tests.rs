use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::SyncScrollMode;
use crate::error::{Error, Result};
use crate::index::EntryKind;
use crate::state::{
    BrowserState, CursorSync, SessionOptions, WireEntry, WsBrowserRequest, WsServerMessage,
};

use super::{ClientId, EditorEvent, Outbound, Relay, RelayHandle};

const DEBOUNCE: Duration = Duration::from_millis(100);

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    handle: RelayHandle,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

/// root/
///   docs/guide.md
///   README.md
///   notes.md
fn repo() -> (TempDir, PathBuf, BrowserState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().canonicalize().expect("canonicalize");
    fs::create_dir(root.join("docs")).unwrap();
    fs::write(root.join("docs/guide.md"), "# Guide").unwrap();
    fs::write(root.join("README.md"), "# Repo").unwrap();
    fs::write(root.join("notes.md"), "one\ntwo").unwrap();

    let state = BrowserState::init(SessionOptions {
        root: root.clone(),
        initial_path: root.join("README.md"),
        disable_sync_scroll: false,
        sync_scroll_mode: SyncScrollMode::Middle,
    });
    (dir, root, state)
}

fn start() -> Fixture {
    let (dir, root, state) = repo();
    let shutdown = CancellationToken::new();
    let (relay, handle) = Relay::new(state, DEBOUNCE, shutdown.clone());
    let task = tokio::spawn(relay.run());
    Fixture {
        _dir: dir,
        root,
        handle,
        shutdown,
        task,
    }
}

async fn next_frame(rx: &mut UnboundedReceiver<Outbound>) -> Option<Outbound> {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("frame within timeout")
}

async fn next_message(rx: &mut UnboundedReceiver<Outbound>) -> WsServerMessage {
    match next_frame(rx).await {
        Some(Outbound::Text(text)) => serde_json::from_str(&text).expect("valid json"),
        other => panic!("expected a message, got {other:?}"),
    }
}

async fn assert_quiet(rx: &mut UnboundedReceiver<Outbound>) {
    assert!(
        timeout(Duration::from_secs(1), rx.recv()).await.is_err(),
        "no further frames expected"
    );
}

async fn attach(handle: &RelayHandle, id: ClientId) -> UnboundedReceiver<Outbound> {
    let mut rx = handle.attach(id).expect("relay running");
    let snapshot = next_message(&mut rx).await;
    assert!(snapshot.repo_name.is_some(), "first frame must be the snapshot");
    rx
}

fn cursor_moved(path: PathBuf, line: usize) -> EditorEvent {
    EditorEvent::CursorMoved {
        path,
        cursor: CursorSync::at_line(line),
        content: None,
    }
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test(start_paused = true)]
async fn test_attach_receives_snapshot_first() {
    let f = start();
    let mut rx = f.handle.attach(1).unwrap();

    let snapshot = next_message(&mut rx).await;
    assert_eq!(snapshot.content, Some(lines(&["# Repo"])));
    assert_eq!(
        snapshot.current_path,
        Some(f.root.join("README.md").to_string_lossy().into_owned())
    );
    assert_eq!(snapshot.entries.map(|e| e.len()), Some(3));
    assert_eq!(snapshot.cursor_line, Some(None));
    assert_eq!(snapshot.sync_scroll_mode, Some(SyncScrollMode::Middle));
    assert_quiet(&mut rx).await;
}

#[tokio::test(start_paused = true)]
async fn test_rapid_cursor_moves_collapse_into_one_message() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    let mut last_sent = Instant::now();
    for line in 0..5 {
        assert!(f.handle.editor(cursor_moved(f.root.join("README.md"), line)));
        last_sent = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let message = next_message(&mut rx).await;
    let elapsed = last_sent.elapsed();
    assert_eq!(message.cursor_line, Some(Some(4)), "only the last position is sent");
    assert!(
        elapsed >= DEBOUNCE && elapsed < DEBOUNCE + Duration::from_millis(50),
        "sent one debounce delay after the last move, got {elapsed:?}"
    );
    assert_quiet(&mut rx).await;
}

#[tokio::test(start_paused = true)]
async fn test_text_change_is_pushed_without_delay() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;
    let sent = Instant::now();

    f.handle.editor(EditorEvent::TextChanged {
        path: f.root.join("README.md"),
        content: lines(&["# Repo", "typed"]),
    });

    let message = next_message(&mut rx).await;
    assert_eq!(sent.elapsed(), Duration::ZERO);
    assert_eq!(message.content, Some(lines(&["# Repo", "typed"])));
    assert!(message.cursor_line.is_none(), "cursor untouched by edits");
    assert!(message.current_path.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_text_change_then_cursor_move_arrive_in_order() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.handle.editor(EditorEvent::TextChanged {
        path: f.root.join("README.md"),
        content: lines(&["edited"]),
    });
    f.handle.editor(cursor_moved(f.root.join("README.md"), 0));

    let first = next_message(&mut rx).await;
    assert!(first.cursor_line.is_none());
    assert_eq!(first.content, Some(lines(&["edited"])));

    let second = next_message(&mut rx).await;
    assert_eq!(second.cursor_line, Some(Some(0)));
    assert_eq!(
        second.content,
        Some(lines(&["edited"])),
        "cursor sync keeps the live buffer over the disk copy"
    );
}

#[tokio::test(start_paused = true)]
async fn test_cursor_move_into_new_buffer_uses_its_content() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.handle.editor(EditorEvent::CursorMoved {
        path: f.root.join("notes.md"),
        cursor: CursorSync::from_window(1, 2, 10),
        content: Some(lines(&["live", "buffer"])),
    });

    let message = next_message(&mut rx).await;
    assert_eq!(message.content, Some(lines(&["live", "buffer"])));
    assert_eq!(message.cursor_line, Some(Some(1)));
    assert_eq!(message.top_offset_pct, Some(Some(0.1)));
    assert!(message.entries.is_none(), "same directory as before");
}

#[tokio::test(start_paused = true)]
async fn test_buffer_closed_sends_single_goodbye_and_closes() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.handle.editor(EditorEvent::BufferClosed);

    let goodbye = next_message(&mut rx).await;
    assert_eq!(goodbye, WsServerMessage::goodbye());
    assert_eq!(next_frame(&mut rx).await, Some(Outbound::Close));
    assert_eq!(next_frame(&mut rx).await, None, "nothing after goodbye");

    f.task.await.unwrap().unwrap();
    assert!(f.shutdown.is_cancelled());
    assert!(!f.handle.editor(EditorEvent::BufferClosed));
    assert!(f.handle.attach(2).is_none(), "no reattach after goodbye");
}

#[tokio::test(start_paused = true)]
async fn test_pending_cursor_is_dropped_on_close() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.handle.editor(cursor_moved(f.root.join("README.md"), 3));
    f.handle.editor(EditorEvent::BufferClosed);

    assert!(next_message(&mut rx).await.is_goodbye());
    assert_eq!(next_frame(&mut rx).await, Some(Outbound::Close));
    assert_eq!(next_frame(&mut rx).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_before_exit_is_acknowledged_after_goodbye() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;
    let (ack, acked) = oneshot::channel();

    f.handle.editor(EditorEvent::BeforeExit { ack });

    assert!(next_message(&mut rx).await.is_goodbye());
    timeout(Duration::from_secs(5), acked)
        .await
        .expect("ack within timeout")
        .expect("relay acknowledged");
    f.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_token_tears_down_session() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.shutdown.cancel();

    assert!(next_message(&mut rx).await.is_goodbye());
    assert_eq!(next_frame(&mut rx).await, Some(Outbound::Close));
    f.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_get_entry_request_navigates_and_broadcasts() {
    let f = start();
    let mut first = attach(&f.handle, 1).await;
    let mut second = attach(&f.handle, 2).await;

    f.handle.request(
        1,
        WsBrowserRequest::GetEntry {
            path: "docs".to_string(),
        },
    );

    for rx in [&mut first, &mut second] {
        let message = next_message(rx).await;
        assert_eq!(
            message.entries,
            Some(vec![WireEntry {
                relative_to_root: "docs/guide.md".to_string(),
                kind: EntryKind::File,
            }])
        );
        assert_eq!(message.content, Some(Vec::new()));
        assert_eq!(
            message.current_path,
            Some(format!("{}{}", f.root.join("docs").display(), std::path::MAIN_SEPARATOR))
        );
        assert_eq!(message.cursor_line, Some(None));
    }
}

#[tokio::test(start_paused = true)]
async fn test_get_entry_outside_root_stays_inside() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.handle.request(
        1,
        WsBrowserRequest::GetEntry {
            path: "../../etc/passwd".to_string(),
        },
    );

    let message = next_message(&mut rx).await;
    let current = PathBuf::from(message.current_path.unwrap());
    assert!(current.starts_with(&f.root));
}

#[tokio::test(start_paused = true)]
async fn test_new_client_snapshot_reflects_current_state() {
    let f = start();
    let mut first = attach(&f.handle, 1).await;
    f.handle.editor(EditorEvent::TextChanged {
        path: f.root.join("README.md"),
        content: lines(&["fresh"]),
    });
    next_message(&mut first).await;

    let mut late = f.handle.attach(2).unwrap();
    let snapshot = next_message(&mut late).await;
    assert_eq!(snapshot.content, Some(lines(&["fresh"])));
}

#[tokio::test(start_paused = true)]
async fn test_lost_client_does_not_block_others() {
    let f = start();
    let first = attach(&f.handle, 1).await;
    let mut second = attach(&f.handle, 2).await;
    drop(first);

    f.handle.editor(EditorEvent::TextChanged {
        path: f.root.join("README.md"),
        content: lines(&["still here"]),
    });

    let message = next_message(&mut second).await;
    assert_eq!(message.content, Some(lines(&["still here"])));
}

#[tokio::test(start_paused = true)]
async fn test_detached_client_receives_nothing() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;
    f.handle.detach(1);

    f.handle.editor(EditorEvent::TextChanged {
        path: f.root.join("README.md"),
        content: lines(&["x"]),
    });

    assert_eq!(next_frame(&mut rx).await, None, "outbox dropped on detach");
}

#[tokio::test]
async fn test_disk_change_refreshes_displayed_file() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    // Give the watch backend time to register
    tokio::time::sleep(Duration::from_millis(300)).await;
    fs::write(f.root.join("README.md"), "# Repo\nchanged on disk").unwrap();

    let message = next_message(&mut rx).await;
    assert_eq!(message.content, Some(lines(&["# Repo", "changed on disk"])));
    assert!(message.cursor_line.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_returning_to_edited_buffer_keeps_unsaved_text() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.handle.editor(EditorEvent::TextChanged {
        path: f.root.join("README.md"),
        content: lines(&["UNSAVED"]),
    });
    next_message(&mut rx).await;

    f.handle.editor(EditorEvent::CursorMoved {
        path: f.root.join("notes.md"),
        cursor: CursorSync::at_line(0),
        content: Some(lines(&["notes buffer"])),
    });
    assert_eq!(next_message(&mut rx).await.content, Some(lines(&["notes buffer"])));

    f.handle.editor(cursor_moved(f.root.join("README.md"), 0));
    let back = next_message(&mut rx).await;
    assert_eq!(back.content, Some(lines(&["UNSAVED"])), "live text beats the disk copy");
    assert_eq!(back.cursor_line, Some(Some(0)));
}

#[tokio::test(start_paused = true)]
async fn test_get_entry_reads_disk_copy_of_edited_buffer() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;

    f.handle.editor(EditorEvent::TextChanged {
        path: f.root.join("README.md"),
        content: lines(&["UNSAVED"]),
    });
    next_message(&mut rx).await;

    f.handle.request(
        1,
        WsBrowserRequest::GetEntry {
            path: "README.md".to_string(),
        },
    );
    let message = next_message(&mut rx).await;
    assert_eq!(message.content, Some(lines(&["# Repo"])));
    assert_eq!(message.cursor_line, Some(None));
}

#[tokio::test(start_paused = true)]
async fn test_buffer_outside_root_is_ignored() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;
    let other = tempfile::tempdir().unwrap();

    f.handle.editor(EditorEvent::TextChanged {
        path: other.path().join("elsewhere.md"),
        content: lines(&["leak"]),
    });
    f.handle.editor(cursor_moved(other.path().join("elsewhere.md"), 3));

    assert_quiet(&mut rx).await;
}

#[cfg(unix)]
#[tokio::test(start_paused = true)]
async fn test_buffer_reached_through_symlink_maps_to_root() {
    let f = start();
    let mut rx = attach(&f.handle, 1).await;
    let aliases = tempfile::tempdir().unwrap();
    let link = aliases.path().join("repo");
    std::os::unix::fs::symlink(&f.root, &link).unwrap();

    f.handle.editor(EditorEvent::TextChanged {
        path: link.join("README.md"),
        content: lines(&["via link"]),
    });

    let message = next_message(&mut rx).await;
    assert_eq!(
        message.current_path,
        Some(f.root.join("README.md").to_string_lossy().into_owned())
    );
    assert_eq!(message.content, Some(lines(&["via link"])));
}

#[tokio::test(start_paused = true)]
async fn test_failed_state_operation_still_says_goodbye() {
    let (_dir, _root, state) = repo();
    let (mut relay, handle) = Relay::new(state, DEBOUNCE, CancellationToken::new());
    let mut rx = handle.attach(1).unwrap();
    assert_eq!(relay.step().await.unwrap(), super::Flow::Continue);
    next_message(&mut rx).await;

    let err = relay
        .apply(|_: &mut BrowserState| -> WsServerMessage { panic!("state operation failed") })
        .await
        .unwrap_err();
    let outcome = relay.finish(Err(err));

    assert!(matches!(outcome, Err(Error::Join(_))));
    assert!(next_message(&mut rx).await.is_goodbye());
    assert_eq!(next_frame(&mut rx).await, Some(Outbound::Close));
    assert!(relay.shutdown.is_cancelled());
}
