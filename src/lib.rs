// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. state::BrowserState)
    clippy::module_name_repetitions
)]

//! # Tandem
//!
//! Live browser preview that follows the buffer and cursor of a text editor.
//!
//! The editor streams buffer edits and cursor moves over stdio; tandem keeps
//! a mirror of what the browser should show and pushes minimal JSON diffs to
//! every connected browser over WebSocket.
//!
//! ## Architecture
//!
//! One relay task owns the [`state::BrowserState`] and consumes a single
//! event channel:
//! - **Editor events**: text changes (pushed immediately), cursor moves
//!   (debounced), buffer close and editor exit (end the session)
//! - **Client events**: attach, `getEntry` requests, detach
//!
//! ## Modules
//!
//! - [`app`]: Session wiring and startup
//! - [`config`]: Persisted CLI defaults
//! - [`editor`]: Editor link over stdio
//! - [`index`]: Directory listings honoring ignore rules
//! - [`links`]: Link classification for rendered content
//! - [`relay`]: Event dispatch, debouncing and broadcast
//! - [`resolver`]: What to display for a path
//! - [`scroll`]: Line-to-pixel offset mapping for sync scrolling
//! - [`server`]: WebSocket listener
//! - [`state`]: Mirrored browser state and wire messages
//! - [`watcher`]: File watching

pub mod app;
pub mod config;
pub mod editor;
pub mod error;
pub mod index;
pub mod links;
pub mod relay;
pub mod resolver;
pub mod scroll;
pub mod server;
pub mod state;
pub mod watcher;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::{App, Session};
    pub use crate::config::SyncScrollMode;
    pub use crate::state::{BrowserState, WsBrowserRequest, WsServerMessage};
}
