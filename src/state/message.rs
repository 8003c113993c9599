//! Wire types exchanged with the browser.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::SyncScrollMode;
use crate::index::EntryKind;

/// A navigation entry as the browser sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEntry {
    pub relative_to_root: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Server → browser message.
///
/// Every field is optional: absence means "unchanged". `cursor_line` and
/// `top_offset_pct` distinguish absent (`None`) from an explicit `null`
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<WireEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub cursor_line: Option<Option<usize>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub top_offset_pct: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_sync_scroll: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_scroll_mode: Option<SyncScrollMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goodbye: Option<bool>,
}

impl WsServerMessage {
    /// The terminal message of a session.
    pub fn goodbye() -> Self {
        Self {
            goodbye: Some(true),
            ..Self::default()
        }
    }

    pub fn is_goodbye(&self) -> bool {
        self.goodbye == Some(true)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Browser → server request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsBrowserRequest {
    /// Show `path` (absolute, or relative to the root).
    GetEntry { path: String },
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
