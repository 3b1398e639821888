//! Serde types for the Codex CLI's native JSONL protocol.

use serde::Deserialize;
use serde_json::Value;

/// One item inside an `item.started` / `item.completed` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct CodexItem {
    #[serde(rename = "type", alias = "item_type")]
    pub item_type: String,
    pub text: Option<String>,
    pub command: Option<String>,
    #[serde(alias = "file_path")]
    pub path: Option<String>,
    #[serde(alias = "name")]
    pub tool_name: Option<String>,
    pub exit_code: Option<i64>,
}

impl CodexItem {
    /// Parse an item out of an envelope payload, tolerating both
    /// `{"item": {...}}` nesting and a bare item object.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let raw = payload.get("item").unwrap_or(payload);
        serde_json::from_value(raw.clone()).ok()
    }
}
