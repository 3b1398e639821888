//! Serde types for the Claude CLI's native stream-json protocol.

use serde::Deserialize;
use serde_json::Value;

/// An assistant or user message body.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One content block inside a message.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub input: Option<Value>,
}

impl ContentBlock {
    pub fn is_text(&self) -> bool {
        self.block_type == "text"
    }

    pub fn is_tool_use(&self) -> bool {
        self.block_type == "tool_use"
    }

    pub fn is_tool_result(&self) -> bool {
        self.block_type == "tool_result"
    }
}
