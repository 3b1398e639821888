//! Canonical event taxonomy shared by all vendor adapters.
//!
//! Vendor-native JSONL lines are translated into [`StreamEvent`]s by the
//! adapter parsers; vendor shapes never leak past that boundary. Every
//! variant keeps the original vendor-shaped payload in `data` so consumers
//! that need vendor detail can still reach it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized protocol unit in the streaming output.
///
/// Lifecycle events the vendor format implies but does not state (e.g. a
/// turn starting) are synthesized by the parsers and look no different to
/// consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StreamEvent {
    /// A new conversation thread was started; carries the vendor session id.
    ThreadStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        data: Value,
    },

    /// A turn (one prompt and its full response) began.
    TurnStarted { data: Value },

    /// A turn finished; terminal for the invocation.
    TurnCompleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        data: Value,
    },

    /// Assistant output. The only event kind that contributes text deltas.
    AssistantMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        data: Value,
    },

    /// User-role content echoed back by the vendor (tool results and the like).
    UserMessage { data: Value },

    /// A tool invocation began.
    ToolStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        data: Value,
    },

    /// A tool invocation finished.
    ToolCompleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        data: Value,
    },

    /// A file was created or modified by the agent.
    FileEvent {
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        data: Value,
    },

    /// Any vendor event with no specific canonical mapping.
    Generic { event_type: String, data: Value },
}

impl StreamEvent {
    /// Text delta carried by this event, if any.
    ///
    /// Only assistant messages ever produce text; terminal/summary events
    /// must not, or already-streamed content would be double-counted.
    pub fn text_delta(&self) -> Option<&str> {
        match self {
            Self::AssistantMessage { text, .. } => text.as_deref(),
            _ => None,
        }
    }

    /// True for events that end a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnCompleted { .. })
    }
}

/// Token usage reported by the vendor for a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

impl Usage {
    /// Read token counts out of a vendor `usage` object, tolerating absent
    /// fields. Returns `None` when nothing usable is present.
    pub fn from_value(value: &Value) -> Option<Self> {
        let input_tokens = value.get("input_tokens").and_then(Value::as_u64);
        let output_tokens = value.get("output_tokens").and_then(Value::as_u64);
        if input_tokens.is_none() && output_tokens.is_none() {
            return None;
        }
        Some(Self {
            input_tokens,
            output_tokens,
        })
    }
}

/// Per-chunk streaming bundle handed to the `on_output` sink.
///
/// `accumulated` is the monotonically growing concatenation of all text
/// deltas so far; chunks whose events carry no assistant text leave it
/// unchanged and set `text` to `None`.
#[derive(Debug, Clone)]
pub struct OutputData {
    /// The raw stdout chunk exactly as received.
    pub raw: String,
    /// Canonical events parsed out of this chunk, including synthesized ones.
    pub events: Vec<StreamEvent>,
    /// Text delta contributed by this chunk, if any.
    pub text: Option<String>,
    /// Running concatenation of all text deltas.
    pub accumulated: String,
}
