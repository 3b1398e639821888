//! Codex stream parser.
//!
//! The Codex CLI emits one JSON object per line:
//! `{"type":"thread.started"|"turn.completed"|"item.completed"|..., "data":{...}}`.
//! Payload fields are read from `data` with a top-level fallback, since some
//! CLI builds inline them. Same buffering discipline as the Claude parser;
//! malformed lines are skipped.

use serde_json::Value;

use crate::agents::TurnOutcome;
use crate::events::{StreamEvent, Usage};

use super::types::CodexItem;

/// Parser state for one Codex invocation.
#[derive(Debug, Default)]
pub struct CodexParser {
    session_id: Option<String>,
    buffer: String,
    turn_started: bool,
    outcome: TurnOutcome,
}

impl CodexParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread id reported by the CLI, mapped to the uniform session id.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub(crate) fn outcome(&self) -> TurnOutcome {
        self.outcome.clone()
    }

    /// Feed a raw chunk; returns the events completed by it.
    pub fn feed(&mut self, data: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.buffer.push_str(data);

        let buffer = std::mem::take(&mut self.buffer);
        let mut lines: Vec<&str> = buffer.split('\n').collect();
        if let Some(incomplete) = lines.pop() {
            self.buffer = incomplete.to_string();
        }

        for line in lines {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                events.extend(self.parse_line(trimmed));
            }
        }
        events
    }

    /// Process any final line that arrived without a trailing newline.
    pub fn flush(&mut self) -> Vec<StreamEvent> {
        let remaining = std::mem::take(&mut self.buffer);
        let trimmed = remaining.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            self.parse_line(trimmed)
        }
    }

    fn parse_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        let line_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let payload = value.get("data").cloned().unwrap_or_else(|| value.clone());

        let mut events = Vec::new();
        match line_type.as_str() {
            "thread.started" => {
                if let Some(id) = payload.get("thread_id").and_then(Value::as_str) {
                    if self.session_id.is_none() {
                        self.session_id = Some(id.to_string());
                    }
                }
                events.push(StreamEvent::ThreadStarted {
                    session_id: self.session_id.clone(),
                    data: value,
                });
                self.start_turn(&mut events);
            }

            "turn.started" => self.start_turn(&mut events),

            "turn.completed" => {
                self.turn_started = false;
                let usage = payload.get("usage").and_then(Usage::from_value);
                self.outcome.usage = usage.clone();
                events.push(StreamEvent::TurnCompleted { usage, data: value });
            }

            "turn.failed" => {
                self.outcome.is_error = true;
                self.outcome.error_message = payload
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                events.push(StreamEvent::Generic {
                    event_type: line_type,
                    data: value,
                });
            }

            "item.started" | "item.completed" => {
                let completed = line_type == "item.completed";
                match CodexItem::from_payload(&payload) {
                    Some(item) => events.extend(self.translate_item(item, completed, value)),
                    None => events.push(StreamEvent::Generic {
                        event_type: line_type,
                        data: value,
                    }),
                }
            }

            "error" => {
                self.outcome.is_error = true;
                self.outcome.error_message = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                events.push(StreamEvent::Generic {
                    event_type: line_type,
                    data: value,
                });
            }

            other => {
                events.push(StreamEvent::Generic {
                    event_type: other.to_string(),
                    data: value,
                });
            }
        }

        events
    }

    fn translate_item(
        &mut self,
        item: CodexItem,
        completed: bool,
        data: Value,
    ) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match item.item_type.as_str() {
            // agent messages only carry text once completed
            "agent_message" => {
                if completed {
                    self.start_turn(&mut events);
                    let text = item.text.filter(|t| !t.is_empty());
                    self.outcome.result_text = text.clone();
                    events.push(StreamEvent::AssistantMessage { text, data });
                }
            }

            "command_execution" => {
                let name = Some("shell".to_string());
                if completed {
                    events.push(StreamEvent::ToolCompleted { name, data });
                } else {
                    events.push(StreamEvent::ToolStarted { name, data });
                }
            }

            "mcp_tool_call" => {
                let name = item.tool_name;
                if completed {
                    events.push(StreamEvent::ToolCompleted { name, data });
                } else {
                    events.push(StreamEvent::ToolStarted { name, data });
                }
            }

            "file_change" => {
                events.push(StreamEvent::FileEvent {
                    path: item.path,
                    data,
                });
            }

            // reasoning summaries are not assistant text
            "reasoning" => {}

            _ => {
                let kind = if completed {
                    "item.completed"
                } else {
                    "item.started"
                };
                events.push(StreamEvent::Generic {
                    event_type: kind.to_string(),
                    data,
                });
            }
        }
        events
    }

    /// Codex only sometimes announces turns; synthesize when it does not.
    fn start_turn(&mut self, events: &mut Vec<StreamEvent>) {
        if !self.turn_started {
            self.turn_started = true;
            events.push(StreamEvent::TurnStarted { data: Value::Null });
        }
    }
}
