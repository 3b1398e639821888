//! Claude stream parser.
//!
//! The Claude CLI emits one JSON object per line:
//! `{"type":"assistant"|"user"|"system"|"result", "message":{...}, "session_id"?}`.
//! This parser buffers chunked input into complete lines and translates each
//! into canonical [`StreamEvent`]s. Malformed lines are skipped.

use serde_json::Value;

use crate::agents::TurnOutcome;
use crate::events::{StreamEvent, Usage};

use super::types::ClaudeMessage;

/// Parser state for one Claude invocation.
#[derive(Debug, Default)]
pub struct ClaudeParser {
    session_id: Option<String>,
    /// Buffer for a trailing partial line.
    buffer: String,
    thread_announced: bool,
    turn_started: bool,
    outcome: TurnOutcome,
}

impl ClaudeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session id reported by the CLI, once seen.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub(crate) fn outcome(&self) -> TurnOutcome {
        self.outcome.clone()
    }

    /// Feed a raw chunk; returns the events completed by it.
    ///
    /// Chunks may split lines at arbitrary byte offsets; the trailing
    /// fragment is buffered until its newline arrives.
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

        let mut events = Vec::new();

        if let Some(sid) = value.get("session_id").and_then(Value::as_str) {
            if self.session_id.is_none() {
                self.session_id = Some(sid.to_string());
            }
            if !self.thread_announced {
                self.thread_announced = true;
                events.push(StreamEvent::ThreadStarted {
                    session_id: self.session_id.clone(),
                    data: value.clone(),
                });
            }
        }

        let line_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match line_type.as_str() {
            "system" => {
                let subtype = value.get("subtype").and_then(Value::as_str);
                if subtype == Some("init") {
                    self.start_turn(&mut events);
                } else {
                    events.push(StreamEvent::Generic {
                        event_type: "system".to_string(),
                        data: value,
                    });
                }
            }

            "assistant" => {
                self.start_turn(&mut events);

                let message: Option<ClaudeMessage> = value
                    .get("message")
                    .and_then(|m| serde_json::from_value(m.clone()).ok());

                let mut text = String::new();
                let mut tools = Vec::new();
                if let Some(message) = message {
                    for block in &message.content {
                        if block.is_text() {
                            if let Some(block_text) = &block.text {
                                text.push_str(block_text);
                            }
                        } else if block.is_tool_use() {
                            tools.push(StreamEvent::ToolStarted {
                                name: block.name.clone(),
                                data: serde_json::json!({
                                    "id": block.id,
                                    "input": block.input,
                                }),
                            });
                        }
                    }
                }

                events.push(StreamEvent::AssistantMessage {
                    text: (!text.is_empty()).then_some(text),
                    data: value,
                });
                events.extend(tools);
            }

            "user" => {
                let message: Option<ClaudeMessage> = value
                    .get("message")
                    .and_then(|m| serde_json::from_value(m.clone()).ok());
                if let Some(message) = &message {
                    for block in &message.content {
                        if block.is_tool_result() {
                            events.push(StreamEvent::ToolCompleted {
                                name: None,
                                data: serde_json::json!({ "id": block.id }),
                            });
                        }
                    }
                }
                events.push(StreamEvent::UserMessage { data: value });
            }

            "result" => {
                self.turn_started = false;
                let usage = value.get("usage").and_then(Usage::from_value);
                self.outcome.usage = usage.clone();
                self.outcome.model_usage = value
                    .get("modelUsage")
                    .or_else(|| value.get("model_usage"))
                    .cloned();
                self.outcome.total_cost_usd =
                    value.get("total_cost_usd").and_then(Value::as_f64);
                self.outcome.result_text = value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if value.get("is_error").and_then(Value::as_bool) == Some(true) {
                    self.outcome.is_error = true;
                    self.outcome.error_message = self.outcome.result_text.clone();
                }
                events.push(StreamEvent::TurnCompleted { usage, data: value });
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

    /// Claude never announces a turn explicitly; synthesize one.
    fn start_turn(&mut self, events: &mut Vec<StreamEvent>) {
        if !self.turn_started {
            self.turn_started = true;
            events.push(StreamEvent::TurnStarted {
                data: Value::Null,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_parser_has_no_session_id() {
        let parser = ClaudeParser::new();
        assert!(parser.session_id().is_none());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut parser = ClaudeParser::new();
        assert!(parser.feed("not json\n").is_empty());
        let events = parser.feed(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"ok\"}]}}\n",
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::AssistantMessage { .. })));
    }

    #[test]
    fn session_id_extracted_once_and_thread_started_emitted() {
        let mut parser = ClaudeParser::new();
        let line = r#"{"type":"system","subtype":"init","session_id":"sess-1"}"#;
        let events = parser.feed(&format!("{line}\n"));
        assert_eq!(parser.session_id(), Some("sess-1"));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StreamEvent::ThreadStarted { .. }))
                .count(),
            1
        );

        let again = parser.feed(&format!("{line}\n"));
        assert!(!again
            .iter()
            .any(|e| matches!(e, StreamEvent::ThreadStarted { .. })));
    }

    #[test]
    fn assistant_line_synthesizes_turn_started_once() {
        let mut parser = ClaudeParser::new();
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hi "}]}}"#;
        let first = parser.feed(&format!("{line}\n"));
        assert!(matches!(first[0], StreamEvent::TurnStarted { .. }));
        assert_eq!(first[1].text_delta(), Some("Hi "));

        let second = parser.feed(&format!("{line}\n"));
        assert!(!second
            .iter()
            .any(|e| matches!(e, StreamEvent::TurnStarted { .. })));
    }

    #[test]
    fn tool_use_blocks_become_tool_started() {
        let mut parser = ClaudeParser::new();
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","id":"t1","input":{"file_path":"/x"}}]}}"#;
        let events = parser.feed(&format!("{line}\n"));
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::ToolStarted { name: Some(name), .. } if name == "Read"
        )));
    }

    #[test]
    fn result_line_is_terminal_and_carries_usage() {
        let mut parser = ClaudeParser::new();
        let line = r#"{"type":"result","result":"done","usage":{"input_tokens":10,"output_tokens":5},"total_cost_usd":0.01}"#;
        let events = parser.feed(&format!("{line}\n"));
        let terminal = events.iter().find(|e| e.is_terminal()).unwrap();
        match terminal {
            StreamEvent::TurnCompleted { usage: Some(usage), .. } => {
                assert_eq!(usage.output_tokens, Some(5));
            }
            other => panic!("expected TurnCompleted with usage, got {other:?}"),
        }
        // terminal events never contribute text
        assert_eq!(terminal.text_delta(), None);
        assert_eq!(parser.outcome().total_cost_usd, Some(0.01));
    }

    #[test]
    fn error_result_sets_outcome() {
        let mut parser = ClaudeParser::new();
        let line = r#"{"type":"result","result":"Invalid API key","is_error":true}"#;
        parser.feed(&format!("{line}\n"));
        let outcome = parser.outcome();
        assert!(outcome.is_error);
        assert_eq!(outcome.error_message.as_deref(), Some("Invalid API key"));
    }

    #[test]
    fn split_line_parses_identically_to_whole_line() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hello"}]}}"#;
        let full = format!("{line}\n");

        let mut whole = ClaudeParser::new();
        let whole_events = whole.feed(&full);

        for split_at in 1..full.len() {
            let mut split = ClaudeParser::new();
            let mut events = split.feed(&full[..split_at]);
            events.extend(split.feed(&full[split_at..]));
            assert_eq!(
                serde_json::to_string(&events).unwrap(),
                serde_json::to_string(&whole_events).unwrap(),
                "diverged at offset {split_at}"
            );
        }
    }

    #[test]
    fn flush_handles_missing_trailing_newline() {
        let mut parser = ClaudeParser::new();
        parser.feed(r#"{"type":"result","result":"done"}"#);
        let events = parser.flush();
        assert!(events.iter().any(|e| e.is_terminal()));
    }

    #[test]
    fn user_tool_results_become_tool_completed() {
        let mut parser = ClaudeParser::new();
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","id":"t1"}]}}"#;
        let events = parser.feed(&format!("{line}\n"));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ToolCompleted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::UserMessage { .. })));
    }
}
