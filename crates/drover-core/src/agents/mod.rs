//! Vendor adapters.
//!
//! Each supported CLI gets a module with an invocation builder and a stream
//! parser; [`Adapter`] drives either one behind the same `execute()` surface.
//! Vendor-native wire shapes never leak past this module: callers only see
//! canonical [`StreamEvent`]s and the finalized [`ExecutionResponse`].

pub mod claude;
pub mod codex;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::audit;
use crate::error::{Error, ResponseError, Result};
use crate::events::{OutputData, StreamEvent, Usage};
use crate::options::{EventSink, ExecutionOptions, OutputSink};
use crate::response::{ExecutionResponse, ExecutionStatus, RawOutput};
use crate::runner;
use crate::structured;

/// The supported vendor CLIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Claude,
    Codex,
}

impl AgentKind {
    /// Binary name searched for on PATH.
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
        }
    }

    /// Static capability set, queryable before any call.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Claude => Capabilities {
                streaming: true,
                session_management: true,
                tool_calling: true,
                multi_modal: true,
            },
            Self::Codex => Capabilities {
                streaming: true,
                session_management: true,
                tool_calling: true,
                multi_modal: true,
            },
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Self::Claude => "ANTHROPIC_API_KEY",
            Self::Codex => "OPENAI_API_KEY",
        }
    }

    fn oauth_token_var(&self) -> &'static str {
        match self {
            Self::Claude => "CLAUDE_CODE_OAUTH_TOKEN",
            Self::Codex => "CODEX_OAUTH_TOKEN",
        }
    }
}

/// What a vendor CLI can do.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub streaming: bool,
    pub session_management: bool,
    pub tool_calling: bool,
    pub multi_modal: bool,
}

/// Turn-level metadata collected by a parser across one invocation.
#[derive(Debug, Clone, Default)]
pub(crate) struct TurnOutcome {
    pub usage: Option<Usage>,
    pub model_usage: Option<Value>,
    pub total_cost_usd: Option<f64>,
    pub result_text: Option<String>,
    pub is_error: bool,
    pub error_message: Option<String>,
}

enum StreamParser {
    Claude(claude::ClaudeParser),
    Codex(codex::CodexParser),
}

impl StreamParser {
    fn feed(&mut self, data: &str) -> Vec<StreamEvent> {
        match self {
            Self::Claude(parser) => parser.feed(data),
            Self::Codex(parser) => parser.feed(data),
        }
    }

    fn flush(&mut self) -> Vec<StreamEvent> {
        match self {
            Self::Claude(parser) => parser.flush(),
            Self::Codex(parser) => parser.flush(),
        }
    }

    fn session_id(&self) -> Option<&str> {
        match self {
            Self::Claude(parser) => parser.session_id(),
            Self::Codex(parser) => parser.session_id(),
        }
    }

    fn outcome(&self) -> TurnOutcome {
        match self {
            Self::Claude(parser) => parser.outcome(),
            Self::Codex(parser) => parser.outcome(),
        }
    }
}

/// Streaming state for one invocation: line assembly, parsing, sink dispatch.
///
/// The sinks fire once per completed JSONL line that produced events, so a
/// chunk carrying two lines yields two `on_output` calls and a line split
/// across chunks yields one. Lines that parse to nothing stay silent.
struct TurnState {
    parser: StreamParser,
    line_buffer: String,
    accumulated: String,
    streaming: bool,
    on_output: Option<OutputSink>,
    on_event: Option<EventSink>,
}

impl TurnState {
    fn new(
        parser: StreamParser,
        streaming: bool,
        on_output: Option<OutputSink>,
        on_event: Option<EventSink>,
    ) -> Self {
        Self {
            parser,
            line_buffer: String::new(),
            accumulated: String::new(),
            streaming,
            on_output,
            on_event,
        }
    }

    fn ingest(&mut self, chunk: &str) {
        self.line_buffer.push_str(chunk);
        let buffered = std::mem::take(&mut self.line_buffer);
        let mut lines: Vec<&str> = buffered.split('\n').collect();
        if let Some(incomplete) = lines.pop() {
            self.line_buffer = incomplete.to_string();
        }
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let events = self.parser.feed(&format!("{line}\n"));
            if !events.is_empty() {
                self.dispatch(line, events);
            }
        }
    }

    /// Drain the trailing unterminated line once the process has exited.
    fn finish(&mut self) {
        let remaining = std::mem::take(&mut self.line_buffer);
        let mut events = self.parser.feed(&remaining);
        events.extend(self.parser.flush());
        if !events.is_empty() {
            self.dispatch(remaining.trim_end(), events);
        }
    }

    fn dispatch(&mut self, raw: &str, events: Vec<StreamEvent>) {
        let mut delta = String::new();
        for event in &events {
            if let Some(text) = event.text_delta() {
                delta.push_str(text);
            }
        }
        if !delta.is_empty() {
            self.accumulated.push_str(&delta);
        }

        if !self.streaming {
            return;
        }
        if let Some(sink) = self.on_event.as_mut() {
            for event in &events {
                sink(event);
            }
        }
        if let Some(sink) = self.on_output.as_mut() {
            sink(OutputData {
                raw: raw.to_string(),
                events,
                text: (!delta.is_empty()).then_some(delta),
                accumulated: self.accumulated.clone(),
            });
        }
    }
}

/// A vendor CLI behind the uniform execution surface.
pub struct Adapter {
    kind: AgentKind,
    binary_path: PathBuf,
}

impl Adapter {
    /// Resolve the vendor binary on PATH. Fails here, not at first call,
    /// when the CLI is not installed.
    pub fn new(kind: AgentKind) -> Result<Self> {
        let binary_path = resolve_binary(kind.binary_name())?;
        Ok(Self { kind, binary_path })
    }

    /// Use an explicit binary path instead of searching PATH.
    pub fn with_binary(kind: AgentKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            binary_path: path.into(),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    /// Run one prompt to completion.
    ///
    /// Resolves only after the process has exited or the deadline fired.
    /// Streaming sinks deliver intermediate state; a timeout is a hard
    /// rejection with no partial response.
    pub async fn execute(
        &self,
        prompt: &str,
        mut options: ExecutionOptions,
    ) -> Result<ExecutionResponse> {
        validate(prompt, &options, self.capabilities())?;

        let log_dir = options.log_dir.clone();
        let (args, stdin) = match self.kind {
            AgentKind::Claude => {
                let invocation = claude::spawn::build_invocation(prompt, &options)?;
                (invocation.args, invocation.stdin)
            }
            AgentKind::Codex => (codex::spawn::build_args(prompt, &options), None),
        };
        audit::write_input(
            log_dir.as_deref(),
            json!({
                "agent": self.kind.binary_name(),
                "prompt": prompt,
                "args": &args,
            }),
        );

        let env_remove = credential_overrides(self.kind);

        let state = Arc::new(Mutex::new(TurnState::new(
            match self.kind {
                AgentKind::Claude => StreamParser::Claude(claude::ClaudeParser::new()),
                AgentKind::Codex => StreamParser::Codex(codex::CodexParser::new()),
            },
            options.streaming,
            options.on_output.take(),
            options.on_event.take(),
        )));
        let sink_state = Arc::clone(&state);
        let on_stdout: runner::ChunkSink = Box::new(move |chunk| {
            if let Ok(mut state) = sink_state.lock() {
                state.ingest(chunk);
            }
        });

        let spawn = runner::SpawnOptions {
            args,
            cwd: options.working_dir.clone(),
            env: Vec::new(),
            env_remove,
            stdin,
            timeout: options.effective_timeout(),
            on_stdout: Some(on_stdout),
            on_stderr: None,
        };

        let binary = self.binary_path.to_string_lossy().into_owned();
        let result = match runner::run(&binary, spawn).await {
            Ok(result) => result,
            Err(error) => {
                self.audit_failure(log_dir.as_deref(), &error);
                return Err(error);
            }
        };

        let (accumulated, outcome, session_id) = {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.finish();
            (
                state.accumulated.clone(),
                state.parser.outcome(),
                state.parser.session_id().map(str::to_string),
            )
        };

        if let Some(message) = auth_failure(&outcome, &result.stderr) {
            let error = Error::Authentication(message);
            self.audit_failure(log_dir.as_deref(), &error);
            return Err(error);
        }

        let success = result.exit_code == 0 && !outcome.is_error;
        let output = if accumulated.is_empty() {
            outcome.result_text.clone().unwrap_or_default()
        } else {
            accumulated
        };

        let data = match &options.response_schema {
            Some(validator) if success => {
                match structured::safe_parse(&output, Some(validator.as_ref())) {
                    Ok(value) => Some(value),
                    Err(error) => {
                        self.audit_failure(log_dir.as_deref(), &error);
                        return Err(error);
                    }
                }
            }
            _ => None,
        };

        let error = (!success).then(|| {
            let message = outcome.error_message.clone().unwrap_or_else(|| {
                format!(
                    "{} exited with code {}",
                    self.kind.binary_name(),
                    result.exit_code
                )
            });
            let response_error = ResponseError::new("EXECUTION", message);
            if result.stderr.trim().is_empty() {
                response_error
            } else {
                response_error.with_details(result.stderr.trim().to_string())
            }
        });

        let response = ExecutionResponse {
            output,
            data,
            session_id,
            status: if success {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Error
            },
            exit_code: result.exit_code,
            duration: result.duration.as_millis() as u64,
            usage: outcome.usage,
            model_usage: outcome.model_usage,
            total_cost_usd: outcome.total_cost_usd,
            raw: options.verbose.then(|| RawOutput {
                stdout: result.stdout,
                stderr: result.stderr,
            }),
            error,
        };

        if let Ok(record) = serde_json::to_value(&response) {
            audit::write_output(log_dir.as_deref(), record);
        }
        Ok(response)
    }

    fn audit_failure(&self, log_dir: Option<&Path>, error: &Error) {
        audit::write_error(
            log_dir,
            json!({
                "agent": self.kind.binary_name(),
                "code": error.code(),
                "message": error.to_string(),
            }),
        );
    }
}

/// Reject bad input before anything is spawned.
fn validate(prompt: &str, options: &ExecutionOptions, capabilities: Capabilities) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(Error::Validation("prompt must not be empty".to_string()));
    }
    if options.resume && options.continue_conversation {
        return Err(Error::Validation(
            "resume and continue are mutually exclusive".to_string(),
        ));
    }
    if options.resume && options.session_id.is_none() {
        return Err(Error::Validation(
            "resume requires a session id".to_string(),
        ));
    }
    if !options.images.is_empty() && !capabilities.multi_modal {
        return Err(Error::Validation(
            "this agent does not accept image input".to_string(),
        ));
    }
    Ok(())
}

/// Credential precedence: when both the OAuth token and the API key are set,
/// the token wins and the key is withheld from the child.
fn credential_overrides(kind: AgentKind) -> Vec<String> {
    let has_token = std::env::var(kind.oauth_token_var()).is_ok_and(|v| !v.is_empty());
    let has_key = std::env::var(kind.api_key_var()).is_ok_and(|v| !v.is_empty());
    if has_token && has_key {
        log::warn!(
            "both {} and {} are set; using the OAuth token",
            kind.oauth_token_var(),
            kind.api_key_var()
        );
        vec![kind.api_key_var().to_string()]
    } else {
        Vec::new()
    }
}

fn auth_failure(outcome: &TurnOutcome, stderr: &str) -> Option<String> {
    let haystack = format!(
        "{} {}",
        outcome.error_message.as_deref().unwrap_or_default(),
        stderr
    )
    .to_lowercase();
    const MARKERS: [&str; 5] = [
        "not logged in",
        "please run /login",
        "login required",
        "invalid api key",
        "401 unauthorized",
    ];
    if MARKERS.iter().any(|marker| haystack.contains(marker)) {
        Some(
            outcome
                .error_message
                .clone()
                .unwrap_or_else(|| stderr.trim().to_string()),
        )
    } else {
        None
    }
}

fn resolve_binary(name: &str) -> Result<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::CliNotFound {
            binary: name.to_string(),
        });
    }
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::CliNotFound {
        binary: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn claude_parser() -> StreamParser {
        StreamParser::Claude(claude::ClaudeParser::new())
    }

    #[test]
    fn validation_rejects_empty_prompt() {
        let error = validate(
            "  ",
            &ExecutionOptions::new(),
            AgentKind::Claude.capabilities(),
        )
        .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[test]
    fn validation_rejects_resume_plus_continue() {
        let options = ExecutionOptions::new()
            .session_id("s")
            .resume(true)
            .continue_conversation(true);
        let error = validate("hi", &options, AgentKind::Claude.capabilities()).unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[test]
    fn validation_rejects_resume_without_id() {
        let options = ExecutionOptions::new().resume(true);
        let error = validate("hi", &options, AgentKind::Claude.capabilities()).unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[test]
    fn missing_binary_fails_at_construction() {
        let error = resolve_binary("definitely-not-on-path-anywhere").unwrap_err();
        assert!(matches!(error, Error::CliNotFound { .. }));
    }

    #[test]
    fn auth_markers_detected_case_insensitively() {
        let outcome = TurnOutcome {
            is_error: true,
            error_message: Some("Invalid API key. Please run /login".to_string()),
            ..TurnOutcome::default()
        };
        assert!(auth_failure(&outcome, "").is_some());
        assert!(auth_failure(&TurnOutcome::default(), "Not Logged In").is_some());
        assert!(auth_failure(&TurnOutcome::default(), "disk full").is_none());
    }

    #[test]
    fn streamed_chunks_fire_one_output_per_line() {
        // chunk 2 carries two lines, so three calls total
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink_calls = Arc::clone(&calls);
        let mut state = TurnState::new(
            claude_parser(),
            true,
            Some(Box::new(move |output: OutputData| {
                sink_calls
                    .lock()
                    .unwrap()
                    .push((output.text, output.accumulated));
            })),
            None,
        );

        state.ingest(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"Hi \"}]}}\n",
        );
        state.ingest(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"there\"}]}}\n{\"type\":\"result\",\"result\":\"Hi there\"}\n",
        );
        state.finish();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                (Some("Hi ".to_string()), "Hi ".to_string()),
                (Some("there".to_string()), "Hi there".to_string()),
                (None, "Hi there".to_string()),
            ]
        );
    }

    #[test]
    fn split_chunks_accumulate_identically() {
        let line = "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"Hello world\"}]}}\n";
        for split_at in 1..line.len() {
            let mut state = TurnState::new(claude_parser(), true, None, None);
            state.ingest(&line[..split_at]);
            state.ingest(&line[split_at..]);
            state.finish();
            assert_eq!(state.accumulated, "Hello world", "offset {split_at}");
        }
    }

    #[test]
    fn text_fragments_sum_to_accumulated() {
        let total = Arc::new(Mutex::new(String::new()));
        let sink_total = Arc::clone(&total);
        let mut state = TurnState::new(
            claude_parser(),
            true,
            Some(Box::new(move |output: OutputData| {
                if let Some(text) = output.text {
                    sink_total.lock().unwrap().push_str(&text);
                }
            })),
            None,
        );
        state.ingest("{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"a\"}]}}\n");
        state.ingest("{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"b\"}]}}\n");
        state.ingest("{\"type\":\"result\",\"result\":\"ab\"}\n");
        state.finish();
        assert_eq!(*total.lock().unwrap(), state.accumulated);
    }

    #[test]
    fn streaming_disabled_silences_sinks_but_still_accumulates() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink_count = Arc::clone(&count);
        let mut state = TurnState::new(
            claude_parser(),
            false,
            Some(Box::new(move |_| {
                sink_count.fetch_add(1, Ordering::SeqCst);
            })),
            None,
        );
        state.ingest("{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"quiet\"}]}}\n");
        state.finish();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(state.accumulated, "quiet");
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &std::path::Path, body: &str) -> PathBuf {
            let path = dir.join("fake-cli");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh").unwrap();
            writeln!(file, "{body}").unwrap();
            let mut perms = file.metadata().unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn execute_collects_text_session_and_usage() {
            let dir = tempfile::tempdir().unwrap();
            let body = concat!(
                "echo '{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"sess-1\"}'\n",
                "echo '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"Hi \"}]}}'\n",
                "echo '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"there\"}]}}'\n",
                "echo '{\"type\":\"result\",\"result\":\"Hi there\",\"usage\":{\"input_tokens\":1,\"output_tokens\":2}}'",
            );
            let path = script(dir.path(), body);

            let adapter = Adapter::with_binary(AgentKind::Claude, path);
            let response = adapter
                .execute("say hi", ExecutionOptions::new())
                .await
                .unwrap();

            assert_eq!(response.output, "Hi there");
            assert_eq!(response.session_id.as_deref(), Some("sess-1"));
            assert!(response.is_success());
            assert_eq!(response.usage.unwrap().output_tokens, Some(2));
        }

        #[tokio::test]
        async fn nonzero_exit_yields_error_response_not_rejection() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "echo 'boom' >&2\nexit 2");

            let adapter = Adapter::with_binary(AgentKind::Claude, path);
            let response = adapter
                .execute("hi", ExecutionOptions::new())
                .await
                .unwrap();

            assert_eq!(response.status, ExecutionStatus::Error);
            assert_eq!(response.exit_code, 2);
            let error = response.error.unwrap();
            assert_eq!(error.code, "EXECUTION");
            assert_eq!(error.details.as_deref(), Some("boom"));
        }

        #[tokio::test]
        async fn auth_marker_rejects_with_authentication_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(
                dir.path(),
                "echo '{\"type\":\"result\",\"result\":\"Invalid API key\",\"is_error\":true}'",
            );

            let adapter = Adapter::with_binary(AgentKind::Claude, path);
            let error = adapter
                .execute("hi", ExecutionOptions::new())
                .await
                .unwrap_err();
            assert!(matches!(error, Error::Authentication(_)));
        }

        #[tokio::test]
        async fn response_schema_extracts_structured_data() {
            let dir = tempfile::tempdir().unwrap();
            // printf: sh echo may interpret the backslash escapes
            let body = concat!(
                "printf '%s\\n' '{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"```json\\n{\\\"ok\\\":true}\\n```\"}]}}'\n",
                "printf '%s\\n' '{\"type\":\"result\",\"result\":\"done\"}'",
            );
            let path = script(dir.path(), body);

            let schema = serde_json::json!({
                "type": "object",
                "properties": { "ok": { "type": "boolean" } },
                "required": ["ok"]
            });
            let validator = crate::structured::JsonSchemaValidator::new(&schema).unwrap();

            let adapter = Adapter::with_binary(AgentKind::Claude, path);
            let response = adapter
                .execute("hi", ExecutionOptions::new().response_schema(Arc::new(validator)))
                .await
                .unwrap();
            assert_eq!(response.data.unwrap()["ok"], true);
        }

        #[tokio::test]
        async fn codex_stream_maps_thread_id_to_session() {
            let dir = tempfile::tempdir().unwrap();
            let body = concat!(
                "echo '{\"type\":\"thread.started\",\"data\":{\"thread_id\":\"th-1\"}}'\n",
                "echo '{\"type\":\"item.completed\",\"data\":{\"item\":{\"type\":\"agent_message\",\"text\":\"done\"}}}'\n",
                "echo '{\"type\":\"turn.completed\",\"data\":{\"usage\":{\"input_tokens\":4,\"output_tokens\":1}}}'",
            );
            let path = script(dir.path(), body);

            let adapter = Adapter::with_binary(AgentKind::Codex, path);
            let response = adapter
                .execute("hi", ExecutionOptions::new())
                .await
                .unwrap();
            assert_eq!(response.session_id.as_deref(), Some("th-1"));
            assert_eq!(response.output, "done");
            assert_eq!(response.usage.unwrap().input_tokens, Some(4));
        }
    }
}
