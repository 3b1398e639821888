//! Per-call execution options.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::events::{OutputData, StreamEvent};
use crate::structured::SchemaValidator;

/// Default wall-clock limit when the caller sets none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How much autonomy the agent gets over tool use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Vendor default prompting behavior.
    Default,
    /// Auto-approve file edits.
    AcceptEdits,
    /// Planning only, no mutations.
    Plan,
    /// Skip all permission prompts.
    BypassPermissions,
}

impl PermissionMode {
    /// The flag value the Claude CLI expects.
    pub fn as_claude_flag(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }

    /// The closest sandbox policy the Codex CLI offers.
    pub fn as_codex_sandbox(&self) -> &'static str {
        match self {
            Self::Default | Self::Plan => "read-only",
            Self::AcceptEdits => "workspace-write",
            Self::BypassPermissions => "danger-full-access",
        }
    }
}

/// Streaming sink receiving one [`OutputData`] per stdout chunk.
pub type OutputSink = Box<dyn FnMut(OutputData) + Send>;

/// Streaming sink receiving each canonical event as it is parsed.
pub type EventSink = Box<dyn FnMut(&StreamEvent) + Send>;

/// Options for a single prompt execution.
///
/// Built with chained setters. Not `Clone`: the sinks are consumed by the
/// call they are attached to.
pub struct ExecutionOptions {
    pub model: Option<String>,
    pub session_id: Option<String>,
    /// Resume the conversation named by `session_id`.
    pub resume: bool,
    /// Continue the most recent conversation in the working directory.
    pub continue_conversation: bool,
    pub permission_mode: Option<PermissionMode>,
    pub dangerously_skip_permissions: bool,
    /// When false, the sinks are never invoked; parsing still happens so the
    /// final response is identical either way.
    pub streaming: bool,
    pub verbose: bool,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    /// Image attachments, passed through to the vendor CLI.
    pub images: Vec<PathBuf>,
    pub timeout: Option<Duration>,
    /// Directory for audit records of this call.
    pub log_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    /// When set, the final output is run through the structured-output
    /// extractor and validated with this schema.
    pub response_schema: Option<Arc<dyn SchemaValidator>>,
    pub on_output: Option<OutputSink>,
    pub on_event: Option<EventSink>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            model: None,
            session_id: None,
            resume: false,
            continue_conversation: false,
            permission_mode: None,
            dangerously_skip_permissions: false,
            streaming: true,
            verbose: false,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            images: Vec::new(),
            timeout: None,
            log_dir: None,
            working_dir: None,
            response_schema: None,
            on_output: None,
            on_event: None,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn continue_conversation(mut self, continue_conversation: bool) -> Self {
        self.continue_conversation = continue_conversation;
        self
    }

    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    pub fn dangerously_skip_permissions(mut self, skip: bool) -> Self {
        self.dangerously_skip_permissions = skip;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn disallowed_tools(mut self, tools: Vec<String>) -> Self {
        self.disallowed_tools = tools;
        self
    }

    pub fn image(mut self, path: impl Into<PathBuf>) -> Self {
        self.images.push(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn response_schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn on_output(mut self, sink: OutputSink) -> Self {
        self.on_output = Some(sink);
        self
    }

    pub fn on_event(mut self, sink: EventSink) -> Self {
        self.on_event = Some(sink);
        self
    }

    /// Effective timeout for this call.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

impl fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("model", &self.model)
            .field("session_id", &self.session_id)
            .field("resume", &self.resume)
            .field("continue_conversation", &self.continue_conversation)
            .field("permission_mode", &self.permission_mode)
            .field(
                "dangerously_skip_permissions",
                &self.dangerously_skip_permissions,
            )
            .field("streaming", &self.streaming)
            .field("verbose", &self.verbose)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("images", &self.images)
            .field("timeout", &self.timeout)
            .field("log_dir", &self.log_dir)
            .field("working_dir", &self.working_dir)
            .field("response_schema", &self.response_schema.is_some())
            .field("on_output", &self.on_output.is_some())
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}
