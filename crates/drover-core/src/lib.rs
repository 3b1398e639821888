//! # drover-core
//!
//! Drive external AI coding CLIs (Claude Code and Codex) as if they exposed
//! one uniform API: submit a prompt, receive normalized streaming events and
//! a final structured result, and hold a multi-turn conversation across
//! repeated invocations even though every invocation is a fresh OS process.
//!
//! ## Key Concepts
//!
//! - **Adapter**: vendor-specific translator between a CLI's native JSONL
//!   protocol and the canonical event model
//! - **StreamEvent**: one normalized unit in the shared event taxonomy
//! - **Session**: a logical conversation persisted by the CLI's own session
//!   store and referenced by an opaque id

pub mod agents;
pub mod audit;
pub mod client;
pub mod error;
pub mod events;
pub mod options;
pub mod response;
pub mod runner;
pub mod session;
pub mod structured;

// Re-export commonly used types
pub use agents::{Adapter, AgentKind, Capabilities};
pub use client::AgentClient;
pub use error::{Error, ResponseError, Result};
pub use events::{OutputData, StreamEvent, Usage};
pub use options::{ExecutionOptions, PermissionMode};
pub use response::{ExecutionResponse, ExecutionStatus};
pub use session::{Session, SessionInfo};
pub use structured::{extract_json, safe_parse, JsonSchemaValidator, SchemaValidator};
