//! Claude CLI adapter internals.

pub mod parser;
pub mod spawn;
pub mod types;

pub use parser::ClaudeParser;
