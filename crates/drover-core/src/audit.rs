//! Fire-and-forget audit records.
//!
//! When a call provides a log directory, the adapter drops `input.json`,
//! `output.json` and `error.json` records into it. This is a write-only side
//! channel: any failure here is logged at warn level and swallowed, never
//! surfaced to the primary execution path.

use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};

/// Write one audit record, attaching a UTC timestamp.
fn write_record(dir: &Path, file_name: &str, body: Value) {
    if let Err(error) = std::fs::create_dir_all(dir) {
        log::warn!("audit dir {} not writable: {error}", dir.display());
        return;
    }
    let record = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "record": body,
    });
    let path = dir.join(file_name);
    let text = match serde_json::to_string_pretty(&record) {
        Ok(text) => text,
        Err(error) => {
            log::warn!("audit record {file_name} not serializable: {error}");
            return;
        }
    };
    if let Err(error) = std::fs::write(&path, text) {
        log::warn!("audit write {} failed: {error}", path.display());
    }
}

/// Record the prompt and options that started an execution.
pub fn write_input(dir: Option<&Path>, body: Value) {
    if let Some(dir) = dir {
        write_record(dir, "input.json", body);
    }
}

/// Record the finalized response.
pub fn write_output(dir: Option<&Path>, body: Value) {
    if let Some(dir) = dir {
        write_record(dir, "output.json", body);
    }
}

/// Record a failure.
pub fn write_error(dir: Option<&Path>, body: Value) {
    if let Some(dir) = dir {
        write_record(dir, "error.json", body);
    }
}
