//! Claude CLI invocation builder.

use base64::Engine;
use std::path::Path;

use crate::error::{Error, Result};
use crate::options::ExecutionOptions;

/// Argv and optional stdin payload for one Claude run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

/// Build the argv for one prompt.
///
/// The prompt travels as a positional argument, except when images are
/// attached: those require `--input-format stream-json` with a user message
/// on stdin carrying base64 image content blocks.
pub fn build_invocation(prompt: &str, options: &ExecutionOptions) -> Result<Invocation> {
    let mut args = vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ];

    if let Some(model) = &options.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if let Some(mode) = options.permission_mode {
        args.push("--permission-mode".to_string());
        args.push(mode.as_claude_flag().to_string());
    }
    if options.dangerously_skip_permissions {
        args.push("--dangerously-skip-permissions".to_string());
    }
    if !options.allowed_tools.is_empty() {
        args.push("--allowed-tools".to_string());
        args.push(options.allowed_tools.join(","));
    }
    if !options.disallowed_tools.is_empty() {
        args.push("--disallowed-tools".to_string());
        args.push(options.disallowed_tools.join(","));
    }

    if options.resume {
        // validated upstream: resume requires a session id
        if let Some(id) = &options.session_id {
            args.push("--resume".to_string());
            args.push(id.clone());
        }
    } else if options.continue_conversation {
        args.push("--continue".to_string());
    } else if let Some(id) = &options.session_id {
        args.push("--session-id".to_string());
        args.push(id.clone());
    }

    if options.images.is_empty() {
        args.push(prompt.to_string());
        return Ok(Invocation { args, stdin: None });
    }

    args.push("--input-format".to_string());
    args.push("stream-json".to_string());

    let mut content = vec![serde_json::json!({ "type": "text", "text": prompt })];
    for path in &options.images {
        content.push(image_block(path)?);
    }
    let message = serde_json::json!({
        "type": "user",
        "message": { "role": "user", "content": content },
    });

    Ok(Invocation {
        args,
        stdin: Some(format!("{message}\n")),
    })
}

fn image_block(path: &Path) -> Result<serde_json::Value> {
    let bytes = std::fs::read(path).map_err(|error| {
        Error::Validation(format!("cannot read image {}: {error}", path.display()))
    })?;
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(serde_json::json!({
        "type": "image",
        "source": {
            "type": "base64",
            "media_type": media_type(path),
            "data": data,
        },
    }))
}

fn media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}
