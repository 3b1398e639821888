//! Structured-output extraction and validation.
//!
//! CLI agents asked for JSON rarely answer with bare JSON: the value may be
//! wrapped in prose, a fenced code block, or both. [`extract_json`] digs it
//! out with a three-step strategy (direct parse, fenced block, balanced
//! brace span) and [`safe_parse`] optionally runs a caller-supplied
//! [`SchemaValidator`] over the result.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Outcome of running a validator over an extracted value.
#[derive(Debug, Clone)]
pub struct Validation {
    /// Whether the value passed.
    pub success: bool,
    /// The (possibly coerced) value on success.
    pub data: Option<Value>,
    /// One `"<field path or 'root'>: <message>"` entry per reported issue.
    pub issues: Vec<String>,
}

impl Validation {
    /// A passing outcome carrying the value through unchanged.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            issues: Vec::new(),
        }
    }

    /// A failing outcome with the given issue list.
    pub fn fail(issues: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            issues,
        }
    }
}

/// Caller-supplied schema capability: one method, mirroring the
/// `safeParse(value) -> {success, data?, error?}` collaborator contract.
pub trait SchemaValidator: Send + Sync {
    /// Validate `value`, never panicking.
    fn safe_parse(&self, value: &Value) -> Validation;
}

/// [`SchemaValidator`] backed by a JSON Schema document.
pub struct JsonSchemaValidator {
    compiled: jsonschema::JSONSchema,
}

impl JsonSchemaValidator {
    /// Compile a JSON Schema. Fails with a parse error when the schema
    /// itself is invalid.
    pub fn new(schema: &Value) -> Result<Self> {
        let compiled = jsonschema::JSONSchema::compile(schema).map_err(|error| Error::Parse {
            message: format!("invalid response schema: {error}"),
            text: schema.to_string(),
        })?;
        Ok(Self { compiled })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn safe_parse(&self, value: &Value) -> Validation {
        let issues: Vec<String> = match self.compiled.validate(value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        format!("root: {error}")
                    } else {
                        format!("{path}: {error}")
                    }
                })
                .collect(),
        };

        if issues.is_empty() {
            Validation::ok(value.clone())
        } else {
            Validation::fail(issues)
        }
    }
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").expect("valid fenced block regex")
    })
}

/// Extract a JSON value from free-form text.
///
/// Tries, in order: the whole text as JSON, the first fenced code block
/// (optionally tagged `json`), and the first balanced `{...}` span. Fails
/// with a parse error carrying the offending text.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Parse {
            message: "no JSON found in empty output".to_string(),
            text: text.to_string(),
        });
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(captures) = fenced_block_re().captures(text) {
        if let Some(block) = captures.get(1) {
            if let Ok(value) = serde_json::from_str(block.as_str().trim()) {
                return Ok(value);
            }
        }
    }

    if let Some(span) = balanced_brace_span(text) {
        if let Ok(value) = serde_json::from_str(span) {
            return Ok(value);
        }
    }

    Err(Error::Parse {
        message: "no JSON found in output".to_string(),
        text: text.to_string(),
    })
}

/// Find the first balanced `{...}` span, respecting strings and escapes.
fn balanced_brace_span(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract JSON from `text` and optionally validate it.
///
/// Without a validator the extracted value is returned as-is. With one, a
/// failing validation becomes a parse error whose message lists every
/// reported issue, so failures are debuggable without a compiled schema
/// type on hand.
pub fn safe_parse(text: &str, validator: Option<&dyn SchemaValidator>) -> Result<Value> {
    let value = extract_json(text)?;
    let Some(validator) = validator else {
        return Ok(value);
    };

    let outcome = validator.safe_parse(&value);
    if outcome.success {
        Ok(outcome.data.unwrap_or(value))
    } else {
        let issues = if outcome.issues.is_empty() {
            "root: validation failed".to_string()
        } else {
            outcome.issues.join("; ")
        };
        Err(Error::Parse {
            message: format!("response did not match schema: {issues}"),
            text: value.to_string(),
        })
    }
}
