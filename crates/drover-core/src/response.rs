//! Final execution result returned by an adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResponseError;
use crate::events::Usage;

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
    /// Never produced by `execute()`, which rejects on timeout instead of
    /// returning a response; kept so persisted responses from other
    /// producers still deserialize.
    Timeout,
}

/// Raw process output, included only when the call was verbose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The finalized result of one `execute()` call.
///
/// `output` is the accumulated assistant text; `data` is only present when a
/// response schema was requested and extraction succeeded. A timeout never
/// produces one of these, it is a hard rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    /// Accumulated assistant text.
    pub output: String,
    /// Extracted structured output, when a schema was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Vendor-assigned session id, when one was reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: ExecutionStatus,
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Vendor-reported per-model usage breakdown, passed through unshaped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_usage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ExecutionResponse {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ExecutionResponse {
        ExecutionResponse {
            output: "done".to_string(),
            data: None,
            session_id: Some("sess-1".to_string()),
            status: ExecutionStatus::Success,
            exit_code: 0,
            duration: 120,
            usage: None,
            model_usage: None,
            total_cost_usd: None,
            raw: None,
            error: None,
        }
    }

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let json = serde_json::to_string(&minimal()).unwrap();
        assert!(json.contains("\"sessionId\":\"sess-1\""));
        assert!(json.contains("\"status\":\"success\""));
        assert!(!json.contains("totalCostUsd"));
        assert!(!json.contains("raw"));
    }

    #[test]
    fn foreign_timeout_status_still_deserializes() {
        let status: ExecutionStatus = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(status, ExecutionStatus::Timeout);
        let mut response = minimal();
        response.status = status;
        assert!(!response.is_success());
    }

    #[test]
    fn error_status_is_not_success() {
        let mut response = minimal();
        response.status = ExecutionStatus::Error;
        response.error = Some(ResponseError::new("EXECUTION", "exit 1"));
        assert!(!response.is_success());
    }
}
