use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool result in the response the voice platform expects:
/// `{"results": [{"toolCallId": "...", "result": ...}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VapiToolCallResult {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VapiToolCallResponse {
    pub results: Vec<VapiToolCallResult>,
}

/// Outcome of an external insurance eligibility check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EligibilityResult {
    pub is_active: bool,
    pub carrier: Option<String>,
    pub plan_name: Option<String>,
    pub copay: Option<f64>,
    pub error: Option<String>,
}
