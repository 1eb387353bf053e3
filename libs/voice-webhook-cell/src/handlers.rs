use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use call_cell::models::EndOfCallReport;
use call_cell::services::calls::CallService;
use feedback_cell::services::analyzer::FeedbackService;
use shared_config::AppConfig;

use crate::models::{VapiToolCallResponse, VapiToolCallResult};
use crate::security::verify_vapi_signature;
use crate::services::tools::ToolRuntime;

/// Well above typical voice platform payloads.
const MAX_WEBHOOK_BODY_BYTES: usize = 1_000_000;

/// Ended reasons that warrant a staff callback.
const CALLBACK_REASONS: [&str; 6] = [
    "customer-did-not-answer",
    "customer-busy",
    "assistant-error",
    "phone-call-provider-closed-websocket",
    "assistant-forwarded-call",
    "voicemail",
];

const CALLBACK_MIN_DURATION_SECONDS: i64 = 15;

fn ok_empty() -> Response {
    (StatusCode::OK, Json(json!({}))).into_response()
}

fn safe_get<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in keys {
        current = current.get(key)?;
    }
    Some(current)
}

/// Tool parameters arrive as a JSON object or a JSON-encoded string.
fn parse_params(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| json!({})),
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => json!({}),
    }
}

/// Single endpoint receiving every voice platform event, dispatched on the
/// message type. Always answers 200 (except oversized bodies) so the
/// platform never retries into a live call.
pub async fn vapi_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.len() > MAX_WEBHOOK_BODY_BYTES {
        warn!("vapi_webhook: rejected oversized payload ({} bytes)", body.len());
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({"error": "Payload too large"})),
        ).into_response();
    }

    let signature = headers.get("x-vapi-signature").and_then(|v| v.to_str().ok());
    if !verify_vapi_signature(&state, &body, signature) {
        // 200 so the endpoint's existence leaks nothing to probes
        warn!("vapi_webhook: signature verification failed - dropping request");
        return ok_empty();
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        error!("vapi_webhook: failed to parse JSON body (length={})", body.len());
        return ok_empty();
    };

    let msg_type = safe_get(&payload, &["message", "type"])
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    info!("vapi_webhook: received type={}", msg_type);

    let call_obj = safe_get(&payload, &["message", "call"]).cloned().unwrap_or(json!({}));
    let vapi_call_id = call_obj.get("id").and_then(|v| v.as_str()).map(String::from);
    let caller_phone = safe_get(&call_obj, &["customer", "number"])
        .and_then(|v| v.as_str())
        .map(String::from);

    let call_service = CallService::new(&state);
    let practice_id = match resolve_practice_id(&call_service, vapi_call_id.as_deref(), &call_obj).await {
        Some(practice_id) => practice_id,
        None => {
            error!(
                "vapi_webhook: could not resolve practice for call {:?}, returning 200",
                vapi_call_id,
            );
            return ok_empty();
        }
    };

    match msg_type.as_str() {
        "assistant-request" => {
            // Use the assistant already configured on the platform dashboard
            info!("vapi_webhook: assistant-request for practice {}", practice_id);
            (StatusCode::OK, Json(json!({"assistant": null}))).into_response()
        }
        "status-update" => {
            handle_status_update(
                &call_service, &payload, &call_obj, practice_id,
                vapi_call_id.as_deref(), caller_phone.as_deref(),
            ).await
        }
        "tool-calls" => {
            handle_tool_calls(&state, &payload, practice_id, vapi_call_id.as_deref()).await
        }
        "function-call" => {
            handle_function_call(&state, &payload, practice_id, vapi_call_id.as_deref()).await
        }
        "end-of-call-report" => {
            handle_end_of_call_report(
                &state, &call_service, &payload, &call_obj, vapi_call_id.as_deref(),
            ).await
        }
        "hang" => {
            info!("vapi_webhook: hang event for call {:?}", vapi_call_id);
            ok_empty()
        }
        other => {
            info!("vapi_webhook: unhandled message type '{}'", other);
            ok_empty()
        }
    }
}

/// Resolve the tenant: an existing call record first (fastest for mid-call
/// events), then the dialed number. Unresolved events are dropped; there is
/// no default practice.
async fn resolve_practice_id(
    call_service: &CallService,
    vapi_call_id: Option<&str>,
    call_obj: &Value,
) -> Option<Uuid> {
    if let Some(call_id) = vapi_call_id {
        match call_service.practice_id_for_call(call_id).await {
            Ok(Some(practice_id)) => return Some(practice_id),
            Ok(None) => {}
            Err(e) => warn!("vapi_webhook: call lookup failed: {}", e),
        }
    }

    let phone_number = safe_get(call_obj, &["phoneNumber", "number"])
        .or_else(|| safe_get(call_obj, &["phoneNumber", "twilioPhoneNumber"]))
        .or_else(|| {
            call_obj.get("phoneNumber").filter(|v| v.is_string())
        })
        .and_then(|v| v.as_str());

    if let Some(phone) = phone_number {
        match call_service.resolve_practice_from_phone(phone).await {
            Ok(Some(practice_id)) => return Some(practice_id),
            Ok(None) => {}
            Err(e) => warn!("vapi_webhook: phone resolution failed: {}", e),
        }
    }

    error!(
        "vapi_webhook: could not resolve practice from call_id={:?} or phone number. \
         Ensure the voice phone number is configured in the practice config.",
        vapi_call_id,
    );
    None
}

// ==============================================================================
// STATUS UPDATE
// ==============================================================================

async fn handle_status_update(
    call_service: &CallService,
    payload: &Value,
    call_obj: &Value,
    practice_id: Uuid,
    vapi_call_id: Option<&str>,
    caller_phone: Option<&str>,
) -> Response {
    let status = safe_get(payload, &["message", "status"])
        .or_else(|| call_obj.get("status"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    info!("vapi_webhook: status-update status={} call={:?}", status, vapi_call_id);

    let Some(vapi_call_id) = vapi_call_id else {
        warn!("vapi_webhook: status-update with no call id");
        return ok_empty();
    };

    let call_type = call_obj.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let direction = if call_type.to_lowercase().contains("outbound") {
        "outbound"
    } else {
        "inbound"
    };

    let result = match status {
        "in-progress" => {
            call_service.create_or_update_call(
                practice_id, vapi_call_id, caller_phone,
                "in-progress", direction, Some(Utc::now()), None,
            ).await.map(|_| ())
        }
        "ended" => {
            match call_service.update_call_status(vapi_call_id, "ended", Some(Utc::now())).await {
                Ok(Some(_)) => Ok(()),
                Ok(None) => {
                    call_service.create_or_update_call(
                        practice_id, vapi_call_id, caller_phone,
                        "ended", direction, None, Some(Utc::now()),
                    ).await.map(|_| ())
                }
                Err(e) => Err(e),
            }
        }
        other => {
            call_service.create_or_update_call(
                practice_id, vapi_call_id, caller_phone,
                other, direction, None, None,
            ).await.map(|_| ())
        }
    };

    if let Err(e) = result {
        error!(
            "vapi_webhook: error handling status-update for call {}: {}",
            vapi_call_id, e,
        );
    }

    ok_empty()
}

// ==============================================================================
// TOOL CALLS
// ==============================================================================

async fn handle_tool_calls(
    config: &Arc<AppConfig>,
    payload: &Value,
    practice_id: Uuid,
    vapi_call_id: Option<&str>,
) -> Response {
    let runtime = ToolRuntime::new(config);
    let mut results: Vec<VapiToolCallResult> = Vec::new();

    // Newer shape: toolWithToolCallList carries the name on the outer
    // object and id + arguments inside toolCall.
    if let Some(items) = safe_get(payload, &["message", "toolWithToolCallList"]).and_then(|v| v.as_array()) {
        for item in items {
            let tool_call = item.get("toolCall").cloned().unwrap_or(json!({}));
            let tool_call_id = tool_call.get("id").and_then(|v| v.as_str()).unwrap_or("");

            let tool_name = item.get("name")
                .and_then(|v| v.as_str())
                .or_else(|| safe_get(&tool_call, &["function", "name"]).and_then(|v| v.as_str()))
                .or_else(|| tool_call.get("name").and_then(|v| v.as_str()));

            let params = parse_params(
                safe_get(&tool_call, &["function", "arguments"])
                    .or_else(|| tool_call.get("arguments")),
            );

            match (tool_name, tool_call_id) {
                (Some(name), id) if !id.is_empty() => {
                    results.push(execute_tool_call(
                        &runtime, practice_id, name, &params, vapi_call_id, id,
                    ).await);
                }
                (_, id) if !id.is_empty() => {
                    warn!("vapi_webhook: skipping tool call with missing name (id={})", id);
                    results.push(VapiToolCallResult {
                        tool_call_id: id.to_string(),
                        result: json!("Error: could not determine tool name"),
                    });
                }
                _ => {
                    warn!("vapi_webhook: skipping tool call with no id");
                }
            }
        }
    }
    // Older shape: toolCallList with function.name / function.arguments
    else if let Some(items) = safe_get(payload, &["message", "toolCallList"]).and_then(|v| v.as_array()) {
        for item in items {
            let tool_call_id = item.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let tool_name = item.get("name")
                .and_then(|v| v.as_str())
                .or_else(|| safe_get(item, &["function", "name"]).and_then(|v| v.as_str()));
            let params = parse_params(safe_get(item, &["function", "arguments"]));

            match tool_name {
                Some(name) => {
                    results.push(execute_tool_call(
                        &runtime, practice_id, name, &params, vapi_call_id, tool_call_id,
                    ).await);
                }
                None => {
                    warn!("vapi_webhook: toolCallList item missing name, id={}", tool_call_id);
                    results.push(VapiToolCallResult {
                        tool_call_id: tool_call_id.to_string(),
                        result: json!("Error: could not determine tool name"),
                    });
                }
            }
        }
    } else {
        warn!("vapi_webhook: tool-calls message but no tool calls found in body");
        return (StatusCode::OK, Json(json!({"results": []}))).into_response();
    }

    (StatusCode::OK, Json(VapiToolCallResponse { results })).into_response()
}

async fn execute_tool_call(
    runtime: &ToolRuntime,
    practice_id: Uuid,
    tool_name: &str,
    params: &Value,
    vapi_call_id: Option<&str>,
    tool_call_id: &str,
) -> VapiToolCallResult {
    // Log the tool and param keys only; values may contain PHI
    info!(
        "vapi_webhook: executing tool '{}' param_keys={:?} (call={:?})",
        tool_name,
        params.as_object().map(|m| m.keys().collect::<Vec<_>>()).unwrap_or_default(),
        vapi_call_id,
    );

    let result = runtime.dispatch(practice_id, tool_name, params, vapi_call_id).await;

    VapiToolCallResult {
        tool_call_id: tool_call_id.to_string(),
        result,
    }
}

// ==============================================================================
// FUNCTION CALL (LEGACY)
// ==============================================================================

async fn handle_function_call(
    config: &Arc<AppConfig>,
    payload: &Value,
    practice_id: Uuid,
    vapi_call_id: Option<&str>,
) -> Response {
    let func_call = safe_get(payload, &["message", "functionCall"]).cloned().unwrap_or(json!({}));
    let Some(func_name) = func_call.get("name").and_then(|v| v.as_str()) else {
        warn!("vapi_webhook: function-call with no function name");
        return (
            StatusCode::OK,
            Json(json!({"result": "Error: no function name provided"})),
        ).into_response();
    };

    let params = parse_params(func_call.get("parameters"));

    info!(
        "vapi_webhook: executing function '{}' (call={:?})",
        func_name, vapi_call_id,
    );

    let runtime = ToolRuntime::new(config);
    let result = runtime.dispatch(practice_id, func_name, &params, vapi_call_id).await;

    (StatusCode::OK, Json(json!({"result": result}))).into_response()
}

// ==============================================================================
// END OF CALL REPORT
// ==============================================================================

async fn handle_end_of_call_report(
    config: &Arc<AppConfig>,
    call_service: &CallService,
    payload: &Value,
    call_obj: &Value,
    vapi_call_id: Option<&str>,
) -> Response {
    let Some(vapi_call_id) = vapi_call_id else {
        warn!("vapi_webhook: end-of-call-report with no call id");
        return ok_empty();
    };

    let artifact = safe_get(payload, &["message", "artifact"]).cloned().unwrap_or(json!({}));

    // Prefer the plain text transcript, fall back to joining messages
    let transcript = artifact.get("transcript")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| {
            let messages = artifact.get("messages")?.as_array()?;
            let parts: Vec<String> = messages.iter()
                .filter_map(|m| {
                    let role = m.get("role").and_then(|v| v.as_str()).unwrap_or("unknown");
                    let content = m.get("content")
                        .or_else(|| m.get("message"))
                        .and_then(|v| v.as_str())?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(format!("{}: {}", role, content))
                    }
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        });

    let recording_url = artifact.get("recordingUrl")
        .and_then(|v| v.as_str())
        .or_else(|| safe_get(&artifact, &["recording", "url"]).and_then(|v| v.as_str()))
        .map(String::from);

    let analysis = safe_get(payload, &["message", "analysis"]).cloned().unwrap_or(json!({}));
    let summary = analysis.get("summary").and_then(|v| v.as_str()).map(String::from);
    let structured_data = analysis.get("structuredData").cloned();
    let success_evaluation = analysis.get("successEvaluation")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    let ended_reason = safe_get(payload, &["message", "endedReason"])
        .or_else(|| call_obj.get("endedReason"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let cost = call_obj.get("cost").and_then(|v| v.as_f64());

    // Duration straight from the payload, or computed from the timestamps
    let duration = call_obj.get("duration")
        .and_then(|v| v.as_i64())
        .or_else(|| {
            let started = call_obj.get("startedAt").and_then(|v| v.as_str())?;
            let ended = call_obj.get("endedAt").and_then(|v| v.as_str())?;
            let started = DateTime::parse_from_rfc3339(started).ok()?;
            let ended = DateTime::parse_from_rfc3339(ended).ok()?;
            Some((ended - started).num_seconds())
        });

    info!(
        "vapi_webhook: end-of-call-report call={} reason={:?} cost={:?} duration={:?}",
        vapi_call_id, ended_reason, cost, duration,
    );

    let report = EndOfCallReport {
        transcript,
        recording_url,
        summary,
        duration_seconds: duration,
        cost,
        ended_reason: ended_reason.clone(),
    };

    let call_record = match call_service.save_end_of_call_report(vapi_call_id, &report).await {
        Ok(call) => call,
        Err(e) => {
            error!(
                "vapi_webhook: error saving end-of-call-report for call {}: {}",
                vapi_call_id, e,
            );
            return ok_empty();
        }
    };

    let Some(call_record) = call_record else {
        warn!("vapi_webhook: end-of-call-report for unknown call {}", vapi_call_id);
        return ok_empty();
    };

    if structured_data.is_some() || success_evaluation.is_some() {
        if let Err(e) = call_service.save_structured_analysis(
            call_record.id,
            structured_data.as_ref(),
            success_evaluation.as_deref(),
        ).await {
            warn!("vapi_webhook: failed to save structured data: {}", e);
        }
    }

    // Dropped or missed calls with a known caller get flagged for callback
    let dropped = ended_reason.as_deref()
        .map(|r| CALLBACK_REASONS.contains(&r))
        .unwrap_or(false)
        || duration.map(|d| d < CALLBACK_MIN_DURATION_SECONDS).unwrap_or(false);
    let has_identity = call_record.caller_name.is_some() || call_record.caller_phone.is_some();

    if dropped && has_identity {
        if let Err(e) = call_service.flag_callback_needed(call_record.id).await {
            warn!("vapi_webhook: failed to flag callback: {}", e);
        } else {
            info!(
                "vapi_webhook: flagged call {} for callback (reason={:?})",
                vapi_call_id, ended_reason,
            );
        }
    }

    spawn_feedback_analysis(Arc::clone(config), call_record.id, call_record.practice_id);

    ok_empty()
}

/// Run feedback analysis in the background, retrying transient failures
/// with exponential backoff. Never blocks the webhook response.
fn spawn_feedback_analysis(config: Arc<AppConfig>, call_id: Uuid, practice_id: Uuid) {
    tokio::spawn(async move {
        const MAX_ATTEMPTS: u32 = 3;

        for attempt in 1..=MAX_ATTEMPTS {
            let feedback_service = FeedbackService::new(&config);
            match feedback_service.process_call_feedback(call_id, practice_id).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        "background feedback analysis failed for call {} (attempt {}/{}): {}",
                        call_id, attempt, MAX_ATTEMPTS, e,
                    );
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_secs(2u64.pow(attempt))).await;
                    }
                }
            }
        }
    });
}

// ==============================================================================
// HEALTH
// ==============================================================================

pub async fn vapi_webhook_health() -> Json<Value> {
    Json(json!({"status": "ok", "message": "Voice webhook endpoint is active"}))
}
