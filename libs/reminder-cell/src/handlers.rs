use std::sync::Arc;

use axum::{
    extract::{Form, OriginalUri, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use shared_config::AppConfig;
use waitlist_cell::services::waitlist::WaitlistService;

use crate::models::ReplyAction;
use crate::security::validate_twilio_signature;
use crate::services::replies::ReminderReplyHandler;

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn twiml(message: Option<&str>) -> Response {
    twiml_with_status(StatusCode::OK, message)
}

fn twiml_with_status(status: StatusCode, message: Option<&str>) -> Response {
    let body = match message {
        Some(message) => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
            xml_escape(message),
        ),
        None => "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string(),
    };

    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn form_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// The full URL the provider signed. The proxy's forwarded scheme wins over
/// a plain-HTTP default.
fn request_url(headers: &HeaderMap, uri: &axum::http::Uri) -> String {
    let scheme = headers.get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers.get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}{}", scheme, host, uri)
}

/// Inbound SMS webhook. The endpoint is public, so the provider signature
/// is validated first. Reminder keywords take precedence; a YES/NO with no
/// matching reminder is treated as a waitlist answer; anything else gets a
/// generic pointer to the office line.
pub async fn twilio_sms_reply(
    State(state): State<Arc<AppConfig>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    if state.twilio_auth_token.is_empty() {
        error!("twilio_sms_reply: TWILIO_AUTH_TOKEN not configured");
        return twiml_with_status(StatusCode::INTERNAL_SERVER_ERROR, None);
    }

    let signature = headers.get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let url = request_url(&headers, &uri);
    if !validate_twilio_signature(&state.twilio_auth_token, &url, &params, signature) {
        warn!("twilio_sms_reply: invalid provider signature");
        return twiml_with_status(StatusCode::FORBIDDEN, None);
    }

    let (Some(from), Some(body)) = (form_value(&params, "From"), form_value(&params, "Body")) else {
        warn!("twilio_sms_reply: missing From or Body in request");
        return twiml(None);
    };

    info!(
        "twilio_sms_reply: received SMS sid={:?}",
        form_value(&params, "MessageSid"),
    );

    let reply_handler = ReminderReplyHandler::new(&state);
    match reply_handler.handle_reminder_response(from, body).await {
        Ok(outcome) if outcome.action_taken != ReplyAction::NoMatch => {
            return twiml(Some(&outcome.reply_message));
        }
        Ok(_) => {}
        Err(e) => {
            warn!("twilio_sms_reply: reminder reply handling failed: {}", e);
            return twiml(None);
        }
    }

    // No reminder matched; maybe this is an answer to a waitlist offer
    let waitlist_service = WaitlistService::new(&state);
    match waitlist_service.process_response(from, body).await {
        Ok(Some((_, "booked"))) => twiml(Some(
            "Great news! We have confirmed your spot. Our office will call you shortly to finalize the time.",
        )),
        Ok(Some(_)) => twiml(Some(
            "No problem, we have released the slot. You remain welcome to call our office anytime.",
        )),
        Ok(None) => twiml(Some(
            "Thanks for your message. Please call our office and we will be happy to help.",
        )),
        Err(e) => {
            warn!("twilio_sms_reply: waitlist reply handling failed: {}", e);
            twiml(None)
        }
    }
}
