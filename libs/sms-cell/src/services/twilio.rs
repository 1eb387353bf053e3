use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, warn};

use shared_utils::phone::is_valid_e164;

use crate::models::{SmsSendResult, TwilioCredentials};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 3;

// One HTTP client per credential pair, bounded to 16 entries so credential
// rotation cannot grow the cache without limit.
const CLIENT_CACHE_CAPACITY: usize = 16;

struct ClientCache {
    clients: HashMap<(String, String), Arc<Client>>,
    insertion_order: VecDeque<(String, String)>,
}

fn client_cache() -> &'static Mutex<ClientCache> {
    static CACHE: OnceLock<Mutex<ClientCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(ClientCache {
        clients: HashMap::new(),
        insertion_order: VecDeque::new(),
    }))
}

fn cached_client(account_sid: &str, auth_token: &str) -> Arc<Client> {
    let key = (account_sid.to_string(), auth_token.to_string());
    let mut cache = client_cache().lock().expect("sms client cache poisoned");

    if let Some(client) = cache.clients.get(&key) {
        return Arc::clone(client);
    }

    while cache.clients.len() >= CLIENT_CACHE_CAPACITY {
        if let Some(oldest) = cache.insertion_order.pop_front() {
            cache.clients.remove(&oldest);
        } else {
            break;
        }
    }

    let client = Arc::new(
        Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new()),
    );
    cache.clients.insert(key.clone(), Arc::clone(&client));
    cache.insertion_order.push_back(key);
    client
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
}

/// Send one SMS through the provider messages endpoint.
///
/// Transient failures (429, 5xx, network errors, timeouts) are retried up to
/// three times with exponential backoff. Other 4xx responses are permanent
/// and fail immediately. Both numbers must already be E.164.
pub async fn send_sms(
    api_base: &str,
    credentials: &TwilioCredentials,
    to_number: &str,
    body: &str,
) -> SmsSendResult {
    if !is_valid_e164(to_number) {
        error!("send_sms: invalid to_number format");
        return SmsSendResult::failed(format!("Invalid phone number format: {}", to_number));
    }
    if !is_valid_e164(&credentials.from_number) {
        error!("send_sms: invalid from_number format");
        return SmsSendResult::failed(format!(
            "Invalid from_number format: {}", credentials.from_number,
        ));
    }

    let client = cached_client(&credentials.account_sid, &credentials.auth_token);
    let url = format!(
        "{}/2010-04-01/Accounts/{}/Messages.json",
        api_base, credentials.account_sid,
    );

    let params = [
        ("To", to_number),
        ("From", credentials.from_number.as_str()),
        ("Body", body),
    ];

    let mut last_error = String::new();

    for attempt in 1..=MAX_RETRIES {
        let response = client
            .post(&url)
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&params)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    match resp.json::<TwilioMessageResponse>().await {
                        Ok(message) => {
                            info!(
                                "SMS sent successfully: SID={} (attempt {})",
                                message.sid, attempt,
                            );
                            return SmsSendResult::sent(message.sid);
                        }
                        Err(e) => {
                            last_error = format!("Failed to parse provider response: {}", e);
                        }
                    }
                } else {
                    let body_text = resp.text().await.unwrap_or_default();
                    last_error = format!("Provider error ({}): {}", status, body_text);

                    if status.as_u16() == 429 {
                        warn!(
                            "SMS provider rate limit (429) (attempt {}/{})",
                            attempt, MAX_RETRIES,
                        );
                    } else if status.is_client_error() {
                        // Other 4xx client errors are permanent
                        error!(
                            "SMS provider client error (attempt {}/{}): {}",
                            attempt, MAX_RETRIES, last_error,
                        );
                        return SmsSendResult::failed_permanently(last_error);
                    } else {
                        warn!(
                            "SMS provider server error (attempt {}/{}): {}",
                            attempt, MAX_RETRIES, last_error,
                        );
                    }
                }
            }
            Err(e) => {
                last_error = format!("Network/runtime error: {}", e);
                warn!(
                    "Transient error sending SMS (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e,
                );
            }
        }

        if attempt < MAX_RETRIES {
            let backoff = Duration::from_secs(2u64.pow(attempt - 1));
            tokio::time::sleep(backoff).await;
        }
    }

    error!("SMS failed after {} attempts: {}", MAX_RETRIES, last_error);
    SmsSendResult::failed(last_error)
}
