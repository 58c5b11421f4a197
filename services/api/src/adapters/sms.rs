//! services/api/src/adapters/sms.rs
//!
//! Adapters that deliver phone sign-in codes. Implements the `SmsSender` port.

use async_trait::async_trait;
use exit_core::ports::{PortError, PortResult, SmsSender};
use serde::Serialize;
use tracing::{error, info};

/// Writes codes to the log instead of sending them. Used with the auth emulator.
#[derive(Clone, Default)]
pub struct TracingSmsSender;

#[async_trait]
impl SmsSender for TracingSmsSender {
    async fn send_code(&self, phone_number: &str, code: &str) -> PortResult<()> {
        info!("[auth emulator] sign-in code for {}: {}", phone_number, code);
        Ok(())
    }
}

#[derive(Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    body: String,
}

/// Posts each code as JSON to an SMS gateway webhook.
#[derive(Clone)]
pub struct WebhookSmsSender {
    http: reqwest::Client,
    url: String,
}

impl WebhookSmsSender {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl SmsSender for WebhookSmsSender {
    async fn send_code(&self, phone_number: &str, code: &str) -> PortResult<()> {
        let payload = SmsPayload {
            to: phone_number,
            body: format!("Your Ex-It verification code is {}", code),
        };
        self.http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                error!("SMS webhook failed: {}", e);
                PortError::Unavailable(format!("Failed to send verification code: {}", e))
            })?;
        Ok(())
    }
}
