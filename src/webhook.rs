//! Outbound webhook delivery boundary.
//!
//! Delivery failures are reported as structured outcomes, never as errors;
//! a run must not fail because its notification did.

use crate::settings::AppSettings;
use chrono::{SecondsFormat, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

const SECRET_HEADER: &str = "X-Voxnote-Secret";

#[derive(Serialize, Debug, Clone)]
pub struct WebhookPayload {
    pub source: &'static str,
    pub created_at: String,
    pub mode: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub transcript: String,
    pub result: Value,
}

impl WebhookPayload {
    pub fn new(mode: &str, kind: &str, route: Option<&str>, transcript: &str, result: Value) -> Self {
        Self {
            source: "voxnote",
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            mode: mode.to_string(),
            kind: kind.to_string(),
            route: route.map(str::to_string),
            transcript: transcript.to_string(),
            result,
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct WebhookOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn send_webhook(settings: &AppSettings, payload: &WebhookPayload) -> WebhookOutcome {
    let url = settings.webhook_url.trim();
    if url.is_empty() {
        return WebhookOutcome {
            ok: false,
            skipped: true,
            ..WebhookOutcome::default()
        };
    }

    let client = reqwest::Client::new();
    let mut request = client.post(url).json(payload);
    let secret = settings.webhook_secret.trim();
    if !secret.is_empty() {
        request = request.header(SECRET_HEADER, secret);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("Webhook delivery failed: {}", err);
            return WebhookOutcome {
                ok: false,
                message: Some(err.to_string()),
                ..WebhookOutcome::default()
            };
        }
    };

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        warn!("Webhook rejected with status {}", status);
        return WebhookOutcome {
            ok: false,
            status: Some(status.as_u16()),
            message: Some(message),
            ..WebhookOutcome::default()
        };
    }

    debug!("Webhook delivered for mode '{}'", payload.mode);
    WebhookOutcome {
        ok: true,
        ..WebhookOutcome::default()
    }
}
