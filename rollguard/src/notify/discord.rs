//! Discord webhook notifier

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::errors::ControllerError;
use crate::notify::{Notifier, Severity};

/// Discord caps embed descriptions at 4096 characters
const MAX_DESCRIPTION: usize = 4000;

pub struct DiscordNotifier {
    client: Client,
    webhook_url: SecretString,
}

impl DiscordNotifier {
    pub fn new(webhook_url: SecretString, timeout: Duration) -> Result<Self, ControllerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }
}

/// Embed colour per severity
pub fn color(severity: Severity) -> u32 {
    match severity {
        Severity::Success => 0x00ff00,
        Severity::Warning => 0xffaa00,
        Severity::Error => 0xff0000,
    }
}

/// Webhook payload with a single embed
pub fn payload(severity: Severity, title: &str, body: &str) -> serde_json::Value {
    let description: String = body.chars().take(MAX_DESCRIPTION).collect();
    json!({
        "embeds": [{
            "title": title,
            "description": description,
            "color": color(severity),
            "timestamp": Utc::now().to_rfc3339(),
            "footer": { "text": format!("rollguard {}", env!("CARGO_PKG_VERSION")) },
        }]
    })
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, severity: Severity, title: &str, body: &str) -> bool {
        debug!(%severity, "Sending Discord notification");

        let response = self
            .client
            .post(self.webhook_url.expose_secret())
            .json(&payload(severity, title, body))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!("Discord webhook rejected notification: {}", resp.status());
                false
            }
            Err(e) => {
                error!("Discord notification failed: {}", e);
                false
            }
        }
    }
}
