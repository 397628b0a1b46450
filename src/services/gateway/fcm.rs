use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::config::{Environment, FcmConfig};
use crate::error::{DeliveryResult, NotifyError};
use crate::models::{device::Platform, notification::Notification};
use crate::services::gateway::GatewayClient;

/// Android delivery through the FCM legacy HTTP API.
#[derive(Clone)]
pub struct FcmGateway {
    client: Client,
    config: FcmConfig,
    environment: Environment,
}

#[derive(Debug, Default, Deserialize)]
pub struct FcmResponse {
    #[serde(default)]
    pub multicast_id: Option<i64>,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failure: u32,
    #[serde(default)]
    pub canonical_ids: u32,
    #[serde(default)]
    pub results: Vec<FcmResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FcmResult {
    #[serde(default)]
    pub error: Option<String>,
}

impl FcmResponse {
    /// Collapses per-token results into an error message when anything failed.
    pub fn failure_reason(&self) -> Option<String> {
        if self.failure == 0 {
            return None;
        }
        let errors: Vec<&str> = self.results
            .iter()
            .filter_map(|r| r.error.as_deref())
            .collect();
        if errors.is_empty() {
            Some(format!("{} message(s) failed", self.failure))
        } else {
            Some(errors.join(", "))
        }
    }
}

impl FcmGateway {
    pub fn new(config: FcmConfig, environment: Environment) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            environment,
        })
    }

    pub fn restricted_package(&self) -> &str {
        self.config.package_for(self.environment)
    }

    pub fn build_message(&self, token: &str, notification: &Notification) -> Value {
        json!({
            "to": token,
            "data": notification,
            "restricted_package_name": self.restricted_package(),
        })
    }

    async fn send(&self, token: &str, notification: &Notification) -> Result<FcmResponse> {
        let message = self.build_message(token, notification);

        let response = self.client
            .post(&self.config.endpoint)
            .header("Authorization", format!("key={}", self.config.server_key))
            .header("Content-Type", "application/json")
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("FCM returned {}: {}", status, error_text));
        }

        let body: FcmResponse = response.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl GatewayClient for FcmGateway {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn deliver(&self, token: &str, notification: &Notification, badge: u32) -> DeliveryResult {
        log::debug!(
            "Sending android notification {} to {} (unread {})",
            notification.id,
            notification.receiver,
            badge
        );

        let response = self.send(token, notification)
            .await
            .map_err(|e| NotifyError::gateway(Platform::Android, e.to_string()))?;

        match response.failure_reason() {
            Some(reason) => Err(NotifyError::gateway(Platform::Android, reason)),
            None => {
                log::info!(
                    "Android notification {} accepted (multicast {:?}, canonical ids {})",
                    notification.id,
                    response.multicast_id,
                    response.canonical_ids
                );
                if response.canonical_ids > 0 {
                    log::warn!("FCM returned a canonical id for {}'s device token", notification.receiver);
                }
                Ok(())
            }
        }
    }
}
