pub mod apns;
pub mod fcm;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::PushConfig;
use crate::error::DeliveryResult;
use crate::models::{device::Platform, notification::Notification};

pub use apns::ApnsGateway;
pub use fcm::FcmGateway;

/// A push service for one mobile platform.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    fn platform(&self) -> Platform;

    async fn deliver(&self, token: &str, notification: &Notification, badge: u32) -> DeliveryResult;
}

/// Gateway clients keyed by the platform they serve.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    clients: HashMap<Platform, Arc<dyn GatewayClient>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PushConfig) -> Result<Self> {
        Ok(Self::new()
            .with(Arc::new(ApnsGateway::new(config.apns.clone(), config.environment)))
            .with(Arc::new(FcmGateway::new(config.fcm.clone(), config.environment)?)))
    }

    /// Registers `client`, replacing any client already serving its platform.
    pub fn with(mut self, client: Arc<dyn GatewayClient>) -> Self {
        self.clients.insert(client.platform(), client);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn GatewayClient>> {
        self.clients.get(&platform).cloned()
    }
}
