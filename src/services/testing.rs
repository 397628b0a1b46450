//! In-memory doubles for the store and gateway seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{DeliveryResult, NotifyError};
use crate::models::{
    device::{DeviceRegistration, Platform},
    notification::{NewNotification, Notification},
    user::UserProfile,
};
use crate::services::gateway::GatewayClient;
use crate::services::store::{NotificationStore, UserDirectory};

#[derive(Default)]
pub struct MemoryStore {
    notifications: Mutex<Vec<Notification>>,
    devices: Mutex<HashMap<String, DeviceRegistration>>,
    users: Mutex<HashMap<String, UserProfile>>,
    failing_receivers: Mutex<HashSet<String>>,
    failing_lookups: Mutex<HashSet<String>>,
    failing_platforms: Mutex<HashSet<Platform>>,
}

impl MemoryStore {
    pub fn register(&self, user_id: &str, token: &str, os: Platform, promotion: Option<&str>) {
        self.add_user(user_id, promotion);
        self.devices.lock().unwrap().insert(
            user_id.to_string(),
            DeviceRegistration {
                user_id: user_id.to_string(),
                device_token: token.to_string(),
                os,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn add_user(&self, user_id: &str, promotion: Option<&str>) {
        self.users
            .lock()
            .unwrap()
            .insert(user_id.to_string(), UserProfile::new(user_id, promotion));
    }

    /// Makes every write addressed to `user_id` fail.
    pub fn fail_writes_for(&self, user_id: &str) {
        self.failing_receivers.lock().unwrap().insert(user_id.to_string());
    }

    /// Makes cohort lookups for `user_id` fail.
    pub fn fail_lookups_for(&self, user_id: &str) {
        self.failing_lookups.lock().unwrap().insert(user_id.to_string());
    }

    /// Makes listing the devices of `platform` fail.
    pub fn fail_listing(&self, platform: Platform) {
        self.failing_platforms.lock().unwrap().insert(platform);
    }

    pub fn all_notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification, NotifyError> {
        if new.receiver.is_empty() {
            return Err(NotifyError::MissingReceiver);
        }
        if self.failing_receivers.lock().unwrap().contains(&new.receiver) {
            return Err(NotifyError::Persistence("store unavailable".to_string()));
        }
        let notification = new.into_notification();
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(notification)
    }

    async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>, NotifyError> {
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications.iter().rev().filter(|n| n.receiver == user_id).cloned().collect())
    }

    async fn unread_notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>, NotifyError> {
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| n.receiver == user_id && !n.read)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<bool, NotifyError> {
        let mut notifications = self.notifications.lock().unwrap();
        match notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.receiver == user_id)
        {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_notification(&self, user_id: &str, notification_id: &str) -> Result<bool, NotifyError> {
        let mut notifications = self.notifications.lock().unwrap();
        let before = notifications.len();
        notifications.retain(|n| !(n.id == notification_id && n.receiver == user_id));
        Ok(notifications.len() != before)
    }

    async fn save_device(&self, registration: DeviceRegistration) -> Result<DeviceRegistration, NotifyError> {
        self.devices
            .lock()
            .unwrap()
            .insert(registration.user_id.clone(), registration.clone());
        Ok(registration)
    }

    async fn device_for_user(&self, user_id: &str) -> Result<Option<DeviceRegistration>, NotifyError> {
        Ok(self.devices.lock().unwrap().get(user_id).cloned())
    }

    async fn devices_for_platform(&self, platform: Platform) -> Result<Vec<DeviceRegistration>, NotifyError> {
        if self.failing_platforms.lock().unwrap().contains(&platform) {
            return Err(NotifyError::Persistence("store unavailable".to_string()));
        }
        Ok(self
            .devices
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.os == platform)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn cohort_of(&self, user_id: &str) -> Result<Option<String>, NotifyError> {
        if self.failing_lookups.lock().unwrap().contains(user_id) {
            return Err(NotifyError::Persistence("user directory unavailable".to_string()));
        }
        Ok(self.users.lock().unwrap().get(user_id).and_then(UserProfile::cohort))
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub token: String,
    pub notification: Notification,
    pub badge: u32,
}

/// Gateway double that records every attempt.
pub struct RecordingGateway {
    platform: Platform,
    calls: Mutex<Vec<Delivery>>,
    failing_tokens: HashSet<String>,
    hanging_tokens: HashSet<String>,
    latency: Duration,
    completed: AtomicUsize,
}

impl RecordingGateway {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            calls: Mutex::new(Vec::new()),
            failing_tokens: HashSet::new(),
            hanging_tokens: HashSet::new(),
            latency: Duration::ZERO,
            completed: AtomicUsize::new(0),
        }
    }

    /// Every delivery takes `latency` before it answers.
    pub fn slow(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Deliveries that ran to the end, successful or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failing(mut self, token: &str) -> Self {
        self.failing_tokens.insert(token.to_string());
        self
    }

    pub fn hanging(mut self, token: &str) -> Self {
        self.hanging_tokens.insert(token.to_string());
        self
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayClient for RecordingGateway {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn deliver(&self, token: &str, notification: &Notification, badge: u32) -> DeliveryResult {
        self.calls.lock().unwrap().push(Delivery {
            token: token.to_string(),
            notification: notification.clone(),
            badge,
        });

        if self.hanging_tokens.contains(token) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.failing_tokens.contains(token) {
            return Err(NotifyError::gateway(self.platform, "device token rejected"));
        }
        Ok(())
    }
}
