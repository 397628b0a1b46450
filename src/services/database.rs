use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
    sql::Thing,
};
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::DatabaseConfig;
use crate::error::NotifyError;
use crate::models::{
    device::{DeviceRegistration, Platform},
    notification::{CommentSnapshot, NewNotification, Notification, NotificationType},
    user::UserProfile,
};
use crate::services::store::{NotificationStore, UserDirectory};

const NOTIFICATIONS: &str = "notifications";
const DEVICES: &str = "device_registrations";
const USERS: &str = "users";

#[derive(Clone)]
pub struct DatabaseService {
    db: Surreal<Any>,
}

#[derive(Debug, Deserialize)]
struct NotificationRow {
    id: Thing,
    sender: String,
    receiver: String,
    content: String,
    message: String,
    #[serde(default)]
    comment: Option<CommentSnapshot>,
    #[serde(rename = "type")]
    notification_type: NotificationType,
    read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id.id.to_raw(),
            sender: row.sender,
            receiver: row.receiver,
            content: row.content,
            message: row.message,
            comment: row.comment,
            notification_type: row.notification_type,
            read: row.read,
            created_at: row.created_at,
        }
    }
}

/// Record body; the id lives in the record key.
#[derive(Debug, Serialize)]
struct NotificationContent {
    sender: String,
    receiver: String,
    content: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<CommentSnapshot>,
    #[serde(rename = "type")]
    notification_type: NotificationType,
    read: bool,
    created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationContent {
    fn from(notification: &Notification) -> Self {
        Self {
            sender: notification.sender.clone(),
            receiver: notification.receiver.clone(),
            content: notification.content.clone(),
            message: notification.message.clone(),
            comment: notification.comment.clone(),
            notification_type: notification.notification_type,
            read: notification.read,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(default)]
    promotion: Option<String>,
}

impl DatabaseService {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db = if config.url.starts_with("memory://") {
            any::connect("mem://").await?
        } else if ["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| config.url.starts_with(scheme))
        {
            let db = any::connect(config.url.as_str()).await?;
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                db.signin(Root {
                    username: username.as_str(),
                    password: password.as_str(),
                })
                .await?;
            }
            db
        } else {
            return Err(anyhow!("Unsupported database URL: {}", config.url));
        };

        db.use_ns(config.namespace.as_str()).use_db(config.database.as_str()).await?;

        let service = Self { db };
        service.initialize_schema().await?;

        Ok(service)
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.db.query("
            DEFINE TABLE notifications SCHEMALESS;
            DEFINE INDEX notifications_receiver ON notifications COLUMNS receiver;
            DEFINE INDEX notifications_unread ON notifications COLUMNS receiver, read;
        ").await?;

        // One record per user, keyed by user id
        self.db.query("
            DEFINE TABLE device_registrations SCHEMALESS;
            DEFINE INDEX device_registrations_os ON device_registrations COLUMNS os;
        ").await?;

        log::info!("Database schema initialized successfully");
        Ok(())
    }

    /// Writes the cohort attribute of a user record.
    pub async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let _: Option<UserRow> = self.db
            .update((USERS, profile.id.as_str()))
            .merge(serde_json::json!({ "promotion": profile.promotion }))
            .await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.db.health().await?;
        Ok(())
    }

    async fn owned_notification(&self, user_id: &str, notification_id: &str) -> Result<Option<NotificationRow>, NotifyError> {
        let row: Option<NotificationRow> = self.db.select((NOTIFICATIONS, notification_id)).await?;
        Ok(row.filter(|row| row.receiver == user_id))
    }
}

#[async_trait]
impl NotificationStore for DatabaseService {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification, NotifyError> {
        if new.receiver.is_empty() {
            return Err(NotifyError::MissingReceiver);
        }

        let notification = new.into_notification();
        let created: Option<NotificationRow> = self.db
            .create((NOTIFICATIONS, notification.id.as_str()))
            .content(NotificationContent::from(&notification))
            .await?;

        created
            .map(Notification::from)
            .ok_or_else(|| NotifyError::Persistence("Failed to create notification".to_string()))
    }

    async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>, NotifyError> {
        let rows: Vec<NotificationRow> = self.db
            .query("SELECT * FROM notifications WHERE receiver = $receiver")
            .bind(("receiver", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(newest_first(rows))
    }

    async fn unread_notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>, NotifyError> {
        let rows: Vec<NotificationRow> = self.db
            .query("SELECT * FROM notifications WHERE receiver = $receiver AND read = false")
            .bind(("receiver", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(newest_first(rows))
    }

    async fn count_unread(&self, user_id: &str) -> Result<u32, NotifyError> {
        let result: Vec<serde_json::Value> = self.db
            .query("SELECT count() FROM notifications WHERE receiver = $receiver AND read = false GROUP ALL")
            .bind(("receiver", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(extract_count(&result) as u32)
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<bool, NotifyError> {
        if self.owned_notification(user_id, notification_id).await?.is_none() {
            return Ok(false);
        }

        let _: Option<NotificationRow> = self.db
            .update((NOTIFICATIONS, notification_id))
            .merge(serde_json::json!({ "read": true }))
            .await?;
        Ok(true)
    }

    async fn remove_notification(&self, user_id: &str, notification_id: &str) -> Result<bool, NotifyError> {
        if self.owned_notification(user_id, notification_id).await?.is_none() {
            return Ok(false);
        }

        let _: Option<NotificationRow> = self.db.delete((NOTIFICATIONS, notification_id)).await?;
        Ok(true)
    }

    async fn save_device(&self, registration: DeviceRegistration) -> Result<DeviceRegistration, NotifyError> {
        let saved: Option<DeviceRegistration> = self.db
            .update((DEVICES, registration.user_id.as_str()))
            .content(registration.clone())
            .await?;

        saved.ok_or_else(|| NotifyError::Persistence("Failed to save device registration".to_string()))
    }

    async fn device_for_user(&self, user_id: &str) -> Result<Option<DeviceRegistration>, NotifyError> {
        let device: Option<DeviceRegistration> = self.db.select((DEVICES, user_id)).await?;
        Ok(device)
    }

    async fn devices_for_platform(&self, platform: Platform) -> Result<Vec<DeviceRegistration>, NotifyError> {
        let devices: Vec<DeviceRegistration> = self.db
            .query("SELECT * FROM device_registrations WHERE os = $os")
            .bind(("os", platform.as_str().to_string()))
            .await?
            .take(0)?;
        Ok(devices)
    }
}

#[async_trait]
impl UserDirectory for DatabaseService {
    async fn cohort_of(&self, user_id: &str) -> Result<Option<String>, NotifyError> {
        let user: Option<UserRow> = self.db.select((USERS, user_id)).await?;
        Ok(user.and_then(|row| UserProfile::new(user_id, row.promotion.as_deref()).cohort()))
    }
}

fn newest_first(rows: Vec<NotificationRow>) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = rows.into_iter().map(Notification::from).collect();
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notifications
}

fn extract_count(result: &[serde_json::Value]) -> u64 {
    result.first()
        .and_then(|v| v.get("count"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like_for(receiver: &str, content: &str) -> NewNotification {
        NewNotification {
            sender: "sender".to_string(),
            receiver: receiver.to_string(),
            content: content.to_string(),
            message: "liked your post".to_string(),
            comment: None,
            notification_type: NotificationType::Like,
        }
    }

    fn device(user_id: &str, token: &str, os: Platform) -> DeviceRegistration {
        DeviceRegistration {
            user_id: user_id.to_string(),
            device_token: token.to_string(),
            os,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_notification_operations() {
        let db = DatabaseService::new(&DatabaseConfig::memory()).await.unwrap();

        let first = db.create_notification(like_for("alice", "p1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = db.create_notification(like_for("alice", "p2")).await.unwrap();
        db.create_notification(like_for("bob", "p3")).await.unwrap();

        let listed = db.notifications_for_user("alice").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(db.count_unread("alice").await.unwrap(), 2);

        assert!(db.mark_read("alice", &first.id).await.unwrap());
        assert_eq!(db.count_unread("alice").await.unwrap(), 1);
        assert_eq!(db.unread_notifications_for_user("alice").await.unwrap()[0].id, second.id);
        // Marked read, still listed
        assert_eq!(db.notifications_for_user("alice").await.unwrap().len(), 2);

        assert!(db.remove_notification("alice", &second.id).await.unwrap());
        assert_eq!(db.notifications_for_user("alice").await.unwrap().len(), 1);
        assert_eq!(db.count_unread("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_foreign_notification_is_untouched() {
        let db = DatabaseService::new(&DatabaseConfig::memory()).await.unwrap();
        let bobs = db.create_notification(like_for("bob", "p1")).await.unwrap();

        assert!(!db.mark_read("alice", &bobs.id).await.unwrap());
        assert!(!db.remove_notification("alice", &bobs.id).await.unwrap());
        assert!(!db.mark_read("alice", "missing").await.unwrap());
        assert_eq!(db.count_unread("bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_receiver_rejected() {
        let db = DatabaseService::new(&DatabaseConfig::memory()).await.unwrap();
        let result = db.create_notification(like_for("", "p1")).await;
        assert!(matches!(result, Err(NotifyError::MissingReceiver)));
    }

    #[tokio::test]
    async fn test_device_registration_overwrites() {
        let db = DatabaseService::new(&DatabaseConfig::memory()).await.unwrap();

        db.save_device(device("alice", "token-a", Platform::Ios)).await.unwrap();
        db.save_device(device("bob", "token-b", Platform::Android)).await.unwrap();
        db.save_device(device("alice", "token-a2", Platform::Android)).await.unwrap();

        let alice = db.device_for_user("alice").await.unwrap().unwrap();
        assert_eq!(alice.device_token, "token-a2");
        assert_eq!(alice.os, Platform::Android);

        assert!(db.devices_for_platform(Platform::Ios).await.unwrap().is_empty());
        assert_eq!(db.devices_for_platform(Platform::Android).await.unwrap().len(), 2);
        assert!(db.device_for_user("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cohort_lookup() {
        let db = DatabaseService::new(&DatabaseConfig::memory()).await.unwrap();
        db.save_user_profile(&UserProfile::new("alice", Some("3info"))).await.unwrap();
        db.save_user_profile(&UserProfile::new("bob", None)).await.unwrap();

        assert_eq!(db.cohort_of("alice").await.unwrap(), Some("3INFO".to_string()));
        assert_eq!(db.cohort_of("bob").await.unwrap(), None);
        assert_eq!(db.cohort_of("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsupported_url() {
        let mut config = DatabaseConfig::memory();
        config.url = "file://campus.db".to_string();
        assert!(DatabaseService::new(&config).await.is_err());
    }
}
