use async_trait::async_trait;

use crate::error::NotifyError;
use crate::models::{
    device::{DeviceRegistration, Platform},
    notification::{NewNotification, Notification},
};

/// Persistence for notification records and device registrations.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification, NotifyError>;

    /// Most recent first.
    async fn notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>, NotifyError>;

    async fn unread_notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>, NotifyError>;

    async fn count_unread(&self, user_id: &str) -> Result<u32, NotifyError> {
        Ok(self.unread_notifications_for_user(user_id).await?.len() as u32)
    }

    /// Returns false when the user owns no such notification.
    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<bool, NotifyError>;

    async fn remove_notification(&self, user_id: &str, notification_id: &str) -> Result<bool, NotifyError>;

    async fn save_device(&self, registration: DeviceRegistration) -> Result<DeviceRegistration, NotifyError>;

    async fn device_for_user(&self, user_id: &str) -> Result<Option<DeviceRegistration>, NotifyError>;

    async fn devices_for_platform(&self, platform: Platform) -> Result<Vec<DeviceRegistration>, NotifyError>;
}

/// Read access to the user records owned by the user service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Upper-cased cohort of the user, `None` for unknown users or users without one.
    async fn cohort_of(&self, user_id: &str) -> Result<Option<String>, NotifyError>;
}
