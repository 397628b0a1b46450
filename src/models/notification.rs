use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::device::Platform;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Comment,
    Like,
    Tag,
    Event,
    Post,
}

impl NotificationType {
    /// Comment and tag notifications carry the comment they point at.
    pub fn is_comment_related(&self) -> bool {
        matches!(self, NotificationType::Comment | NotificationType::Tag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Comment => "comment",
            NotificationType::Like => "like",
            NotificationType::Tag => "tag",
            NotificationType::Event => "event",
            NotificationType::Post => "post",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentSnapshot {
    pub id: String,
    pub user: String,
    pub content: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentSnapshot>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification addressed to one receiver, not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentSnapshot>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
}

impl NewNotification {
    pub fn into_notification(self) -> Notification {
        let comment = if self.notification_type.is_comment_related() {
            self.comment
        } else {
            None
        };

        Notification {
            id: Uuid::new_v4().simple().to_string(),
            sender: self.sender,
            receiver: self.receiver,
            content: self.content,
            message: self.message,
            comment,
            notification_type: self.notification_type,
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// Direct user-to-user notification (comment, like, tag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectRequest {
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub message: String,
    #[serde(default)]
    pub comment: Option<CommentSnapshot>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
}

impl DirectRequest {
    pub fn to_new_notification(&self) -> NewNotification {
        NewNotification {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            content: self.content.clone(),
            message: self.message.clone(),
            comment: self.comment.clone(),
            notification_type: self.notification_type,
        }
    }
}

/// Content-level broadcast (new post or event) filtered by platform and cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub sender: String,
    pub content: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub allowed_platforms: Vec<Platform>,
    #[serde(default)]
    pub cohort_filter: Vec<String>,
}

impl BroadcastRequest {
    pub fn for_event(
        sender: String,
        event_id: String,
        message: String,
        platforms: Vec<Platform>,
        promotions: Vec<String>,
    ) -> Self {
        Self {
            sender,
            content: event_id,
            message,
            notification_type: NotificationType::Event,
            allowed_platforms: platforms,
            cohort_filter: promotions,
        }
    }

    pub fn for_post(
        sender: String,
        post_id: String,
        message: String,
        platforms: Vec<Platform>,
        promotions: Vec<String>,
    ) -> Self {
        Self {
            sender,
            content: post_id,
            message,
            notification_type: NotificationType::Post,
            allowed_platforms: platforms,
            cohort_filter: promotions,
        }
    }

    pub fn notification_for(&self, receiver: &str) -> NewNotification {
        NewNotification {
            sender: self.sender.clone(),
            receiver: receiver.to_string(),
            content: self.content.clone(),
            message: self.message.clone(),
            comment: None,
            notification_type: self.notification_type,
        }
    }

    /// Allowed platforms with duplicates dropped, in request order.
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms = Vec::with_capacity(self.allowed_platforms.len());
        for platform in &self.allowed_platforms {
            if !platforms.contains(platform) {
                platforms.push(*platform);
            }
        }
        platforms
    }
}
