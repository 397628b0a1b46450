use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "android")]
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::Android => "android",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One push registration per user; registering again replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRegistration {
    pub user_id: String,
    pub device_token: String,
    pub os: Platform,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDeviceRequest {
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    #[validate(length(min = 1, max = 4096, message = "Device token must be between 1 and 4096 characters"))]
    pub device_token: String,

    pub os: Platform,
}

impl RegisterDeviceRequest {
    pub fn into_registration(self) -> DeviceRegistration {
        DeviceRegistration {
            user_id: self.user_id,
            device_token: self.device_token,
            os: self.os,
            updated_at: Utc::now(),
        }
    }
}
