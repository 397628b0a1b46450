use std::sync::Arc;

use crate::error::NotifyError;
use crate::models::device::{DeviceRegistration, Platform};
use crate::services::store::{NotificationStore, UserDirectory};

/// Devices selected for one platform of a broadcast.
#[derive(Debug, Default)]
pub struct BroadcastRecipients {
    pub devices: Vec<DeviceRegistration>,
    /// Users whose cohort could not be looked up, with the lookup error.
    pub unresolved: Vec<(String, NotifyError)>,
}

impl BroadcastRecipients {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.unresolved.is_empty()
    }
}

/// Turns a trigger context into the device registrations to notify.
#[derive(Clone)]
pub struct RecipientResolver {
    store: Arc<dyn NotificationStore>,
    users: Arc<dyn UserDirectory>,
}

impl RecipientResolver {
    pub fn new(store: Arc<dyn NotificationStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { store, users }
    }

    /// `None` means the receiver is notified in-app only.
    pub async fn resolve_single(&self, receiver: &str) -> Result<Option<DeviceRegistration>, NotifyError> {
        self.store.device_for_user(receiver).await
    }

    /// Registrations on `platform` whose owner's cohort is in `cohort_filter`.
    ///
    /// The platform must also be one of `allowed_platforms`. An empty filter
    /// matches every cohort, including users without one. Cohorts compare
    /// case-insensitively.
    ///
    /// Failing to list the platform's devices fails the call. A failed cohort
    /// lookup only drops that user, who is returned in `unresolved`.
    pub async fn resolve_broadcast(
        &self,
        platform: Platform,
        allowed_platforms: &[Platform],
        cohort_filter: &[String],
    ) -> Result<BroadcastRecipients, NotifyError> {
        if !allowed_platforms.contains(&platform) {
            return Ok(BroadcastRecipients::default());
        }

        let wanted: Vec<String> = cohort_filter
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        let devices = self.store.devices_for_platform(platform).await?;
        let mut resolved = BroadcastRecipients {
            devices: Vec::with_capacity(devices.len()),
            unresolved: Vec::new(),
        };

        for device in devices {
            if device.os != platform {
                continue;
            }
            if wanted.is_empty() {
                resolved.devices.push(device);
                continue;
            }
            match self.users.cohort_of(&device.user_id).await {
                Ok(Some(cohort)) if wanted.contains(&cohort.to_uppercase()) => resolved.devices.push(device),
                Ok(_) => {}
                Err(error) => {
                    log::warn!("Cohort lookup for {} failed: {}", device.user_id, error);
                    resolved.unresolved.push((device.user_id, error));
                }
            }
        }

        log::debug!(
            "Resolved {} {} recipients for cohorts {:?} ({} unresolved)",
            resolved.devices.len(),
            platform,
            wanted,
            resolved.unresolved.len()
        );
        Ok(resolved)
    }
}
