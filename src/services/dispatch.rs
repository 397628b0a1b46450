use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::task::JoinHandle;

use crate::error::{DeliveryResult, NotifyError};
use crate::models::{
    device::{DeviceRegistration, Platform},
    notification::{BroadcastRequest, DirectRequest, NewNotification, Notification},
};
use crate::services::gateway::{GatewayClient, GatewayRegistry};
use crate::services::resolver::RecipientResolver;
use crate::services::store::{NotificationStore, UserDirectory};

/// Outcome of one trigger call.
#[derive(Debug, Default, Serialize)]
pub struct DispatchReport {
    pub persisted: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<RecipientFailure>,
}

#[derive(Debug, Serialize)]
pub struct RecipientFailure {
    pub receiver: String,
    pub notification_id: Option<String>,
    #[serde(serialize_with = "display")]
    pub error: NotifyError,
}

fn display<S: Serializer>(error: &NotifyError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl DispatchReport {
    fn record_delivery(&mut self, receiver: &str, notification_id: &str, result: DeliveryResult) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(error) => {
                log::warn!("Push to {} failed: {}", receiver, error);
                self.failures.push(RecipientFailure {
                    receiver: receiver.to_string(),
                    notification_id: Some(notification_id.to_string()),
                    error,
                });
            }
        }
    }
}

struct PendingDelivery {
    receiver: String,
    notification_id: String,
    platform: Platform,
    handle: JoinHandle<DeliveryResult>,
}

/// Persists notifications and fans them out to the push gateways.
#[derive(Clone)]
pub struct DispatchEngine {
    store: Arc<dyn NotificationStore>,
    resolver: RecipientResolver,
    gateways: GatewayRegistry,
    delivery_timeout: Duration,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        gateways: GatewayRegistry,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            resolver: RecipientResolver::new(store.clone(), users),
            store,
            gateways,
            delivery_timeout,
        }
    }

    /// Notifies one user. A store failure aborts the call; a push failure is
    /// reported and leaves the stored notification in place.
    pub async fn trigger_for_user(&self, request: DirectRequest) -> Result<DispatchReport, NotifyError> {
        if request.receiver.is_empty() {
            return Err(NotifyError::MissingReceiver);
        }

        let device = self.resolver.resolve_single(&request.receiver).await?;
        let (notification, badge) = self.persist(request.to_new_notification()).await?;

        let mut report = DispatchReport {
            persisted: 1,
            ..Default::default()
        };

        let Some(device) = device else {
            log::debug!("{} has no registered device, notification {} stays in-app", request.receiver, notification.id);
            return Ok(report);
        };

        let result = match self.gateways.get(device.os) {
            Some(gateway) => {
                report.attempted = 1;
                deliver_with_deadline(gateway, device.device_token, notification.clone(), badge, self.delivery_timeout).await
            }
            None => Err(NotifyError::NoGateway(device.os)),
        };
        report.record_delivery(&notification.receiver, &notification.id, result);

        Ok(report)
    }

    /// Notifies every device matching the request's platforms and cohorts.
    ///
    /// Recipients for every platform are resolved before anything is stored
    /// or sent, so a failure to list devices fails the call with no delivery
    /// in flight. Once scheduling starts the call returns only after every
    /// delivery has finished or failed; per-recipient errors, including a
    /// failed cohort lookup, are collected in the report.
    pub async fn trigger_for_broadcast(&self, request: BroadcastRequest) -> Result<DispatchReport, NotifyError> {
        let mut resolved = Vec::new();
        for platform in request.platforms() {
            let recipients = self.resolver
                .resolve_broadcast(platform, &request.allowed_platforms, &request.cohort_filter)
                .await?;
            if !recipients.is_empty() {
                resolved.push((platform, recipients));
            }
        }

        let mut report = DispatchReport::default();
        let mut pending: Vec<PendingDelivery> = Vec::new();

        for (platform, recipients) in resolved {
            for (receiver, error) in recipients.unresolved {
                report.failures.push(RecipientFailure {
                    receiver,
                    notification_id: None,
                    error,
                });
            }

            let gateway = self.gateways.get(platform);
            for device in recipients.devices {
                match self.schedule(&request, device, gateway.clone()).await {
                    Ok(delivery) => {
                        report.persisted += 1;
                        report.attempted += 1;
                        pending.push(delivery);
                    }
                    Err(failure) => {
                        if failure.notification_id.is_some() {
                            report.persisted += 1;
                        }
                        log::warn!("Skipping {}: {}", failure.receiver, failure.error);
                        report.failures.push(failure);
                    }
                }
            }
        }

        for delivery in pending {
            let platform = delivery.platform;
            let result = delivery.handle.await.unwrap_or_else(|e| {
                Err(NotifyError::gateway(platform, format!("delivery task aborted: {}", e)))
            });
            report.record_delivery(&delivery.receiver, &delivery.notification_id, result);
        }

        log::info!(
            "Broadcast {} {}: {} stored, {} pushed, {} failed",
            request.notification_type,
            request.content,
            report.persisted,
            report.delivered,
            report.failures.len()
        );
        Ok(report)
    }

    /// Persists the recipient's copy and spawns its delivery.
    async fn schedule(
        &self,
        request: &BroadcastRequest,
        device: DeviceRegistration,
        gateway: Option<Arc<dyn GatewayClient>>,
    ) -> Result<PendingDelivery, RecipientFailure> {
        let receiver = device.user_id.clone();
        let (notification, badge) = self.persist(request.notification_for(&receiver))
            .await
            .map_err(|error| RecipientFailure {
                receiver: receiver.clone(),
                notification_id: None,
                error,
            })?;

        let Some(gateway) = gateway else {
            return Err(RecipientFailure {
                receiver,
                notification_id: Some(notification.id),
                error: NotifyError::NoGateway(device.os),
            });
        };

        let notification_id = notification.id.clone();
        let handle = tokio::spawn(deliver_with_deadline(
            gateway,
            device.device_token,
            notification,
            badge,
            self.delivery_timeout,
        ));
        Ok(PendingDelivery {
            receiver,
            notification_id,
            platform: device.os,
            handle,
        })
    }

    /// Stores the notification and returns it with the receiver's unread count.
    async fn persist(&self, new: NewNotification) -> Result<(Notification, u32), NotifyError> {
        let notification = self.store.create_notification(new).await?;
        let badge = self.store.count_unread(&notification.receiver).await?;
        log::debug!(
            "Stored {} notification {} for {} (unread {})",
            notification.notification_type,
            notification.id,
            notification.receiver,
            badge
        );
        Ok((notification, badge))
    }
}

async fn deliver_with_deadline(
    gateway: Arc<dyn GatewayClient>,
    token: String,
    notification: Notification,
    badge: u32,
    deadline: Duration,
) -> DeliveryResult {
    match tokio::time::timeout(deadline, gateway.deliver(&token, &notification, badge)).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Timeout {
            platform: gateway.platform(),
            after: deadline,
        }),
    }
}
