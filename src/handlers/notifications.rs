use actix_web::{HttpResponse, Result, get, post, delete};
use actix_web::web::{Data, Json, Path, Query};
use validator::Validate;

use crate::error::NotifyError;
use crate::models::{
    common::{ApiResponse, NotificationList, RemoveQuery},
    device::{DeviceRegistration, RegisterDeviceRequest},
    notification::{BroadcastRequest, DirectRequest},
};
use crate::services::{
    database::DatabaseService,
    dispatch::{DispatchEngine, DispatchReport},
    store::NotificationStore,
};

async fn list_for(db: &DatabaseService, user_id: &str) -> Result<NotificationList, NotifyError> {
    Ok(NotificationList {
        notifications: db.notifications_for_user(user_id).await?,
        unread: db.count_unread(user_id).await?,
    })
}

fn store_error(e: NotifyError) -> HttpResponse {
    log::error!("Notification store error: {}", e);
    HttpResponse::InternalServerError().json(ApiResponse::<()>::error(e.to_string()))
}

// POST /notifications
#[post("")]
pub async fn register_device(
    db: Data<DatabaseService>,
    payload: Json<RegisterDeviceRequest>,
) -> Result<HttpResponse> {
    let request = payload.into_inner();
    if let Err(errors) = request.validate() {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(errors.to_string())));
    }

    let registration = request.into_registration();
    log::info!("Registering {} device for {}", registration.os, registration.user_id);

    match db.save_device(registration).await {
        Ok(saved) => Ok(HttpResponse::Ok().json(ApiResponse::<DeviceRegistration>::success(saved))),
        Err(e) => Ok(store_error(e)),
    }
}

// GET /notifications/{user_id}
#[get("/{user_id}")]
pub async fn get_notifications(
    db: Data<DatabaseService>,
    path: Path<String>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();

    match list_for(&db, &user_id).await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(store_error(e)),
    }
}

// DELETE /notifications/{user_id}/{notification_id}
#[delete("/{user_id}/{notification_id}")]
pub async fn read_notification(
    db: Data<DatabaseService>,
    path: Path<(String, String)>,
    query: Query<RemoveQuery>,
) -> Result<HttpResponse> {
    let (user_id, notification_id) = path.into_inner();

    let changed = if query.purge {
        db.remove_notification(&user_id, &notification_id).await
    } else {
        db.mark_read(&user_id, &notification_id).await
    };

    match changed {
        Ok(false) => Ok(HttpResponse::NotFound().json(ApiResponse::<()>::error(
            "Notification not found".to_string(),
        ))),
        Ok(true) => match list_for(&db, &user_id).await {
            Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
            Err(e) => Ok(store_error(e)),
        },
        Err(e) => Ok(store_error(e)),
    }
}

// POST /notifications/dispatch/user
#[post("/dispatch/user")]
pub async fn dispatch_user(
    engine: Data<DispatchEngine>,
    payload: Json<DirectRequest>,
) -> Result<HttpResponse> {
    match engine.trigger_for_user(payload.into_inner()).await {
        Ok(report) => Ok(HttpResponse::Ok().json(ApiResponse::<DispatchReport>::success(report))),
        Err(NotifyError::MissingReceiver) => Ok(HttpResponse::BadRequest().json(
            ApiResponse::<()>::error(NotifyError::MissingReceiver.to_string()),
        )),
        Err(e) => Ok(store_error(e)),
    }
}

// POST /notifications/dispatch/broadcast
#[post("/dispatch/broadcast")]
pub async fn dispatch_broadcast(
    engine: Data<DispatchEngine>,
    payload: Json<BroadcastRequest>,
) -> Result<HttpResponse> {
    match engine.trigger_for_broadcast(payload.into_inner()).await {
        Ok(report) => Ok(HttpResponse::Ok().json(ApiResponse::<DispatchReport>::success(report))),
        Err(e) => Ok(store_error(e)),
    }
}
