// `get_scan_status` and `cancel_scan`.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::errors::ServerError;
use crate::state::AppState;
use crate::task::lifecycle::TaskStatus;
use crate::task::store::TaskUpdateFields;

#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub task_id: String,
    pub status: String,
    pub progress: Option<f32>,
    pub scanner_pool: String,
    pub scanner_type: String,
    pub error_message: Option<String>,
    pub authentication_status: Option<crate::task::AuthenticationStatus>,
}

pub async fn get_scan_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let task_id = path.into_inner();
    let task = state.store.get(&task_id).await?;
    Ok(HttpResponse::Ok().json(ScanStatusResponse {
        task_id: task.task_id,
        status: task.status.as_str().to_string(),
        progress: task.progress,
        scanner_pool: task.scanner_pool,
        scanner_type: task.scanner_type,
        error_message: task.error_message,
        authentication_status: task.authentication_status,
    }))
}

pub async fn cancel_scan(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let task_id = path.into_inner();
    let task = state.store.get(&task_id).await?;

    let mut fields = TaskUpdateFields::default();
    fields.error_message = Some("cancelled by client request".to_string());
    let updated = state.store.update_status(&task.task_id, TaskStatus::Cancelled, fields).await?;

    Ok(HttpResponse::Ok().json(ScanStatusResponse {
        task_id: updated.task_id,
        status: updated.status.as_str().to_string(),
        progress: updated.progress,
        scanner_pool: updated.scanner_pool,
        scanner_type: updated.scanner_type,
        error_message: updated.error_message,
        authentication_status: updated.authentication_status,
    }))
}
