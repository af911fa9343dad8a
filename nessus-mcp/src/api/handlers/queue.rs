// `get_queue_status` and dead-letter queue administration.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::errors::ServerError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub pool: String,
    pub depth: u64,
    pub dlq_depth: u64,
}

pub async fn get_queue_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let pool = path.into_inner();
    let depth = state.queue.depth(&pool).await.map_err(|e| ServerError::Internal(e.to_string()))?;
    let dlq_depth = state.queue.dlq_depth(&pool).await.map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok().json(QueueStatusResponse { pool, depth, dlq_depth }))
}

#[derive(Debug, serde::Deserialize)]
pub struct DlqListQuery {
    #[serde(default = "default_limit")]
    pub limit: isize,
}

fn default_limit() -> isize {
    100
}

pub async fn list_dlq(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DlqListQuery>,
) -> Result<HttpResponse, ServerError> {
    let pool = path.into_inner();
    let entries = state
        .queue
        .list_dlq(&pool, query.limit)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn get_dlq_entry(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServerError> {
    let (pool, task_id) = path.into_inner();
    let entry = state
        .queue
        .get_dlq_entry(&pool, &task_id)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .ok_or_else(|| ServerError::NotFound(format!("no dead-lettered entry for task '{task_id}' in pool '{pool}'")))?;
    Ok(HttpResponse::Ok().json(entry))
}

pub async fn retry_dlq(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServerError> {
    let (pool, task_id) = path.into_inner();
    let now = chrono::Utc::now().to_rfc3339();
    let retried = state
        .queue
        .retry_dlq(&pool, &task_id, &now)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    if !retried {
        return Err(ServerError::NotFound(format!(
            "no dead-lettered entry for task '{task_id}' in pool '{pool}'"
        )));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"retried": true})))
}

pub async fn clear_dlq(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let pool = path.into_inner();
    let count = state.queue.clear_dlq(&pool).await.map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"cleared": count})))
}
