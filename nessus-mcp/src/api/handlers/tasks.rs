// `list_tasks`.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;
use crate::state::AppState;
use crate::task::lifecycle::TaskStatus;
use crate::task::store::TaskFilter;
use crate::task::Task;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scanner_pool: Option<String>,
    #[serde(default)]
    pub scanner_type: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<Task>,
    pub count: usize,
}

pub async fn list_tasks(
    state: web::Data<AppState>,
    query: web::Query<ListTasksQuery>,
) -> Result<HttpResponse, ServerError> {
    let status = match &query.status {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };

    let filter = TaskFilter {
        status,
        scanner_pool: query.scanner_pool.clone(),
        scanner_type: query.scanner_type.clone(),
        target: query.target.clone(),
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let tasks = state.store.list(filter, limit).await?;
    let count = tasks.len();
    Ok(HttpResponse::Ok().json(ListTasksResponse { tasks, count }))
}

fn parse_status(raw: &str) -> Result<TaskStatus, ServerError> {
    match raw {
        "queued" => Ok(TaskStatus::Queued),
        "running" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "timeout" => Ok(TaskStatus::Timeout),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(ServerError::Validation(format!("unknown status '{other}'"))),
    }
}
