// `submit_scan`.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::ServerError;
use crate::metrics::METRICS;
use crate::state::AppState;
use crate::task::{CredentialDescriptor, ScanPayload, ScanType, Task};

#[derive(Debug, Deserialize)]
pub struct SubmitScanRequest {
    pub scan_type: String,
    pub targets: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub credentials: Option<CredentialDescriptor>,
    #[serde(default)]
    pub schema_profile: Option<String>,
    #[serde(default)]
    pub scanner_pool: Option<String>,
    /// Pin the scan to one specific scanner instance instead of letting the
    /// registry pick the least-loaded instance in the pool.
    #[serde(default)]
    pub scanner_instance_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitScanResponse {
    pub task_id: String,
    pub trace_id: String,
    pub status: String,
    pub queue_position: u64,
    pub idempotent: bool,
}

pub async fn submit_scan(
    state: web::Data<AppState>,
    body: web::Json<SubmitScanRequest>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();

    let scan_type: ScanType = request
        .scan_type
        .parse()
        .map_err(|e: String| ServerError::Validation(e))?;

    if scan_type.requires_credentials() {
        let creds = request
            .credentials
            .as_ref()
            .ok_or_else(|| ServerError::Validation(format!("scan_type '{}' requires credentials", request.scan_type)))?;
        creds.validate().map_err(ServerError::Validation)?;
    }

    if request.targets.trim().is_empty() {
        return Err(ServerError::Validation("targets must not be empty".to_string()));
    }
    if request.name.trim().is_empty() {
        return Err(ServerError::Validation("name must not be empty".to_string()));
    }

    let schema_profile = request.schema_profile.unwrap_or_else(|| "brief".to_string());
    if crate::parser::profiles::SchemaProfile::parse(&schema_profile).is_none() {
        return Err(ServerError::Validation(format!("unknown schema_profile '{schema_profile}'")));
    }

    let pool = request.scanner_pool.clone().unwrap_or_else(|| state.registry.get_default_pool());
    let instances = state
        .registry
        .list_instances(&pool)
        .map_err(|_| ServerError::Validation(format!("unknown scanner_pool '{pool}'")))?;
    if let Some(instance_id) = &request.scanner_instance_id {
        if !instances.iter().any(|i| &i.instance_id == instance_id) {
            return Err(ServerError::Validation(format!(
                "unknown scanner_instance_id '{instance_id}' in pool '{pool}'"
            )));
        }
    }

    let payload = ScanPayload {
        targets: request.targets.clone(),
        name: request.name.clone(),
        description: request.description.clone(),
        credentials: request.credentials.clone(),
        schema_profile,
    };

    let canonical_params = json!({
        "scan_type": request.scan_type,
        "targets": payload.targets,
        "name": payload.name,
        "description": payload.description,
        "schema_profile": payload.schema_profile,
        "scanner_pool": pool,
        "scanner_instance_id": request.scanner_instance_id,
    });

    if let Some(key) = &request.idempotency_key {
        use crate::idempotency::ReserveOutcome;

        let task_id = uuid::Uuid::new_v4().to_string();
        match state
            .idempotency
            .reserve(key, &task_id, &canonical_params)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?
        {
            ReserveOutcome::Stored => {
                let (task, queue_position) =
                    create_and_enqueue(&state, task_id, scan_type, pool, request.scanner_instance_id.clone(), payload)
                        .await?;
                return Ok(HttpResponse::Accepted().json(SubmitScanResponse {
                    task_id: task.task_id,
                    trace_id: task.trace_id,
                    status: task.status.as_str().to_string(),
                    queue_position,
                    idempotent: false,
                }));
            }
            ReserveOutcome::AlreadyExistsSame { task_id } => {
                METRICS.idempotent_replays.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let task = state.store.get(&task_id).await?;
                return Ok(HttpResponse::Ok().json(SubmitScanResponse {
                    task_id: task.task_id,
                    trace_id: task.trace_id,
                    status: task.status.as_str().to_string(),
                    queue_position: 0,
                    idempotent: true,
                }));
            }
            ReserveOutcome::Conflict { task_id } => {
                METRICS.idempotency_conflicts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(ServerError::IdempotencyConflict { key: key.clone(), task_id });
            }
        }
    }

    let task_id = uuid::Uuid::new_v4().to_string();
    let (task, queue_position) =
        create_and_enqueue(&state, task_id, scan_type, pool, request.scanner_instance_id.clone(), payload).await?;
    Ok(HttpResponse::Accepted().json(SubmitScanResponse {
        task_id: task.task_id,
        trace_id: task.trace_id,
        status: task.status.as_str().to_string(),
        queue_position,
        idempotent: false,
    }))
}

async fn create_and_enqueue(
    state: &AppState,
    task_id: String,
    scan_type: ScanType,
    pool: String,
    scanner_instance_id: Option<String>,
    payload: ScanPayload,
) -> Result<(Task, u64), ServerError> {
    let trace_id = uuid::Uuid::new_v4().to_string();
    let task = Task::new(
        task_id.clone(),
        trace_id,
        scan_type,
        pool.clone(),
        "nessus".to_string(),
        scanner_instance_id.clone(),
        payload.clone(),
    );
    state.store.create(task.clone()).await?;

    let now = chrono::Utc::now().to_rfc3339();
    let entry = crate::queue::QueueEntry {
        task_id: task.task_id.clone(),
        trace_id: task.trace_id.clone(),
        scan_type: scan_type.as_str().to_string(),
        scanner_type: task.scanner_type.clone(),
        scanner_pool: pool.clone(),
        scanner_instance_id,
        payload,
        enqueued_at: now,
    };
    let queue_position = state
        .queue
        .enqueue(&pool, &entry)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    METRICS.scans_submitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    Ok((task, queue_position))
}
