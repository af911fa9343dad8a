// `list_pools`, `list_scanners`, `get_pool_status`, `reset_circuit`.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::errors::{RegistryError, ServerError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListPoolsResponse {
    pub pools: Vec<String>,
    pub default_pool: String,
}

pub async fn list_pools(state: web::Data<AppState>) -> Result<HttpResponse, ServerError> {
    Ok(HttpResponse::Ok().json(ListPoolsResponse {
        pools: state.registry.list_pools(),
        default_pool: state.registry.get_default_pool(),
    }))
}

pub async fn list_scanners(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let pool = path.into_inner();
    let instances = state.registry.list_instances(&pool)?;
    Ok(HttpResponse::Ok().json(instances))
}

pub async fn get_pool_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    let pool = path.into_inner();
    let status = state.registry.get_pool_status(&pool)?;
    Ok(HttpResponse::Ok().json(status))
}

#[derive(Debug, Serialize)]
pub struct ResetCircuitResponse {
    pub instance_id: String,
    pub state: String,
}

/// Force a scanner instance's circuit breaker back to CLOSED. An operator
/// escape hatch for when the upstream scanner has recovered but
/// `recovery_timeout` hasn't elapsed yet.
pub async fn reset_circuit(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServerError> {
    let (pool, instance_id) = path.into_inner();
    let instances = state.registry.list_instances(&pool)?;
    if !instances.iter().any(|i| i.instance_id == instance_id) {
        return Err(RegistryError::UnknownInstance(instance_id, pool).into());
    }

    let breaker = state.breakers.get(&instance_id);
    breaker.reset();
    Ok(HttpResponse::Ok().json(ResetCircuitResponse {
        instance_id,
        state: format!("{:?}", breaker.state()).to_lowercase(),
    }))
}
