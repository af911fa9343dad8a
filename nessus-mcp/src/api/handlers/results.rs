// `get_scan_results`.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::errors::ServerError;
use crate::parser::filters::{self, FilterClause};
use crate::parser::profiles::SchemaProfile;
use crate::parser::projector::{self, ProjectionRequest};
use crate::parser::report;
use crate::state::AppState;
use crate::task::lifecycle::TaskStatus;

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

pub async fn get_scan_results(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ResultsQuery>,
) -> Result<HttpResponse, ServerError> {
    let task_id = path.into_inner();
    let task = state.store.get(&task_id).await?;

    if task.status != TaskStatus::Completed {
        return Err(ServerError::Validation(format!(
            "task '{task_id}' is '{}', results are only available once completed",
            task.status.as_str()
        )));
    }

    let profile_raw = query.profile.clone().unwrap_or_else(|| task.payload.schema_profile.clone());
    let profile = SchemaProfile::parse(&profile_raw)
        .ok_or_else(|| ServerError::Validation(format!("unknown schema_profile '{profile_raw}'")))?;

    let clauses: Vec<FilterClause> = filters::parse_all(&query.filter);

    let artifact_path = state.store.artifact_path(&task_id);
    let parsed = report::parse_file(&artifact_path).map_err(|e| ServerError::Internal(e.to_string()))?;

    let request = ProjectionRequest {
        profile,
        filters: &clauses,
        page: query.page,
        page_size: projector::clamp_page_size(query.page_size),
    };

    let body = projector::project(&parsed, &task.payload.name, &request);
    Ok(HttpResponse::Ok().content_type("application/x-ndjson").body(body))
}
