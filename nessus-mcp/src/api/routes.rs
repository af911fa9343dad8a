// API routes for the MCP server.

use actix_web::{web, HttpResponse, Responder};

use crate::api::handlers::{queue, results, scanners, status, submit, tasks};
use crate::api::{health_check, metrics_endpoint};

/// Configure API routes for the MCP server.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics_endpoint))
        .route("/scans", web::post().to(submit::submit_scan))
        .route("/scans/{task_id}/status", web::get().to(status::get_scan_status))
        .route("/scans/{task_id}/cancel", web::post().to(status::cancel_scan))
        .route("/scans/{task_id}/results", web::get().to(results::get_scan_results))
        .route("/tasks", web::get().to(tasks::list_tasks))
        .route("/pools", web::get().to(scanners::list_pools))
        .route("/pools/{pool}/status", web::get().to(scanners::get_pool_status))
        .route("/pools/{pool}/scanners", web::get().to(scanners::list_scanners))
        .route(
            "/pools/{pool}/scanners/{instance_id}/reset_circuit",
            web::post().to(scanners::reset_circuit),
        )
        .route("/pools/{pool}/queue", web::get().to(queue::get_queue_status))
        .route("/pools/{pool}/queue/dead", web::get().to(queue::list_dlq))
        .route("/pools/{pool}/queue/dead", web::delete().to(queue::clear_dlq))
        .route("/pools/{pool}/queue/dead/{task_id}", web::get().to(queue::get_dlq_entry))
        .route("/pools/{pool}/queue/dead/{task_id}/retry", web::post().to(queue::retry_dlq))
        .default_service(web::route().to(not_found));
}

/// Handler for undefined routes.
async fn not_found() -> impl Responder {
    HttpResponse::NotFound().json(serde_json::json!({
        "status": "error",
        "message": "Resource not found",
    }))
}
