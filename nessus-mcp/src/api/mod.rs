// API module for the MCP server.
//
// Wires the HTTP surface up to `AppState` and starts the actix-web
// server with CORS and request logging middleware.

pub mod handlers;
pub mod routes;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

use crate::state::AppState;

/// Start the HTTP server and block until it shuts down.
pub async fn init_server(state: AppState) -> std::io::Result<()> {
    let host = state.settings.server.host.clone();
    let port = state.settings.server.port;
    let workers = state.settings.server.workers.max(1);
    let cors_enabled = state.settings.server.cors_enabled;
    let cors_origins = state.settings.server.cors_origins.clone();

    HttpServer::new(move || {
        let cors = if cors_enabled {
            cors_origins.iter().fold(Cors::default(), |cors, origin| {
                if origin == "*" {
                    cors.allow_any_origin()
                } else {
                    cors.allowed_origin(origin)
                }
            })
        } else {
            Cors::default()
        };

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .workers(workers)
    .bind((host.as_str(), port))?
    .run()
    .await
}

/// Health check handler.
pub async fn health_check() -> actix_web::HttpResponse {
    actix_web::HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": crate::MCP_VERSION,
    }))
}

/// Plain-text metrics endpoint (SPEC_FULL ambient stack section).
pub async fn metrics_endpoint() -> actix_web::HttpResponse {
    actix_web::HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(crate::metrics::METRICS.render())
}
