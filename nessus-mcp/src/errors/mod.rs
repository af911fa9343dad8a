// Error handling module for the MCP server
//
// This module defines the error types used throughout the MCP server.

use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// API error response format: `{error, status_code}`
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
}

/// Errors surfaced across the external tool/RPC surface.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error("Idempotency key '{key}' already used for task {task_id} with different parameters")]
    IdempotencyConflict { key: String, task_id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Validation(_) => 400,
            ServerError::IdempotencyConflict { .. } => 409,
            ServerError::NotFound(_) => 404,
            ServerError::Config(_) => 500,
            ServerError::Internal(_) => 500,
        }
    }
}

impl From<TaskStoreError> for ServerError {
    fn from(e: TaskStoreError) -> Self {
        match e {
            TaskStoreError::NotFound(id) => ServerError::NotFound(format!("task '{id}' not found")),
            TaskStoreError::AlreadyExists(id) => {
                ServerError::Internal(format!("task '{id}' already exists"))
            }
            TaskStoreError::Lifecycle(e) => ServerError::Internal(e.to_string()),
            TaskStoreError::Io(e) => ServerError::Internal(e),
        }
    }
}

impl From<RegistryError> for ServerError {
    fn from(e: RegistryError) -> Self {
        match &e {
            RegistryError::NoEnabledInstances(_)
            | RegistryError::UnknownInstance(_, _)
            | RegistryError::UnknownPool(_) => ServerError::NotFound(e.to_string()),
            RegistryError::InstanceDisabled(_, _) => ServerError::Config(e.to_string()),
            RegistryError::InvalidInstanceConfig(_, _) => ServerError::Config(e.to_string()),
        }
    }
}

impl ResponseError for ServerError {
    fn error_response(&self) -> HttpResponse {
        let body = ErrorResponse {
            error: self.to_string(),
            status_code: self.status_code(),
        };
        match self.status_code() {
            400 => HttpResponse::BadRequest().json(body),
            404 => HttpResponse::NotFound().json(body),
            409 => HttpResponse::Conflict().json(body),
            _ => HttpResponse::InternalServerError().json(body),
        }
    }
}

/// Raised by the lifecycle machine when an illegal state edge is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Errors from the pool-partitioned queue.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("backing store error: {0}")]
    Backend(String),
}

/// Errors from the idempotency index.
#[derive(Error, Debug)]
pub enum IdempotencyError {
    #[error("backing store error: {0}")]
    Backend(String),
}

/// Errors surfaced by the scanner registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no enabled instances in pool '{0}'")]
    NoEnabledInstances(String),

    #[error("unknown scanner instance '{0}' in pool '{1}'")]
    UnknownInstance(String, String),

    #[error("unknown pool '{0}'")]
    UnknownPool(String),

    #[error("scanner instance '{0}' in pool '{1}' is disabled")]
    InstanceDisabled(String, String),

    #[error("invalid instance config for '{0}': {1}")]
    InvalidInstanceConfig(String, String),
}

/// Errors raised by a scanner capability implementation.
#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("http error: {0}")]
    Http(String),

    #[error("scanner returned unexpected response: {0}")]
    Protocol(String),

    #[error("invalid credential descriptor: {0}")]
    InvalidCredentials(String),
}

/// Task-store specific errors.
#[derive(Error, Debug)]
pub enum TaskStoreError {
    #[error("task '{0}' already exists")]
    AlreadyExists(String),

    #[error("task '{0}' not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Errors raised while parsing or projecting a scan artifact.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed scan artifact: {0}")]
    Malformed(String),

    #[error("{0}")]
    InvalidRequest(String),
}
