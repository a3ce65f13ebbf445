use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("model inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("pipeline models are not loaded on this instance")]
    PipelineUnavailable,

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServiceError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::PipelineUnavailable => "PIPELINE_UNAVAILABLE",
            _ => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PipelineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {self}");
        }

        (
            status,
            Json(json!({
                "error": {
                    "code": self.code(),
                    "message": self.to_string()
                }
            })),
        )
            .into_response()
    }
}
