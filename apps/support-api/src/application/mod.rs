use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde_json::json;
use support_core::{CoreError, catalog::CatalogEntry};
use tracing::{error, warn};

pub mod health;
pub mod middleware;
pub mod query;

// Top-level error type for request handlers
#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("Authorization Error: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The database behind `entry` is not connected.
    #[error("{} is unavailable: database not connected", .0.as_str())]
    Unavailable(CatalogEntry),
}

impl ApplicationError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApplicationError::Validation(_) => StatusCode::BAD_REQUEST,
            ApplicationError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApplicationError::NotFound(_) => StatusCode::NOT_FOUND,
            ApplicationError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApplicationError::Core(core) => match core {
                CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                CoreError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
                CoreError::Configuration(_)
                | CoreError::Query(_)
                | CoreError::Serialization(_)
                | CoreError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn label(&self, code: StatusCode) -> &'static str {
        match code {
            StatusCode::BAD_REQUEST => "invalid_input",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::SERVICE_UNAVAILABLE => "connection_unavailable",
            _ => "error",
        }
    }
}

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            error!("request failed: {}", self);
        } else {
            warn!("request rejected: {}", self);
        }

        let mut body = json!({
            "status": self.label(code),
            "message": self.to_string(),
        });
        if code == StatusCode::SERVICE_UNAVAILABLE {
            body["data"] = json!([]);
        }
        (code, Json(body)).into_response()
    }
}
