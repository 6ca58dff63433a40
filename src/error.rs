use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("prompt is required")]
    EmptyPrompt,
    #[error("Invalid or missing x-api-key header")]
    Unauthorized,
    #[error("Failed to tokenize prompt")]
    Tokenization(String),
    #[error("Failed to prepare inputs on device")]
    DevicePlacement(String),
    #[error("Model generation failed: {0}")]
    Generation(String),
    #[error("Failed to decode model output")]
    Decode(String),
    #[error(
        "Failed to load the model '{model_id}'. If the model is gated, set HF_API_KEY in the \
         environment and make sure the token has 'read' scope. If the 8-bit artifact fails to \
         load, remove it or set DEVICE=cpu. Original error: {reason}"
    )]
    ModelLoad { model_id: String, reason: String },
    #[error("inference task failed: {0}")]
    Task(String),
}

impl ServiceError {
    pub fn model_load(model_id: &str, reason: impl ToString) -> Self {
        ServiceError::ModelLoad {
            model_id: model_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::EmptyPrompt => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Tokenization(_)
            | ServiceError::DevicePlacement(_)
            | ServiceError::Generation(_)
            | ServiceError::Decode(_)
            | ServiceError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::ModelLoad { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Failure reported by a model backend. Call sites decide which
/// [`ServiceError`] kind it becomes.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(feature = "tch-backend")]
impl From<tch::TchError> for BackendError {
    fn from(err: tch::TchError) -> Self {
        Self(err.to_string())
    }
}
