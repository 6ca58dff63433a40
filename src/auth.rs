use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ServiceError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Optional shared-secret check on the `x-api-key` header.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGuard {
    expected: Option<String>,
}

impl ApiKeyGuard {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|key| !key.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), ServiceError> {
        let Some(expected) = self.expected.as_deref() else {
            return Ok(());
        };
        let presented = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty());
        match presented {
            Some(value) if value == expected => Ok(()),
            _ => Err(ServiceError::Unauthorized),
        }
    }
}

pub async fn require_api_key(
    State(guard): State<Arc<ApiKeyGuard>>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if let Err(err) = guard.check(request.headers()) {
        warn!(path = %request.uri().path(), "rejected request with missing or invalid api key");
        return Err(err);
    }
    Ok(next.run(request).await)
}
