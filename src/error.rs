use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::gemini::ModelError;
use crate::processing::DecodeError;

/// Failures surfaced to callers of `/analyze-report/`.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl AnalyzeError {
    pub fn validation(message: impl Into<String>) -> Self {
        AnalyzeError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalyzeError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AnalyzeError::Model(ModelError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AnalyzeError::Model(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Report analysis failed: {}", self);
        } else {
            tracing::warn!("Rejected report analysis request: {}", self);
        }
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AnalyzeError::validation("No file provided").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AnalyzeError::from(DecodeError::UnknownFormat).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AnalyzeError::from(ModelError::Timeout(Duration::from_secs(60))).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AnalyzeError::from(ModelError::EmptyResponse).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AnalyzeError::validation("Missing report_type field").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"error": "Missing report_type field"}));
    }
}
