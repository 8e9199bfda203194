use std::time::Duration;

/// Longest slice of an upstream error body kept in messages.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Gemini request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Gemini request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Gemini blocked the request: {0}")]
    Blocked(String),
    #[error("Gemini returned no content")]
    EmptyResponse,
    #[error("Failed to parse Gemini response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            ModelError::Timeout(timeout)
        } else {
            ModelError::Transport(error)
        }
    }

    /// Builds an `Api` error, preferring the message from Google's error envelope
    /// (`{"error": {"message": ..}}`) over the raw body.
    pub(crate) fn api(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect());

        ModelError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
