use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ModelError, ModelSelection, ReportModel, models};
use crate::config::Config;
use crate::processing::DecodedImage;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Client for the Gemini `generateContent` REST API. Built once at startup and
/// shared by every request.
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config, model: impl Into<String>) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(ModelError::Transport)?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            timeout: config.request_timeout,
            model: model.into(),
        })
    }

    /// Builds the client and picks the model it will use for its whole lifetime.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut client = Self::new(config, models::FALLBACK_MODEL)?;

        let selection = match &config.model {
            Some(name) => ModelSelection::configured(name),
            None => models::discover_model(&client).await,
        };

        tracing::info!("Using Gemini model {} ({:?})", selection.name, selection.source);
        client.model = selection.name;
        Ok(client)
    }

    pub(crate) fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(format!("{}/{}", self.api_base, path))
            .header(API_KEY_HEADER, &self.api_key)
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn generate_content(&self, prompt: &str, image: &DecodedImage) -> Result<String, ModelError> {
        let req_body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type,
                            data: STANDARD.encode(&image.data),
                        },
                    },
                ],
            }],
        };

        let res = self
            .http_client
            .post(format!("{}/models/{}:generateContent", self.api_base, self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&req_body)
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(e, self.timeout))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| ModelError::from_reqwest(e, self.timeout))?;

        if !status.is_success() {
            return Err(ModelError::api(status, &body));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        extract_text(parsed)
    }
}

#[async_trait]
impl ReportModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, image: &DecodedImage) -> Result<String, ModelError> {
        self.generate_content(prompt, image).await
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, ModelError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Err(ModelError::Blocked(reason)),
            None => Err(ModelError::EmptyResponse),
        };
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if !text.is_empty() {
        return Ok(text);
    }

    match candidate.finish_reason.as_deref() {
        Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII")) => {
            Err(ModelError::Blocked(reason.to_string()))
        }
        _ => Err(ModelError::EmptyResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::gemini::models::SelectionSource;
    use crate::processing::image::{decode_image, encode_sample};
    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    use crate::config::TEST_API_KEY as TEST_KEY;

    #[derive(Default)]
    struct MockGemini {
        last_call: Mutex<Option<(String, Value)>>,
        reply: Mutex<Option<(StatusCode, Value)>>,
        delay: Mutex<Option<Duration>>,
    }

    /// Serves a Gemini lookalike on an ephemeral port and returns its API base.
    async fn spawn_mock(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1beta", addr)
    }

    async fn mock_generate(
        State(mock): State<Arc<MockGemini>>,
        Path(call): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some(TEST_KEY) {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"error": {"code": 403, "message": "API key not valid.", "status": "PERMISSION_DENIED"}})),
            );
        }

        *mock.last_call.lock().unwrap() = Some((call, body));

        let delay = *mock.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = mock.reply.lock().unwrap().clone();
        let (status, body) = reply.unwrap_or((StatusCode::OK, json!({})));
        (status, Json(body))
    }

    async fn mock_with_reply(status: StatusCode, body: Value) -> (Arc<MockGemini>, String) {
        let mock = Arc::new(MockGemini::default());
        *mock.reply.lock().unwrap() = Some((status, body));
        let router = Router::new()
            .route("/v1beta/models/{call}", post(mock_generate))
            .with_state(mock.clone());
        let base = spawn_mock(router).await;
        (mock, base)
    }

    fn text_reply(parts: &[&str]) -> Value {
        let parts: Vec<Value> = parts.iter().map(|t| json!({"text": t})).collect();
        json!({
            "candidates": [{"content": {"role": "model", "parts": parts}, "finishReason": "STOP"}]
        })
    }

    fn sample_image() -> DecodedImage {
        decode_image(encode_sample(image::ImageFormat::Png)).unwrap()
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_and_image() {
        let (mock, base) = mock_with_reply(StatusCode::OK, text_reply(&["{\"diagnosis\":", "\"ok\"}"])).await;
        let client = GeminiClient::new(&test_config(&base), "gemini-test").unwrap();
        let image = sample_image();

        let text = client.generate("describe it", &image).await.unwrap();
        assert_eq!(text, "{\"diagnosis\":\"ok\"}");

        let (call, body) = mock.last_call.lock().unwrap().clone().unwrap();
        assert_eq!(call, "gemini-test:generateContent");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], "describe it");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], STANDARD.encode(&image.data));
    }

    #[tokio::test]
    async fn test_generate_reports_api_error() {
        let (_mock, base) = mock_with_reply(StatusCode::OK, text_reply(&["unused"])).await;
        let mut config = test_config(&base);
        config.api_key = "wrong-key".to_string();
        let client = GeminiClient::new(&config, "gemini-test").unwrap();

        match client.generate("p", &sample_image()).await {
            Err(ModelError::Api { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "API key not valid.");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_reports_block() {
        let reply = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let (_mock, base) = mock_with_reply(StatusCode::OK, reply).await;
        let client = GeminiClient::new(&test_config(&base), "gemini-test").unwrap();

        let result = client.generate("p", &sample_image()).await;
        assert!(matches!(result, Err(ModelError::Blocked(reason)) if reason == "SAFETY"));
    }

    #[tokio::test]
    async fn test_generate_empty_candidates() {
        let (_mock, base) = mock_with_reply(StatusCode::OK, json!({"candidates": []})).await;
        let client = GeminiClient::new(&test_config(&base), "gemini-test").unwrap();

        let result = client.generate("p", &sample_image()).await;
        assert!(matches!(result, Err(ModelError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_generate_invalid_envelope() {
        let (_mock, base) = mock_with_reply(StatusCode::OK, json!({"candidates": "nope"})).await;
        let client = GeminiClient::new(&test_config(&base), "gemini-test").unwrap();

        let result = client.generate("p", &sample_image()).await;
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let (mock, base) = mock_with_reply(StatusCode::OK, text_reply(&["late"])).await;
        *mock.delay.lock().unwrap() = Some(Duration::from_secs(5));
        let mut config = test_config(&base);
        config.request_timeout = Duration::from_millis(200);
        let client = GeminiClient::new(&config, "gemini-test").unwrap();

        let result = client.generate("p", &sample_image()).await;
        assert!(matches!(result, Err(ModelError::Timeout(_))), "got {:?}", result);
    }

    #[tokio::test]
    async fn test_safety_finish_without_text_is_blocked() {
        let reply = json!({"candidates": [{"finishReason": "SAFETY"}]});
        let (_mock, base) = mock_with_reply(StatusCode::OK, reply).await;
        let client = GeminiClient::new(&test_config(&base), "gemini-test").unwrap();

        let result = client.generate("p", &sample_image()).await;
        assert!(matches!(result, Err(ModelError::Blocked(reason)) if reason == "SAFETY"));
    }

    async fn mock_list_models(
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        match params.get("pageToken").map(String::as_str) {
            None => Json(json!({
                "models": [
                    {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]}
                ],
                "nextPageToken": "page-2"
            })),
            Some("page-2") => Json(json!({
                "models": [
                    {"name": "models/gemini-2.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
                    {"name": "models/gemini-2.5-pro", "supportedGenerationMethods": ["generateContent"]}
                ]
            })),
            Some(_) => Json(json!({"models": []})),
        }
    }

    #[tokio::test]
    async fn test_from_config_discovers_model_across_pages() {
        let base = spawn_mock(Router::new().route("/v1beta/models", get(mock_list_models))).await;

        let client = GeminiClient::from_config(&test_config(&base)).await.unwrap();
        assert_eq!(client.model_name(), "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_from_config_falls_back_when_listing_fails() {
        let router = Router::new().route(
            "/v1beta/models",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_mock(router).await;

        let client = GeminiClient::from_config(&test_config(&base)).await.unwrap();
        assert_eq!(client.model_name(), models::FALLBACK_MODEL);
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_model() {
        // Nothing listens here; a configured model must not trigger discovery.
        let mut config = test_config("http://127.0.0.1:9/v1beta");
        config.model = Some("gemini-1.5-flash-8b".to_string());

        let client = GeminiClient::from_config(&config).await.unwrap();
        assert_eq!(client.model_name(), "gemini-1.5-flash-8b");
        assert_eq!(
            ModelSelection::configured("gemini-1.5-flash-8b").source,
            SelectionSource::Configured
        );
    }
}
