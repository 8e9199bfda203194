use serde::Deserialize;

use super::{GeminiClient, ModelError};

pub const FALLBACK_MODEL: &str = "gemini-2.0-flash";
const GENERATE_CONTENT: &str = "generateContent";
const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Configured,
    Discovered,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub name: String,
    pub source: SelectionSource,
}

impl ModelSelection {
    pub fn configured(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: SelectionSource::Configured,
        }
    }

    fn discovered(name: &str) -> Self {
        Self {
            name: name.trim_start_matches("models/").to_string(),
            source: SelectionSource::Discovered,
        }
    }

    fn fallback() -> Self {
        Self {
            name: FALLBACK_MODEL.to_string(),
            source: SelectionSource::Fallback,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_CONTENT)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

impl GeminiClient {
    /// Lists every model visible to the API key, following pagination.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ModelError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self.get("models").query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let res = request
                .send()
                .await
                .map_err(|e| ModelError::from_reqwest(e, self.timeout()))?;
            let status = res.status();
            let body = res
                .text()
                .await
                .map_err(|e| ModelError::from_reqwest(e, self.timeout()))?;

            if !status.is_success() {
                return Err(ModelError::api(status, &body));
            }

            let page: ListModelsResponse = serde_json::from_str(&body)
                .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(models),
            }
        }

        tracing::warn!("Stopped listing models after {} pages", MAX_PAGES);
        Ok(models)
    }
}

pub fn first_generate_capable(models: &[ModelInfo]) -> Option<&ModelInfo> {
    models.iter().find(|m| m.supports_generate_content())
}

/// Picks the first model advertising `generateContent`, or the fallback model
/// when listing fails or nothing qualifies.
pub async fn discover_model(client: &GeminiClient) -> ModelSelection {
    match client.list_models().await {
        Ok(models) => match first_generate_capable(&models) {
            Some(model) => ModelSelection::discovered(&model.name),
            None => {
                tracing::warn!(
                    "None of {} listed models supports {}, falling back to {}",
                    models.len(),
                    GENERATE_CONTENT,
                    FALLBACK_MODEL
                );
                ModelSelection::fallback()
            }
        },
        Err(e) => {
            tracing::error!("Model fetch error: {}. Falling back to {}", e, FALLBACK_MODEL);
            ModelSelection::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, methods: &[&str]) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            supported_generation_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_first_generate_capable() {
        let models = vec![
            model("models/embedding-001", &["embedContent"]),
            model("models/gemini-1.5-flash", &["generateContent", "countTokens"]),
            model("models/gemini-1.5-pro", &["generateContent"]),
        ];
        assert_eq!(
            first_generate_capable(&models).map(|m| m.name.as_str()),
            Some("models/gemini-1.5-flash")
        );
        assert!(first_generate_capable(&models[..1]).is_none());
        assert!(first_generate_capable(&[]).is_none());
    }

    #[test]
    fn test_discovered_name_drops_prefix() {
        let selection = ModelSelection::discovered("models/gemini-1.5-flash");
        assert_eq!(selection.name, "gemini-1.5-flash");
        assert_eq!(selection.source, SelectionSource::Discovered);
    }

    #[test]
    fn test_list_response_tolerates_missing_fields() {
        let page: ListModelsResponse =
            serde_json::from_str(r#"{"models": [{"name": "models/x"}]}"#).unwrap();
        assert_eq!(page.models.len(), 1);
        assert!(page.models[0].supported_generation_methods.is_empty());
        assert!(page.next_page_token.is_none());

        let empty: ListModelsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.models.is_empty());
    }

    #[test]
    fn test_fallback_selection() {
        let selection = ModelSelection::fallback();
        assert_eq!(selection.name, FALLBACK_MODEL);
        assert_eq!(selection.source, SelectionSource::Fallback);
    }
}
