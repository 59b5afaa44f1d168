//! Gemini `generateContent` client with Google Search grounding.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::prompt::{build_prompt, PromptOptions};
use super::{BriefingGenerator, GenerationError};
use crate::config::BriefingConfig;

/// Gemini REST API base.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model. Must support the `google_search` tool.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

/// Header carrying the API key, keeps it out of request URLs.
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

/// Every level is optional: a missing field is a content failure, not a
/// parse failure.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Generates briefings through the Gemini API using each user's own key.
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    prompt_options: PromptOptions,
}

impl GeminiGenerator {
    /// Create a generator against the public Gemini endpoint.
    ///
    /// `timeout` bounds the whole request; search-grounded generation is slow.
    pub fn new(prompt_options: PromptOptions, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            prompt_options,
        })
    }

    /// Set a custom base URL (proxies, tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl BriefingGenerator for GeminiGenerator {
    async fn generate(&self, config: &BriefingConfig) -> Result<String, GenerationError> {
        let prompt = build_prompt(config, &self.prompt_options);
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        };

        tracing::debug!(
            model = %self.model,
            keywords = config.keywords.len(),
            sources = config.sources.len(),
            "Requesting briefing generation"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, config.api_key.expose())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let html = extract_text(parsed).ok_or(GenerationError::EmptyResponse)?;
        Ok(strip_code_fence(&html).to_string())
    }
}

/// First candidate's first text part, if present and non-blank.
fn extract_text(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts?
        .into_iter()
        .next()?
        .text
        .filter(|t| !t.trim().is_empty())
}

/// Models often wrap HTML in a markdown fence despite being asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("html").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
