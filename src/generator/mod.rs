//! Article generation via an external text-generation model
//!
//! This module wraps the model endpoint behind a typed contract: the
//! prompt embeds the topic and brand context, and the response must be
//! a single JSON object with the fields `{title, excerpt, content,
//! tags, metaDescription, metaKeywords}`. Any other shape is a parse
//! failure. Transient failures are retried with exponential backoff
//! inside one scheduler run; exhaustion is terminal for the run.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{ArticleDraft, Topic};

/// Maximum title length accepted from the model
const MAX_TITLE_LEN: usize = 200;

/// Default retry attempts per scheduler run
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Errors
// ============================================================================

/// Errors produced by the generation pipeline
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Network-level failure reaching the model endpoint
    #[error("model request failed: {0}")]
    Request(String),

    /// The model did not answer within the per-attempt timeout
    #[error("model request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The response body was not the expected JSON object
    #[error("model response is not a valid draft object: {0}")]
    Malformed(String),

    /// The draft parsed but failed a validation rule
    #[error("draft validation failed: {0}")]
    Validation(String),

    /// All retry attempts were used up; terminal for the run
    #[error("generation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl GenerationError {
    /// Whether this error is terminal for the current run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the model client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model endpoint URL (default: http://localhost:11434)
    pub endpoint: String,

    /// Model name to use
    pub model: String,

    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for generation (0.0 - 1.0)
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b".to_string(),
            timeout_secs: 60,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

impl ModelConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("CALDERA_MODEL_ENDPOINT").unwrap_or(defaults.endpoint),
            model: std::env::var("CALDERA_MODEL").unwrap_or(defaults.model),
            timeout_secs: std::env::var("CALDERA_MODEL_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            max_tokens: std::env::var("CALDERA_MODEL_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("CALDERA_MODEL_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
        }
    }
}

/// Fixed brand context embedded into every prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    /// Byline used on generated articles
    pub author_name: String,

    /// Contact phone published in article calls-to-action
    pub phone: String,

    /// Contact email published in article calls-to-action
    pub email: String,

    /// Market the content targets
    pub service_area: String,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            author_name: "Caldera Custom Homes".to_string(),
            phone: "(541) 555-0188".to_string(),
            email: "hello@calderacustomhomes.com".to_string(),
            service_area: "Bend, Oregon".to_string(),
        }
    }
}

impl BrandConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            author_name: std::env::var("CALDERA_AUTHOR_NAME").unwrap_or(defaults.author_name),
            phone: std::env::var("CALDERA_CONTACT_PHONE").unwrap_or(defaults.phone),
            email: std::env::var("CALDERA_CONTACT_EMAIL").unwrap_or(defaults.email),
            service_area: std::env::var("CALDERA_SERVICE_AREA").unwrap_or(defaults.service_area),
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Model generate request
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

/// Model generation options
#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// Model generate response
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
}

/// Draft shape as emitted by the model (camelCase field names)
#[derive(Debug, Deserialize)]
struct RawDraft {
    title: String,
    excerpt: String,
    content: String,
    tags: TagsField,
    #[serde(rename = "metaDescription")]
    meta_description: String,
    #[serde(rename = "metaKeywords")]
    meta_keywords: String,
}

/// Tags arrive either as a JSON array or a comma-separated string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsField {
    List(Vec<String>),
    Csv(String),
}

impl TagsField {
    fn into_tags(self) -> Vec<String> {
        let raw = match self {
            Self::List(items) => items,
            Self::Csv(s) => s.split(',').map(String::from).collect(),
        };
        raw.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

// ============================================================================
// Model Client
// ============================================================================

/// HTTP client for the text-generation endpoint
pub struct ModelClient {
    client: Client,
    config: ModelConfig,
}

impl ModelClient {
    /// Create a new client with custom config
    pub fn with_config(config: ModelConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create a client from environment variables
    pub fn from_env() -> Result<Self, GenerationError> {
        Self::with_config(ModelConfig::from_env())
    }

    /// Check if the model endpoint is reachable
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint);
        self.client.get(&url).send().await.is_ok()
    }

    /// Generate a single completion for a prompt
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.config.endpoint);

        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        seconds: self.config.timeout_secs,
                    }
                } else {
                    GenerationError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Request(format!(
                "model endpoint returned {status}: {body}"
            )));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        Ok(generate_response.response)
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Extract the JSON object from markdown code blocks or raw text
fn extract_json(text: &str) -> String {
    // JSON code fence
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim().to_string();
        }
    }

    // Generic code fence
    if let Some(start) = text.find("```") {
        let after_start = &text[start + 3..];
        let content_start = after_start.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after_start[content_start..].find("```") {
            return after_start[content_start..content_start + end]
                .trim()
                .to_string();
        }
    }

    // Raw JSON object
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return text[start..=end].to_string();
            }
        }
    }

    text.trim().to_string()
}

/// Truncate to a character count without splitting a UTF-8 boundary
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parse and validate a model response into an [`ArticleDraft`]
pub fn parse_draft(response: &str) -> Result<ArticleDraft, GenerationError> {
    let json_str = extract_json(response);

    tracing::debug!(json = %preview(&json_str, 500), "extracted draft JSON");

    let raw: RawDraft = serde_json::from_str(&json_str).map_err(|e| {
        GenerationError::Malformed(format!(
            "{e} (response truncated: {})",
            preview(response, 200)
        ))
    })?;

    let title = raw.title.trim().to_string();
    if title.is_empty() {
        return Err(GenerationError::Validation("title is empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(GenerationError::Validation(format!(
            "title exceeds {MAX_TITLE_LEN} characters"
        )));
    }

    if raw.content.trim().is_empty() {
        return Err(GenerationError::Validation("content is empty".to_string()));
    }

    let tags = raw.tags.into_tags();
    if tags.is_empty() {
        return Err(GenerationError::Validation("tags are empty".to_string()));
    }

    Ok(ArticleDraft {
        title,
        excerpt: raw.excerpt.trim().to_string(),
        content: raw.content,
        tags,
        meta_description: raw.meta_description.trim().to_string(),
        meta_keywords: raw.meta_keywords.trim().to_string(),
    })
}

// ============================================================================
// Generator
// ============================================================================

/// Result of a successful generation, with the attempt count for logging
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub draft: ArticleDraft,
    pub attempts: u32,
}

/// Seam between the scheduler loop and the model pipeline
///
/// The production implementation is [`ArticleGenerator`]; tests inject
/// stubs to drive the loop without a model endpoint.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, topic: &Topic) -> Result<GenerationReport, GenerationError>;
}

/// Production generator: prompt construction, model call, validation,
/// and per-run retry with exponential backoff
pub struct ArticleGenerator {
    client: ModelClient,
    brand: BrandConfig,
    max_attempts: u32,
    backoff_base: Duration,
}

impl ArticleGenerator {
    /// Create a generator with the given model and brand configuration
    pub fn new(model: ModelConfig, brand: BrandConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            client: ModelClient::with_config(model)?,
            brand,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the backoff base (tests use milliseconds)
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Override the per-run attempt cap
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Build the generation prompt for a topic
    fn build_prompt(&self, topic: &Topic) -> String {
        let keywords = if topic.keywords.is_empty() {
            topic.category.clone()
        } else {
            topic.keywords.join(", ")
        };

        format!(
            r#"You are an SEO content writer for {author}, a custom home builder serving {area}.

Write an original, informative article on the topic below.

## Topic
Category: {category}
Keywords: {keywords}

## Requirements
1. Write for prospective home buyers and builders in {area}
2. Mention {author} naturally and close with a call to action including the phone number {phone} and email {email}
3. Use an approachable, authoritative tone; 600-900 words
4. The title must be under 200 characters

## Output format (JSON, no other text):
```json
{{
  "title": "Article title",
  "excerpt": "One or two sentence teaser",
  "content": "Full article body in markdown",
  "tags": "comma, separated, tags",
  "metaDescription": "Search snippet under 160 characters",
  "metaKeywords": "comma, separated, keywords"
}}
```"#,
            author = self.brand.author_name,
            area = self.brand.service_area,
            category = topic.category,
            keywords = keywords,
            phone = self.brand.phone,
            email = self.brand.email,
        )
    }

    /// Run one attempt: call the model and validate the response
    async fn attempt(&self, prompt: &str) -> Result<ArticleDraft, GenerationError> {
        let response = self.client.generate(prompt).await?;
        parse_draft(&response)
    }
}

#[async_trait]
impl Generator for ArticleGenerator {
    async fn generate(&self, topic: &Topic) -> Result<GenerationReport, GenerationError> {
        let prompt = self.build_prompt(topic);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.attempt(&prompt).await {
                Ok(draft) => {
                    return Ok(GenerationReport {
                        draft,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        topic = %topic,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "generation attempt failed"
                    );
                    last_error = e.to_string();

                    if attempt < self.max_attempts {
                        // 1s / 2s / 4s with the default base
                        let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(GenerationError::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_DRAFT: &str = r#"{
        "title": "Custom Homes in Bend, Oregon",
        "excerpt": "Why Bend is a great place to build",
        "content": "Bend combines high-desert sunshine with mountain access.",
        "tags": "bend, custom homes, oregon",
        "metaDescription": "Building custom homes in Bend",
        "metaKeywords": "bend, custom homes"
    }"#;

    fn generator_for(endpoint: &str) -> ArticleGenerator {
        let config = ModelConfig {
            endpoint: endpoint.to_string(),
            timeout_secs: 5,
            ..Default::default()
        };
        ArticleGenerator::new(config, BrandConfig::default())
            .unwrap()
            .with_backoff_base(Duration::from_millis(1))
    }

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.endpoint, "http://localhost:11434");
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("short", 200), "short");
    }

    #[test]
    fn test_extract_json_from_code_block() {
        let text = format!("Here is the article:\n```json\n{VALID_DRAFT}\n```\n");
        let json = extract_json(&text);
        assert!(json.starts_with('{'));
        assert!(json.contains("Custom Homes"));
    }

    #[test]
    fn test_extract_json_raw_object() {
        let text = format!("Sure! {VALID_DRAFT} Hope that helps.");
        let json = extract_json(&text);
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_parse_draft_with_csv_tags() {
        let draft = parse_draft(VALID_DRAFT).unwrap();
        assert_eq!(draft.title, "Custom Homes in Bend, Oregon");
        assert_eq!(
            draft.tags,
            vec!["bend".to_string(), "custom homes".to_string(), "oregon".to_string()]
        );
    }

    #[test]
    fn test_parse_draft_with_array_tags() {
        let json = r#"{
            "title": "T",
            "excerpt": "E",
            "content": "C",
            "tags": [" bend ", "", "luxury"],
            "metaDescription": "D",
            "metaKeywords": "K"
        }"#;
        let draft = parse_draft(json).unwrap();
        assert_eq!(draft.tags, vec!["bend".to_string(), "luxury".to_string()]);
    }

    #[test]
    fn test_parse_draft_rejects_missing_field() {
        let json = r#"{"title": "T", "content": "C"}"#;
        let err = parse_draft(json).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn test_parse_draft_rejects_non_json() {
        let err = parse_draft("I could not produce an article today.").unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn test_parse_draft_rejects_empty_title() {
        let json = r#"{
            "title": "  ",
            "excerpt": "E",
            "content": "C",
            "tags": "a",
            "metaDescription": "D",
            "metaKeywords": "K"
        }"#;
        let err = parse_draft(json).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[test]
    fn test_parse_draft_rejects_long_title() {
        let json = format!(
            r#"{{
                "title": "{}",
                "excerpt": "E",
                "content": "C",
                "tags": "a",
                "metaDescription": "D",
                "metaKeywords": "K"
            }}"#,
            "t".repeat(201)
        );
        let err = parse_draft(&json).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[test]
    fn test_parse_draft_rejects_empty_tags() {
        let json = r#"{
            "title": "T",
            "excerpt": "E",
            "content": "C",
            "tags": " , , ",
            "metaDescription": "D",
            "metaKeywords": "K"
        }"#;
        let err = parse_draft(json).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[test]
    fn test_build_prompt_embeds_topic_and_brand() {
        let generator = generator_for("http://localhost:11434");
        let topic = Topic::new("Neighborhoods", vec!["Tetherow"]);
        let prompt = generator.build_prompt(&topic);

        assert!(prompt.contains("Neighborhoods"));
        assert!(prompt.contains("Tetherow"));
        assert!(prompt.contains("Caldera Custom Homes"));
        assert!(prompt.contains("Bend, Oregon"));
        assert!(prompt.contains("metaDescription"));
    }

    #[tokio::test]
    async fn test_generate_success_first_attempt() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "response": VALID_DRAFT,
            "done": true
        });
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let generator = generator_for(&server.url());
        let topic = Topic::new("Neighborhoods", vec!["Tetherow"]);
        let report = generator.generate(&topic).await.unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.draft.title, "Custom Homes in Bend, Oregon");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_exhausts_on_non_json() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({ "response": "not json at all", "done": true });
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(3)
            .create_async()
            .await;

        let generator = generator_for(&server.url());
        let topic = Topic::new("Neighborhoods", vec!["Tetherow"]);
        let err = generator.generate(&topic).await.unwrap_err();

        match err {
            GenerationError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failure = server
            .mock("POST", "/api/generate")
            .with_status(500)
            .with_body("upstream unavailable")
            .expect(3)
            .create_async()
            .await;

        let generator = generator_for(&server.url());
        let topic = Topic::new("Market Trends", vec![]);
        let err = generator.generate(&topic).await.unwrap_err();

        assert!(err.is_terminal());
        failure.assert_async().await;
    }
}
