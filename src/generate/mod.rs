//! Profile content generation
//!
//! [`ChatCompletionsClient`] asks an OpenAI-compatible chat completions API to
//! rewrite scraped website text into an original business profile. The model
//! is forced to answer through the `generate_seo_content` tool; a plain JSON
//! message body is accepted as well. Either way the payload must match
//! [`GeneratedContent`] or the call fails with [`Error::InvalidResponse`].

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::integrity::RewriteMode;
use crate::meta::GeneratedFields;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

const TOOL_NAME: &str = "generate_seo_content";

const SYSTEM_PROMPT: &str = "You are an expert SEO content writer specializing in local business profiles. \
Your task is to create COMPLETELY ORIGINAL content based on the source material provided.

CRITICAL RULES:
1. DO NOT copy any sentences directly from the source
2. Rewrite everything in your own words while keeping facts accurate
3. Use natural, engaging language optimized for local SEO
4. Include location-specific context when available
5. Structure content with proper headers
6. Create an FAQ section based on services offered";

/// Input for one generation call
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub source_text: String,
    pub business_name: Option<String>,
    pub location: String,
    pub rating: Option<f64>,
    pub reviews_count: Option<i64>,
    pub rewrite_mode: RewriteMode,
}

/// One FAQ entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
}

/// Structured output of the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub seo_title: String,
    pub seo_description: String,
    pub profile_content: String,
    pub faq: Vec<FaqItem>,
    #[serde(default)]
    pub services: Option<Vec<String>>,
    #[serde(default)]
    pub unique_features: Option<Vec<String>>,
    #[serde(default)]
    pub facts: Option<Vec<String>>,
    #[serde(default)]
    pub signals: Option<Vec<String>>,
    #[serde(default)]
    pub schema_markup: Option<Value>,
}

impl GeneratedContent {
    /// Parse and validate a JSON payload
    pub fn parse(payload: &str) -> Result<Self> {
        let content: GeneratedContent = serde_json::from_str(strip_code_fence(payload))
            .map_err(|e| Error::InvalidResponse(format!("content does not match schema: {}", e)))?;
        content.validate()?;
        Ok(content)
    }

    /// Reject payloads with blank required fields
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("seo_title", &self.seo_title),
            ("seo_description", &self.seo_description),
            ("profile_content", &self.profile_content),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidResponse(format!("{} is empty", name)));
            }
        }

        if self.faq.is_empty() {
            return Err(Error::InvalidResponse("faq is empty".to_string()));
        }
        if self
            .faq
            .iter()
            .any(|item| item.question.trim().is_empty() || item.answer.trim().is_empty())
        {
            return Err(Error::InvalidResponse(
                "faq item with blank question or answer".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize for storage; absent lists are stored as empty arrays
    pub fn to_fields(&self) -> Result<GeneratedFields> {
        let list = |items: &Option<Vec<String>>| -> Result<String> {
            Ok(serde_json::to_string(items.as_deref().unwrap_or(&[]))?)
        };

        Ok(GeneratedFields {
            seo_title: self.seo_title.trim().to_string(),
            seo_description: self.seo_description.trim().to_string(),
            profile_content: self.profile_content.clone(),
            faq_json: serde_json::to_string(&self.faq)?,
            services_json: list(&self.services)?,
            unique_features_json: list(&self.unique_features)?,
            facts_json: list(&self.facts)?,
            signals_json: list(&self.signals)?,
            schema_markup_json: serde_json::to_string(
                self.schema_markup.as_ref().unwrap_or(&Value::Object(Default::default())),
            )?,
        })
    }

    /// Everything a reader sees, for the integrity check
    pub fn published_text(&self) -> String {
        let mut text = format!(
            "{}\n\n{}\n\n{}",
            self.seo_title, self.seo_description, self.profile_content
        );
        for item in &self.faq {
            text.push_str("\n\n");
            text.push_str(&item.question);
            text.push('\n');
            text.push_str(&item.answer);
        }
        text
    }
}

fn strip_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// External content generator
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    arguments: String,
}

impl ChatResponse {
    fn into_payload(self) -> Option<String> {
        let message = self.choices.into_iter().next()?.message;
        message
            .tool_calls
            .into_iter()
            .next()
            .map(|call| call.function.arguments)
            .or(message.content)
            .filter(|payload| !payload.trim().is_empty())
    }
}

/// OpenAI-compatible chat completions client
pub struct ChatCompletionsClient {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_source_chars: usize,
}

impl ChatCompletionsClient {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_source_chars: config.max_source_chars,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join("/v1/chat/completions")
            .map_err(|e| Error::Config(format!("Invalid generation URL: {}", e)))
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let system = format!("{}\n\n{}", SYSTEM_PROMPT, request.rewrite_mode.guidance());
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user_prompt(request, self.max_source_chars) }
            ],
            "tools": [tool_definition()],
            "tool_choice": { "type": "function", "function": { "name": TOOL_NAME } }
        })
    }
}

/// Build the user prompt, truncating the source to `max_source_chars`
pub fn user_prompt(request: &GenerationRequest, max_source_chars: usize) -> String {
    let source: String = request.source_text.chars().take(max_source_chars).collect();

    let mut prompt = format!(
        "Create SEO-optimized content for a dental practice using this source material:\n\nSOURCE MATERIAL:\n{}\n",
        source
    );
    if let Some(name) = request.business_name.as_deref().filter(|n| !n.trim().is_empty()) {
        prompt.push_str(&format!("\nBUSINESS NAME: {}", name));
    }
    if !request.location.trim().is_empty() {
        prompt.push_str(&format!("\nLOCATION: {}", request.location));
    }
    if let Some(rating) = request.rating {
        match request.reviews_count {
            Some(reviews) => prompt.push_str(&format!("\nRATING: {} ({} reviews)", rating, reviews)),
            None => prompt.push_str(&format!("\nRATING: {}", rating)),
        }
    }
    prompt.push_str(
        "\n\nGenerate the following:\n\
         1. SEO Title: Compelling title under 60 characters\n\
         2. Meta Description: Under 155 characters\n\
         3. Profile Content: 500-800 words of unique practice description with H2 headers\n\
         4. FAQ: 3-5 Q&A pairs about services offered\n\
         5. Services, unique features, quotable facts and authority signals as short lists",
    );
    prompt
}

fn tool_definition() -> Value {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Generate SEO-optimized content for a business profile",
            "parameters": {
                "type": "object",
                "properties": {
                    "seo_title": { "type": "string", "description": "SEO title under 60 characters" },
                    "seo_description": { "type": "string", "description": "Meta description under 155 characters" },
                    "profile_content": { "type": "string", "description": "Full profile content in markdown format, 500-800 words" },
                    "faq": {
                        "type": "array",
                        "description": "Array of FAQ objects with question and answer",
                        "items": {
                            "type": "object",
                            "properties": {
                                "question": { "type": "string" },
                                "answer": { "type": "string" }
                            },
                            "required": ["question", "answer"]
                        }
                    },
                    "services": string_list,
                    "unique_features": string_list,
                    "facts": string_list,
                    "signals": string_list,
                    "schema_markup": { "type": "object", "description": "schema.org JSON-LD for the practice" }
                },
                "required": ["seo_title", "seo_description", "profile_content", "faq"]
            }
        }
    })
}

#[async_trait]
impl GenerationService for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        if request.source_text.trim().is_empty() {
            return Err(Error::Validation("source text is required".to_string()));
        }

        debug!(model = %self.model, mode = %request.rewrite_mode, "Requesting generation");

        let response = self
            .client
            .post(self.endpoint()?)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::RateLimited(
                    "Rate limit exceeded. Please try again later.".to_string(),
                ))
            }
            StatusCode::PAYMENT_REQUIRED => {
                return Err(Error::PaymentRequired(
                    "Payment required. Please add credits to your workspace.".to_string(),
                ))
            }
            status if !status.is_success() => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                let message = body
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("AI gateway error (status {})", status.as_u16()));
                return Err(Error::Generation(message));
            }
            _ => {}
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(format!("malformed completion: {}", e)))?;
        let payload = chat
            .into_payload()
            .ok_or_else(|| Error::InvalidResponse("No content generated".to_string()))?;

        GeneratedContent::parse(&payload)
    }
}
