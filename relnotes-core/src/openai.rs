//! OpenAI-compatible chat-completions translation service

use crate::config::OpenAiConfig;
use crate::error::TranslateError;
use crate::translator::TranslationService;
use crate::types::{Language, Translations};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a professional translator. \
Provide accurate, natural translations and always respond with a single JSON object only.";

pub struct OpenAiService {
    client: reqwest::Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiService {
    /// Build from config, reading the API key from the configured env var
    pub fn from_env(config: &OpenAiConfig) -> Result<Self, TranslateError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TranslateError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &OpenAiConfig, api_key: impl Into<String>) -> Result<Self, TranslateError> {
        tracing::info!(model = %config.model, base_url = %config.base_url, "initializing OpenAI translation service");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config: config.clone(),
        })
    }

    fn user_prompt(text: &str, languages: &[Language]) -> String {
        let names: Vec<&str> = languages.iter().map(|l| l.display_name()).collect();
        let example: serde_json::Map<String, serde_json::Value> = languages
            .iter()
            .map(|l| (l.code().to_string(), json!(format!("{} translation", l.display_name()))))
            .collect();

        format!(
            "Translate the following text into {}. Give an accurate, natural translation for each \
             language and respond in JSON.\n\nText to translate: \"{}\"\n\nResponse format:\n{}",
            names.join(", "),
            text,
            serde_json::Value::Object(example)
        )
    }
}

#[async_trait]
impl TranslationService for OpenAiService {
    async fn translate(
        &self,
        text: &str,
        languages: &[Language],
    ) -> Result<Translations, TranslateError> {
        let request_body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::user_prompt(text, languages) }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" }
        });

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TranslateError::Service(format!(
                "OpenAI API error {status}: {error_text}"
            )));
        }

        let response_json: serde_json::Value = response.json().await?;
        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or(TranslateError::EmptyResponse)?;

        parse_translations(content, languages)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Parse a `{"ko": "...", ...}` object, keeping requested languages only
pub fn parse_translations(
    content: &str,
    languages: &[Language],
) -> Result<Translations, TranslateError> {
    let body = strip_code_fence(content);
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| TranslateError::MalformedResponse(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| TranslateError::MalformedResponse("expected a JSON object".into()))?;

    Ok(languages
        .iter()
        .filter_map(|lang| {
            object
                .get(lang.code())
                .and_then(|v| v.as_str())
                .map(|s| (*lang, s.to_string()))
        })
        .collect())
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
