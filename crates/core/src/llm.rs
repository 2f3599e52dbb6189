use crate::config::Settings;
use crate::error::{ConfigError, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
}

impl GenerationParams {
    pub const DETERMINISTIC: GenerationParams = GenerationParams { temperature: 0.0 };
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<String, SearchError>;
}

pub fn build_language_model(settings: &Settings) -> Result<Arc<dyn LanguageModel>, ConfigError> {
    let model = OpenAiChatModel::new(
        settings.api_key()?,
        &settings.openai_base_url,
        &settings.chat_model,
    );
    Ok(Arc::new(model))
}

/// Stands in for the chat model when no credential is configured. Every
/// completion fails with [`ConfigError::MissingApiKey`].
pub struct UnconfiguredModel {
    model: String,
}

impl UnconfiguredModel {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _params: GenerationParams,
    ) -> Result<String, SearchError> {
        Err(ConfigError::MissingApiKey.into())
    }
}

/// Chat completions client for OpenAI-compatible endpoints.
pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }

    fn failure(message: impl Into<String>) -> SearchError {
        SearchError::Generation {
            provider: "openai".to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<String, SearchError> {
        debug!(
            model = %self.model,
            messages = messages.len(),
            temperature = params.temperature,
            "requesting completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                temperature: params.temperature,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "completion request rejected");
            return Err(Self::failure(format!("API returned {status}: {body}")));
        }

        let payload: CompletionResponse = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Self::failure("API returned no completion"))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    #[test]
    fn chat_model_requires_api_key() {
        assert!(matches!(
            build_language_model(&Settings::default()),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let model = OpenAiChatModel::new("sk-test", "http://localhost:8080/v1/", "gpt-test");
        assert_eq!(model.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(model.model_name(), "gpt-test");
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_value(ChatMessage::system("be brief"))?;
        assert_eq!(encoded["role"], "system");
        assert_eq!(encoded["content"], "be brief");
        Ok(())
    }

    #[tokio::test]
    async fn unconfigured_model_reports_missing_key() {
        let model = UnconfiguredModel::new("gpt-test");
        let result = model
            .complete(&[ChatMessage::user("hi")], GenerationParams::DETERMINISTIC)
            .await;
        assert!(matches!(
            result,
            Err(SearchError::Config(ConfigError::MissingApiKey))
        ));
    }

    #[tokio::test]
    async fn scripted_model_matches_rules_before_fallback() -> Result<(), SearchError> {
        let model = ScriptedModel::replying("default").when("weather", "sunny");
        let params = GenerationParams::DETERMINISTIC;

        assert_eq!(model.complete(&[ChatMessage::user("the weather?")], params).await?, "sunny");
        assert_eq!(model.complete(&[ChatMessage::user("hello")], params).await?, "default");
        assert_eq!(model.call_count(), 2);
        Ok(())
    }
}
