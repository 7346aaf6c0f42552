use std::sync::Arc;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_trait::async_trait;
use clap::ValueEnum;

use anyhow::{Context, Result};

use crate::cli::Provider;
use crate::config::RuntimeConfig;

/// Named JSON Schema attached to a request that asks for structured output.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub response_schema: Option<ResponseSchema>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            response_schema: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Raw model text plus, when the backend honored the requested schema, the
/// already-parsed object. There is no guaranteed-valid-JSON contract even
/// with a schema attached; callers run the extractor regardless.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub text: String,
    pub structured: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(#[from] async_openai::error::OpenAIError),
    #[error("generation service returned no choices")]
    EmptyResponse,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, request: GenerationRequest)
    -> Result<GenerationOutput, GenerationError>;
}

pub struct OpenAiGeneration {
    model: String,
    client: Client<OpenAIConfig>,
}

impl OpenAiGeneration {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            model: model.into(),
            client: Client::with_config(config),
        }
    }

    /// OpenAI-compatible backend at a different base URL (Perplexity, Ollama).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        Self {
            model: model.into(),
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiGeneration {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(system.clone()),
                    name: None,
                },
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(request.prompt.clone()),
                name: None,
            },
        ));

        let mut completion = CreateChatCompletionRequestArgs::default();
        completion
            .model(&self.model)
            .temperature(0.0)
            .messages(messages);

        if let Some(shape) = &request.response_schema {
            completion.response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    name: shape.name.clone(),
                    description: None,
                    schema: Some(shape.schema.clone()),
                    strict: None,
                },
            });
        }

        let response = self.client.chat().create(completion.build()?).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(GenerationError::EmptyResponse)?;
        let text = choice.message.content.unwrap_or_default();

        // Only a strict whole-body parse counts as pre-validated output.
        let structured = request
            .response_schema
            .as_ref()
            .and_then(|_| serde_json::from_str(text.trim()).ok());

        Ok(GenerationOutput { text, structured })
    }
}

pub fn validate_model_for_provider(provider: Provider, model_name: &str) -> Result<()> {
    let is_valid = match provider {
        Provider::Openai => {
            model_name.starts_with("gpt-")
                || model_name.starts_with("o1")
                || model_name.starts_with("o3")
        }
        Provider::Perplexity => model_name.starts_with("sonar"),
        Provider::Ollama => !model_name.trim().is_empty(),
        Provider::Auto => true,
    };

    if is_valid {
        return Ok(());
    }

    Err(anyhow::anyhow!(
        "model '{}' is not compatible with provider '{:?}'",
        model_name,
        provider
    ))
}

pub fn resolve_generation(
    cfg: &RuntimeConfig,
) -> Result<(Arc<dyn GenerationService>, Provider, String)> {
    let provider = match cfg.provider {
        Provider::Auto => detect_provider().context(
            "no provider could be auto-detected. Set OPENAI_API_KEY or PERPLEXITY_API_KEY, \
             or use --provider ollama",
        )?,
        p => p,
    };

    match provider {
        Provider::Openai => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY is required for OpenAI provider")?;
            let model_name = cfg
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4.1-mini".to_string());
            validate_model_for_provider(provider, &model_name)?;
            let service = OpenAiGeneration::new(api_key, model_name.clone());
            Ok((Arc::new(service), provider, model_name))
        }
        Provider::Perplexity => {
            let api_key = std::env::var("PERPLEXITY_API_KEY")
                .context("PERPLEXITY_API_KEY is required for Perplexity provider")?;
            let model_name = cfg.model.clone().unwrap_or_else(|| "sonar-pro".to_string());
            validate_model_for_provider(provider, &model_name)?;
            let service = OpenAiGeneration::with_base_url(
                api_key,
                "https://api.perplexity.ai",
                model_name.clone(),
            );
            Ok((Arc::new(service), provider, model_name))
        }
        Provider::Ollama => {
            let host = std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string());
            let model_name = cfg.model.clone().unwrap_or_else(|| "llama4".to_string());
            validate_model_for_provider(provider, &model_name)?;
            let service = OpenAiGeneration::with_base_url(
                "ollama",
                format!("{}/v1", host.trim_end_matches('/')),
                model_name.clone(),
            );
            Ok((Arc::new(service), provider, model_name))
        }
        Provider::Auto => unreachable!("auto provider must be resolved before matching"),
    }
}

pub fn detect_provider() -> Option<Provider> {
    if env_present("OPENAI_API_KEY") {
        return Some(Provider::Openai);
    }
    if env_present("PERPLEXITY_API_KEY") {
        return Some(Provider::Perplexity);
    }
    if env_present("OLLAMA_HOST") {
        return Some(Provider::Ollama);
    }
    None
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

pub fn parse_provider_name(value: &str) -> Result<Provider> {
    Provider::from_str(value, true).map_err(|_| {
        anyhow::anyhow!(
            "invalid provider '{}'. Supported values: auto, openai, perplexity, ollama",
            value
        )
    })
}
