use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use roomcap_core::CompletionSettings;

use crate::error::GenerateError;
use crate::parse;

const SERVICE: &str = "completion";

/// Sends one prompt and returns the text of the first completion. An empty
/// string is a valid answer; deciding what it means is up to the caller.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Build the client named by `settings.provider`.
pub fn from_settings(
    client: Client,
    settings: &CompletionSettings,
) -> Result<Box<dyn CompletionClient>, GenerateError> {
    match settings.provider.as_str() {
        "ai21" => Ok(Box::new(Ai21Client::new(client, settings))),
        other => {
            map_backend(other)?;
            Ok(Box::new(ChatClient::new(settings)))
        }
    }
}

fn map_backend(provider: &str) -> Result<LLMBackend, GenerateError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(GenerateError::UnknownProvider(other.to_string())),
    }
}

// --- AI21 ---

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Penalty {
    scale: f32,
    apply_to_numbers: bool,
    apply_to_punctuations: bool,
    apply_to_stopwords: bool,
    apply_to_whitespaces: bool,
    apply_to_emojis: bool,
}

impl Penalty {
    fn off() -> Self {
        Self {
            scale: 0.0,
            apply_to_numbers: false,
            apply_to_punctuations: false,
            apply_to_stopwords: false,
            apply_to_whitespaces: false,
            apply_to_emojis: false,
        }
    }
}

/// Fixed sampling: one result, full distribution, no penalties, no stops.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    prompt: &'a str,
    num_results: u32,
    max_tokens: u32,
    temperature: f32,
    top_k_return: u32,
    top_p: f32,
    count_penalty: Penalty,
    frequency_penalty: Penalty,
    presence_penalty: Penalty,
    stop_sequences: Vec<String>,
}

impl<'a> CompleteRequest<'a> {
    fn new(prompt: &'a str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            prompt,
            num_results: 1,
            max_tokens,
            temperature,
            top_k_return: 0,
            top_p: 1.0,
            count_penalty: Penalty::off(),
            frequency_penalty: Penalty::off(),
            presence_penalty: Penalty::off(),
            stop_sequences: Vec::new(),
        }
    }
}

pub struct Ai21Client {
    client: Client,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl Ai21Client {
    pub fn new(client: Client, settings: &CompletionSettings) -> Self {
        Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl CompletionClient for Ai21Client {
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        if self.api_key.is_empty() {
            return Err(GenerateError::MissingCredential("AI21_API_KEY"));
        }
        let request = CompleteRequest::new(prompt, self.max_tokens, self.temperature);
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|source| GenerateError::Http {
                service: SERVICE,
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| GenerateError::Http {
            service: SERVICE,
            source,
        })?;
        if !status.is_success() {
            return Err(GenerateError::Status {
                service: SERVICE,
                status,
                body,
            });
        }

        let text = parse::first_completion(&body).map_err(|detail| GenerateError::Malformed {
            service: SERVICE,
            detail,
        })?;
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

// --- Chat providers ---

/// Completion through any chat backend of the `llm` crate, with the prompt
/// sent as a single user message.
pub struct ChatClient {
    provider: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatClient {
    pub fn new(settings: &CompletionSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl CompletionClient for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let mut builder = LLMBuilder::new()
            .backend(map_backend(&self.provider)?)
            .model(&self.model)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature);

        if !self.api_key.is_empty() {
            builder = builder.api_key(&self.api_key);
        }

        let llm = builder
            .build()
            .map_err(|e| GenerateError::Provider(format!("build LLM: {e}")))?;

        let messages = vec![ChatMessage::user().content(prompt).build()];

        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| GenerateError::Provider(format!("chat: {e}")))?;

        Ok(response.text().unwrap_or_default())
    }
}
