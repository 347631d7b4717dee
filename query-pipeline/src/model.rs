use std::{sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use common::utils::config::{AppConfig, ModelProviderKind};

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions using only the provided context. \
     If the context does not contain the answer, say so.";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Failure modes of a `generate` call. `Unavailable` means no backend is
/// configured and is never retried; the other two are transient and eligible
/// for a single retry before the composer falls back to the offline answer.
#[derive(Debug, Error)]
pub enum ModelFailure {
    #[error("no language model backend configured")]
    Unavailable,
    #[error("language model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("language model backend error: {0}")]
    Backend(String),
}

impl ModelFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelFailure::Timeout(_) | ModelFailure::Backend(_))
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub tokens_used: u32,
}

/// Language-model capability, resolved once at startup. `generate` enforces a
/// hard timeout so a hung backend reports `Timeout` instead of stalling the
/// request.
pub struct LanguageModel {
    inner: ModelInner,
    timeout: Duration,
}

enum ModelInner {
    Disabled,
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        max_tokens: u32,
        temperature: f32,
    },
    Anthropic {
        http: reqwest::Client,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        temperature: f32,
    },
    #[cfg(test)]
    Scripted {
        text: String,
        fail_first: u32,
        calls: Arc<std::sync::atomic::AtomicU32>,
    },
    #[cfg(test)]
    TimingOut {
        calls: Arc<std::sync::atomic::AtomicU32>,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl LanguageModel {
    pub fn disabled() -> Self {
        Self {
            inner: ModelInner::Disabled,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<OpenAIConfig>>>,
    ) -> Self {
        let timeout = Duration::from_secs(config.generate_timeout_secs);

        let inner = match config.llm_provider {
            ModelProviderKind::None => ModelInner::Disabled,
            ModelProviderKind::OpenAI => match openai_client {
                Some(client) => ModelInner::OpenAI {
                    client,
                    model: config.openai_model.clone(),
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                },
                None => {
                    warn!("llm_provider is openai but no api key is configured; model disabled");
                    ModelInner::Disabled
                }
            },
            ModelProviderKind::Anthropic => match config.anthropic_api_key.clone() {
                Some(api_key) => ModelInner::Anthropic {
                    http: reqwest::Client::new(),
                    api_key,
                    base_url: config.anthropic_base_url.clone(),
                    model: config.anthropic_model.clone(),
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                },
                None => {
                    warn!(
                        "llm_provider is anthropic but no api key is configured; model disabled"
                    );
                    ModelInner::Disabled
                }
            },
        };

        Self { inner, timeout }
    }

    pub fn configured(&self) -> bool {
        !matches!(self.inner, ModelInner::Disabled)
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            ModelInner::Disabled => "disabled",
            ModelInner::OpenAI { .. } => "openai",
            ModelInner::Anthropic { .. } => "anthropic",
            #[cfg(test)]
            ModelInner::Scripted { .. } => "scripted",
            #[cfg(test)]
            ModelInner::TimingOut { .. } => "timing-out",
        }
    }

    /// Generates text for the prompt, enforcing the configured hard timeout.
    pub async fn generate(&self, prompt: &str) -> Result<GeneratedText, ModelFailure> {
        match &self.inner {
            ModelInner::Disabled => Err(ModelFailure::Unavailable),
            ModelInner::OpenAI {
                client,
                model,
                max_tokens,
                temperature,
            } => {
                let call = generate_openai(client, model, *max_tokens, *temperature, prompt);
                match tokio::time::timeout(self.timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ModelFailure::Timeout(self.timeout)),
                }
            }
            ModelInner::Anthropic {
                http,
                api_key,
                base_url,
                model,
                max_tokens,
                temperature,
            } => {
                let call = generate_anthropic(
                    http,
                    api_key,
                    base_url,
                    model,
                    *max_tokens,
                    *temperature,
                    prompt,
                );
                match tokio::time::timeout(self.timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ModelFailure::Timeout(self.timeout)),
                }
            }
            #[cfg(test)]
            ModelInner::Scripted {
                text,
                fail_first,
                calls,
            } => {
                let attempt = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if attempt < *fail_first {
                    Err(ModelFailure::Backend("scripted transient failure".into()))
                } else {
                    Ok(GeneratedText {
                        text: text.clone(),
                        tokens_used: estimate_tokens(text),
                    })
                }
            }
            #[cfg(test)]
            ModelInner::TimingOut { calls } => {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(ModelFailure::Timeout(self.timeout))
            }
        }
    }
}

async fn generate_openai(
    client: &Client<OpenAIConfig>,
    model: &str,
    max_tokens: u32,
    temperature: f32,
    prompt: &str,
) -> Result<GeneratedText, ModelFailure> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .max_tokens(max_tokens)
        .temperature(temperature)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(prompt).into(),
        ])
        .build()
        .map_err(|e| ModelFailure::Backend(e.to_string()))?;

    let response = client
        .chat()
        .create(request)
        .await
        .map_err(|e| ModelFailure::Backend(e.to_string()))?;

    let tokens_reported = response.usage.as_ref().map(|usage| usage.total_tokens);

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ModelFailure::Backend("no content in model response".to_string()))?;

    let tokens_used = tokens_reported.unwrap_or_else(|| estimate_tokens(&text));
    Ok(GeneratedText { text, tokens_used })
}

async fn generate_anthropic(
    http: &reqwest::Client,
    api_key: &str,
    base_url: &str,
    model: &str,
    max_tokens: u32,
    temperature: f32,
    prompt: &str,
) -> Result<GeneratedText, ModelFailure> {
    let body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "temperature": temperature,
        "system": SYSTEM_PROMPT,
        "messages": [{"role": "user", "content": prompt}],
    });

    let response = http
        .post(format!("{base_url}/v1/messages"))
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await
        .map_err(|e| ModelFailure::Backend(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(ModelFailure::Backend(format!(
            "anthropic returned {status}: {detail}"
        )));
    }

    let parsed: AnthropicResponse = response
        .json()
        .await
        .map_err(|e| ModelFailure::Backend(e.to_string()))?;

    let text = parsed
        .content
        .into_iter()
        .next()
        .map(|content| content.text)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ModelFailure::Backend("no content in model response".to_string()))?;

    let tokens_used = parsed
        .usage
        .map(|usage| usage.input_tokens + usage.output_tokens)
        .unwrap_or_else(|| estimate_tokens(&text));

    Ok(GeneratedText { text, tokens_used })
}

/// Whitespace token estimate, used when the backend reports no usage.
pub fn estimate_tokens(text: &str) -> u32 {
    text.split_whitespace().count().max(1) as u32
}

#[cfg(test)]
impl LanguageModel {
    /// Test model returning `text`, failing the first `fail_first` calls with
    /// a transient backend error. The counter records total attempts.
    pub fn scripted(
        text: &str,
        fail_first: u32,
    ) -> (Self, Arc<std::sync::atomic::AtomicU32>) {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        (
            Self {
                inner: ModelInner::Scripted {
                    text: text.to_string(),
                    fail_first,
                    calls: Arc::clone(&calls),
                },
                timeout: Duration::from_secs(5),
            },
            calls,
        )
    }

    /// Test model whose every call reports a timeout.
    pub fn timing_out() -> (Self, Arc<std::sync::atomic::AtomicU32>) {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        (
            Self {
                inner: ModelInner::TimingOut {
                    calls: Arc::clone(&calls),
                },
                timeout: Duration::from_millis(10),
            },
            calls,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_disabled_model_is_unavailable() {
        let model = LanguageModel::disabled();
        assert!(!model.configured());
        assert!(matches!(
            model.generate("prompt").await,
            Err(ModelFailure::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_scripted_model_fails_then_succeeds() {
        let (model, calls) = LanguageModel::scripted("generated answer", 1);

        assert!(matches!(
            model.generate("prompt").await,
            Err(ModelFailure::Backend(_))
        ));
        let generated = model.generate("prompt").await.expect("second call succeeds");
        assert_eq!(generated.text, "generated answer");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unavailable_is_not_retryable() {
        assert!(!ModelFailure::Unavailable.is_retryable());
        assert!(ModelFailure::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ModelFailure::Backend("boom".into()).is_retryable());
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens("three short words"), 3);
        assert_eq!(estimate_tokens(""), 1);
    }
}
