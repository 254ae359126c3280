//! The answering oracle.
//!
//! `AnswerGateway` turns a player's question and the active puzzle into a
//! prompt, sends it to exactly one provider chosen at construction, and
//! always hands back text. Provider failures and timeouts become a fixed
//! apology so the game stays playable.

use crate::config::ApiSettings;
use crate::puzzle::Puzzle;
use async_trait::async_trait;
use llm_client::{DashScope, OpenAi, Request};
use std::time::Duration;
use thiserror::Error;

/// Reply used whenever the oracle cannot produce an answer.
pub const APOLOGY: &str = "调用 AI 接口失败";

/// Default bound on a single oracle call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures inside a provider call. Never reach the player.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Client(#[from] llm_client::Error),

    #[error("Provider returned an empty answer")]
    EmptyAnswer,

    #[error("Provider error: {0}")]
    Other(String),
}

/// Errors constructing the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(
        "No answer provider configured: set api_config.dashscope_api_key or api_config.open_ai_api_base"
    )]
    NoProviderConfigured,
}

/// Something that can answer a prompt with text.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn answer(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Which backend a [`Provider`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    DashScope,
    OpenAi,
}

impl ProviderKind {
    /// Pick a provider by priority: DashScope credential, then OpenAI endpoint.
    pub fn select(settings: &ApiSettings) -> Result<Self, GatewayError> {
        if settings.dashscope_api_key.is_some() {
            Ok(ProviderKind::DashScope)
        } else if settings.open_ai_api_base.is_some() {
            Ok(ProviderKind::OpenAi)
        } else {
            Err(GatewayError::NoProviderConfigured)
        }
    }
}

/// The built-in HTTP providers.
pub enum Provider {
    DashScope(DashScope),
    OpenAi(OpenAi),
}

impl Provider {
    pub fn from_settings(settings: &ApiSettings) -> Result<Self, GatewayError> {
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let provider = match ProviderKind::select(settings)? {
            ProviderKind::DashScope => {
                let key = settings.dashscope_api_key.clone().unwrap_or_default();
                let mut client = DashScope::new(key).with_timeout(timeout);
                if let Some(model) = &settings.model {
                    client = client.with_model(model);
                }
                Provider::DashScope(client)
            }
            ProviderKind::OpenAi => {
                let key = settings.open_ai_api_key.clone().unwrap_or_default();
                let base = settings.open_ai_api_base.clone().unwrap_or_default();
                let mut client = OpenAi::new(key).with_base_url(base).with_timeout(timeout);
                if let Some(model) = &settings.model {
                    client = client.with_model(model);
                }
                Provider::OpenAi(client)
            }
        };
        Ok(provider)
    }
}

#[async_trait]
impl AnswerProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::DashScope(_) => "dashscope",
            Provider::OpenAi(_) => "openai",
        }
    }

    async fn answer(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = Request::prompt(prompt);
        let response = match self {
            Provider::DashScope(client) => client.complete(request).await?,
            Provider::OpenAi(client) => client.complete(request).await?,
        };
        Ok(response.text)
    }
}

/// Build the oracle prompt for one question.
pub fn build_prompt(question: &str, puzzle: &Puzzle) -> String {
    format!(
        "作为海龟汤游戏的主持人，你需要根据以下信息回答玩家的是/否问题：\n\n\
         故事情境：{}\n\
         真相：{}\n\
         背景：{}\n\n\
         玩家问题：{}\n\n\
         请只回答\"是\"或\"否\", 必要时可以补充一句简短的解释。",
        puzzle.situation,
        puzzle.truth,
        puzzle.background,
        question.trim()
    )
}

/// Routes questions to the configured provider.
pub struct AnswerGateway {
    provider: Box<dyn AnswerProvider>,
    timeout: Duration,
}

impl AnswerGateway {
    /// Select and build the provider described by `settings`.
    ///
    /// Fails if no provider is configured; the game cannot run without one.
    pub fn from_settings(settings: &ApiSettings) -> Result<Self, GatewayError> {
        let provider = Provider::from_settings(settings)?;
        tracing::info!("Using {} answer provider", provider.name());
        Ok(Self {
            provider: Box::new(provider),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
        })
    }

    /// Use a custom provider.
    pub fn with_provider(provider: impl AnswerProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the oracle about `puzzle`. Never fails; see [`APOLOGY`].
    pub async fn answer(&self, question: &str, puzzle: &Puzzle) -> String {
        let prompt = build_prompt(question, puzzle);
        tracing::debug!(provider = self.provider.name(), "Asking oracle");

        match tokio::time::timeout(self.timeout, self.provider.answer(&prompt)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::error!("{}", ProviderError::EmptyAnswer);
                    APOLOGY.to_string()
                } else {
                    text.to_string()
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Oracle request failed: {}", e);
                APOLOGY.to_string()
            }
            Err(_) => {
                tracing::error!("Oracle request timed out after {:?}", self.timeout);
                APOLOGY.to_string()
            }
        }
    }
}
