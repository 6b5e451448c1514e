use crate::config::{AiConfigError, AiRuntimeSettings};
use crate::gemini::GeminiProvider;
use crate::prompts::{GEMINI_MODEL, SYSTEM_INSTRUCTION};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    Gemini,
    Mock,
}

impl LlmProviderKind {
    pub fn from_environment() -> Self {
        match std::env::var("LLM_PROVIDER") {
            Ok(value) if value.eq_ignore_ascii_case("mock") => Self::Mock,
            _ => Self::Gemini,
        }
    }
}

/// What a session is bound to for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub system_instruction: String,
    pub model: String,
}

impl SessionConfig {
    pub fn new(system_instruction: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            model: model.into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(SYSTEM_INSTRUCTION, GEMINI_MODEL)
    }
}

/// An incremental fragment of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

pub type ChunkStream = BoxStream<'static, Result<Chunk, ProviderError>>;

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("{0}")]
    Configuration(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("response blocked: {0}")]
    Blocked(String),
    #[error("invalid stream payload: {0}")]
    Decode(String),
    #[error("model returned no text")]
    EmptyReply,
    #[error("{0}")]
    Mock(String),
}

/// Produces conversational sessions bound to a fixed instruction and model.
pub trait SessionProvider: Send + Sync {
    fn create_session(&self, config: &SessionConfig)
        -> Result<Arc<dyn ChatSession>, ProviderError>;
}

#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Submits `text` and returns the reply as a one-shot chunk stream.
    async fn stream_message(&self, text: &str) -> Result<ChunkStream, ProviderError>;
}

/// Picks the provider described by the loaded settings. A configuration error
/// is deferred to session creation so it surfaces as an initialization error.
pub fn provider_from_settings(
    settings: Result<AiRuntimeSettings, AiConfigError>,
) -> Arc<dyn SessionProvider> {
    match settings {
        Ok(settings) => match (settings.provider, settings.gemini) {
            (LlmProviderKind::Gemini, Some(gemini)) => Arc::new(GeminiProvider::new(gemini)),
            (LlmProviderKind::Gemini, None) => Arc::new(UnavailableProvider::new(
                AiConfigError::Missing.user_message(),
            )),
            (LlmProviderKind::Mock, _) => Arc::new(MockProvider::echo()),
        },
        Err(err) => {
            tracing::warn!(%err, "AI provider is not configured");
            Arc::new(UnavailableProvider::new(err.user_message()))
        }
    }
}

/// Stands in for a provider whose configuration could not be loaded.
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl SessionProvider for UnavailableProvider {
    fn create_session(
        &self,
        _config: &SessionConfig,
    ) -> Result<Arc<dyn ChatSession>, ProviderError> {
        Err(ProviderError::Configuration(self.reason.clone()))
    }
}

/// Canned behaviour for [`MockProvider`].
#[derive(Debug, Clone)]
pub enum MockScript {
    /// Echo the prompt back a word at a time.
    Echo,
    Chunks(Vec<String>),
    FailImmediately,
    /// Yield the chunks, then fail.
    FailAfter(Vec<String>),
    /// Refuse to create a session at all.
    FailSession(String),
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    script: MockScript,
    delay: Duration,
}

impl MockProvider {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
        }
    }

    pub fn echo() -> Self {
        Self::new(MockScript::Echo).with_delay(Duration::from_millis(20))
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MockScript::Chunks(
            chunks.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn failing() -> Self {
        Self::new(MockScript::FailImmediately)
    }

    /// Pause before each chunk so a UI has something to watch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::echo()
    }
}

impl SessionProvider for MockProvider {
    fn create_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Arc<dyn ChatSession>, ProviderError> {
        if let MockScript::FailSession(reason) = &self.script {
            return Err(ProviderError::Mock(reason.clone()));
        }
        Ok(Arc::new(MockSession {
            script: self.script.clone(),
            delay: self.delay,
            model: config.model.clone(),
        }))
    }
}

struct MockSession {
    script: MockScript,
    delay: Duration,
    model: String,
}

#[async_trait]
impl ChatSession for MockSession {
    async fn stream_message(&self, text: &str) -> Result<ChunkStream, ProviderError> {
        let items: Vec<Result<Chunk, ProviderError>> = match &self.script {
            MockScript::Echo => echo_chunks(&self.model, text)
                .into_iter()
                .map(|chunk| Ok(Chunk::new(chunk)))
                .collect(),
            MockScript::Chunks(chunks) => chunks.iter().cloned().map(Chunk::new).map(Ok).collect(),
            MockScript::FailImmediately => {
                return Err(ProviderError::Mock("mock stream refused".to_string()))
            }
            MockScript::FailAfter(chunks) => chunks
                .iter()
                .cloned()
                .map(Chunk::new)
                .map(Ok)
                .chain(std::iter::once(Err(ProviderError::Mock(
                    "mock stream interrupted".to_string(),
                ))))
                .collect(),
            MockScript::FailSession(reason) => return Err(ProviderError::Mock(reason.clone())),
        };
        let delay = self.delay;
        Ok(stream::iter(items)
            .then(move |item| async move {
                sleep(delay).await;
                item
            })
            .boxed())
    }
}

fn echo_chunks(model: &str, prompt: &str) -> Vec<String> {
    let reply = format!("[Mock] Model {model}: received '{prompt}'.");
    reply
        .split_inclusive(' ')
        .map(str::to_string)
        .collect()
}
