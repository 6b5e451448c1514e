//! Google Gemini session provider.
//!
//! Speaks the `streamGenerateContent` endpoint in SSE mode and keeps the
//! multi-turn history on the session, so follow-up questions carry context.

use crate::config::GeminiSettings;
use crate::llm::{
    ChatSession, Chunk, ChunkStream, ProviderError, SessionConfig, SessionProvider,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiProvider {
    pub fn new(settings: GeminiSettings) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to default HTTP client");
                Client::new()
            });
        Self { client, settings }
    }
}

impl SessionProvider for GeminiProvider {
    fn create_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Arc<dyn ChatSession>, ProviderError> {
        let api_key = self.settings.api_key.trim();
        if api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "Gemini API key is not set".to_string(),
            ));
        }
        let endpoint = stream_endpoint(&self.settings.base_url, &config.model)?;
        tracing::info!(model = %config.model, "created Gemini chat session");
        Ok(Arc::new(GeminiSession {
            client: self.client.clone(),
            api_key: api_key.to_string(),
            endpoint,
            system_instruction: config.system_instruction.clone(),
            history: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

fn stream_endpoint(base_url: &str, model: &str) -> Result<Url, ProviderError> {
    let base = if base_url.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        base_url.trim()
    };
    let raw = format!(
        "{}/v1beta/models/{}:streamGenerateContent",
        base.trim_end_matches('/'),
        model
    );
    let mut url = Url::parse(&raw)
        .map_err(|err| ProviderError::Configuration(format!("invalid Gemini URL {raw}: {err}")))?;
    url.query_pairs_mut().append_pair("alt", "sse");
    Ok(url)
}

struct GeminiSession {
    client: Client,
    api_key: String,
    endpoint: Url,
    system_instruction: String,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiSession {
    fn build_request(&self, user_turn: &Content) -> GenerateContentRequest {
        let mut contents = self.history.lock().clone();
        contents.push(user_turn.clone());
        GenerateContentRequest {
            contents,
            system_instruction: (!self.system_instruction.is_empty())
                .then(|| Content::system(&self.system_instruction)),
        }
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn stream_message(&self, text: &str) -> Result<ChunkStream, ProviderError> {
        let user_turn = Content::user(text);
        let request = self.build_request(&user_turn);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes_stream()
            .map(|item| item.map(|bytes| bytes.to_vec()))
            .boxed();
        let commit = PendingTurn {
            history: self.history.clone(),
            user_turn,
        };
        Ok(ReplyReader::new(body, commit).into_stream())
    }
}

/// The exchange to append to the session history once the reply completes.
struct PendingTurn {
    history: Arc<Mutex<Vec<Content>>>,
    user_turn: Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    Reading,
    Drained,
    Finished,
}

struct ReplyReader {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    transcript: String,
    commit: Option<PendingTurn>,
    phase: ReadPhase,
}

impl ReplyReader {
    fn new(body: BoxStream<'static, reqwest::Result<Vec<u8>>>, commit: PendingTurn) -> Self {
        Self {
            body,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            transcript: String::new(),
            commit: Some(commit),
            phase: ReadPhase::Reading,
        }
    }

    fn into_stream(self) -> ChunkStream {
        stream::unfold(self, |reader| reader.next_chunk()).boxed()
    }

    async fn next_chunk(mut self) -> Option<(Result<Chunk, ProviderError>, Self)> {
        loop {
            if self.phase == ReadPhase::Finished {
                return None;
            }
            if let Some(data) = self.pending.pop_front() {
                match chunk_text(&data) {
                    Ok(Some(text)) => {
                        self.transcript.push_str(&text);
                        return Some((Ok(Chunk::new(text)), self));
                    }
                    Ok(None) => continue,
                    Err(err) => return Some((Err(err), self.fail())),
                }
            }
            if self.phase == ReadPhase::Drained {
                // Empty model parts are rejected on later requests.
                if self.transcript.is_empty() {
                    return Some((Err(ProviderError::EmptyReply), self.fail()));
                }
                self.finish();
                return None;
            }
            match self.body.next().await {
                Some(Ok(bytes)) => self.pending.extend(self.decoder.feed(&bytes)),
                Some(Err(err)) => return Some((Err(ProviderError::Http(err)), self.fail())),
                None => {
                    self.pending.extend(self.decoder.finish());
                    self.phase = ReadPhase::Drained;
                }
            }
        }
    }

    fn fail(mut self) -> Self {
        self.pending.clear();
        self.commit = None;
        self.phase = ReadPhase::Finished;
        self
    }

    fn finish(&mut self) {
        self.phase = ReadPhase::Finished;
        if let Some(turn) = self.commit.take() {
            let mut history = turn.history.lock();
            history.push(turn.user_turn);
            history.push(Content::model(&self.transcript));
        }
    }
}

/// Extracts the text of one streamed `GenerateContentResponse`. `None` means
/// the event carried no text (e.g. a trailing usage-only event).
pub(crate) fn chunk_text(data: &str) -> Result<Option<String>, ProviderError> {
    let event: StreamEvent =
        serde_json::from_str(data).map_err(|err| ProviderError::Decode(err.to_string()))?;
    if let Some(error) = event.error {
        return Err(ProviderError::Api {
            status: error.code.unwrap_or_default(),
            message: error.message,
        });
    }
    if let Some(reason) = event
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(ProviderError::Blocked(reason));
    }
    let text: String = event
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

/// Incremental Server-Sent Events decoder yielding each event's `data` field.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.accept_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes whatever the stream ended with, even without a closing blank line.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            if let Some(event) = self.accept_line(&line) {
                events.push(event);
            }
        }
        if let Some(event) = self.dispatch() {
            events.push(event);
        }
        events
    }

    fn accept_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

// Gemini wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn with_role(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    fn user(text: &str) -> Self {
        Self::with_role(Some("user"), text)
    }

    fn model(text: &str) -> Self {
        Self::with_role(Some("model"), text)
    }

    fn system(text: &str) -> Self {
        Self::with_role(None, text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEvent {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}
