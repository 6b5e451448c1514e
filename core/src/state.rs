use crate::error::ChatError;
use crate::llm::{ChatSession, ProviderError, SessionConfig, SessionProvider};
use crate::prompts::{GREETING, STREAM_ERROR_MESSAGE};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAuthor {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub author: MessageAuthor,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(author: MessageAuthor, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageAuthor::User, content)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(MessageAuthor::Bot, content)
    }
}

/// Ordered message list. Append-only apart from the open reply placeholder.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn message_mut(&mut self, id: Uuid) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|message| message.id == id)
    }
}

/// Where the most recent submission stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    Idle,
    /// `reply_id` names the placeholder that receives `accumulator`.
    Streaming { reply_id: Uuid, accumulator: String },
    Completed,
    Failed { reason: String },
}

impl TurnState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, TurnState::Streaming { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub busy: bool,
    pub last_error: Option<String>,
}

/// Read-only copy of the conversation handed to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    pub messages: Vec<ChatMessage>,
    pub status: Status,
    pub turn: TurnState,
}

/// Owns the conversation and drives each submission's reply stream into it.
///
/// Clones share the same conversation. At most one reply streams at a time;
/// a second [`ChatState::submit`] while busy is rejected with
/// [`ChatError::AlreadyBusy`].
#[derive(Clone)]
pub struct ChatState {
    inner: Arc<RwLock<InnerState>>,
    provider: Arc<dyn SessionProvider>,
    config: SessionConfig,
    revision: Arc<watch::Sender<u64>>,
}

#[derive(Default)]
struct InnerState {
    session: Option<Arc<dyn ChatSession>>,
    conversation: Conversation,
    turn: TurnState,
    last_error: Option<String>,
}

impl InnerState {
    fn status(&self) -> Status {
        Status {
            busy: self.turn.is_streaming(),
            last_error: self.last_error.clone(),
        }
    }
}

impl ChatState {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self::with_config(provider, SessionConfig::default())
    }

    pub fn with_config(provider: Arc<dyn SessionProvider>, config: SessionConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(InnerState::default())),
            provider,
            config,
            revision: Arc::new(revision),
        }
    }

    /// Creates the session and seeds the greeting. Repeated calls after a
    /// success leave the conversation untouched.
    pub fn initialize(&self) -> Result<(), ChatError> {
        if self.is_initialized() {
            tracing::debug!("chat session already initialized");
            return Ok(());
        }
        match self.provider.create_session(&self.config) {
            Ok(session) => {
                self.update(|inner| {
                    if inner.session.is_none() {
                        inner.session = Some(session);
                        inner.last_error = None;
                        inner.conversation.push(ChatMessage::bot(GREETING));
                    }
                });
                tracing::info!(model = %self.config.model, "chat session ready");
                Ok(())
            }
            Err(err) => {
                tracing::error!(%err, "failed to create chat session");
                let message = err.to_string();
                self.update(|inner| inner.last_error = Some(message.clone()));
                Err(ChatError::Initialization(message))
            }
        }
    }

    /// Appends `text` and a reply placeholder, then streams the reply into the
    /// placeholder until the provider finishes or fails.
    ///
    /// A provider failure is recorded on the conversation and reported as
    /// [`ChatError::Stream`]; its details only go to the log. Dropping the
    /// returned future before the stream ends fails the turn the same way.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), ChatError> {
        let text = text.into();
        let (session, turn) = self.begin_turn(&text)?;
        tracing::debug!(chars = text.chars().count(), "submitting message");

        let outcome = self.stream_reply(session.as_ref(), &text).await;
        turn.settle();
        match outcome {
            Ok(()) => {
                self.complete_turn();
                Ok(())
            }
            Err(err) => {
                tracing::error!(%err, "reply stream failed");
                self.fail_turn(err.to_string());
                Err(ChatError::Stream)
            }
        }
    }

    async fn stream_reply(
        &self,
        session: &dyn ChatSession,
        text: &str,
    ) -> Result<(), ProviderError> {
        let mut stream = session.stream_message(text).await?;
        while let Some(chunk) = stream.next().await {
            self.apply_chunk(&chunk?.text);
        }
        Ok(())
    }

    fn begin_turn(&self, text: &str) -> Result<(Arc<dyn ChatSession>, OpenTurn<'_>), ChatError> {
        let session = {
            let mut inner = self.inner.write();
            let session = inner.session.clone().ok_or(ChatError::NotInitialized)?;
            if inner.turn.is_streaming() {
                return Err(ChatError::AlreadyBusy);
            }
            inner.conversation.push(ChatMessage::user(text));
            let placeholder = ChatMessage::bot(String::new());
            let reply_id = placeholder.id;
            inner.conversation.push(placeholder);
            inner.turn = TurnState::Streaming {
                reply_id,
                accumulator: String::new(),
            };
            inner.last_error = None;
            session
        };
        self.bump();
        Ok((
            session,
            OpenTurn {
                state: self,
                settled: false,
            },
        ))
    }

    fn apply_chunk(&self, text: &str) {
        self.update(|inner| {
            let InnerState {
                conversation, turn, ..
            } = inner;
            if let TurnState::Streaming {
                reply_id,
                accumulator,
            } = turn
            {
                accumulator.push_str(text);
                if let Some(reply) = conversation.message_mut(*reply_id) {
                    reply.content.clone_from(accumulator);
                }
            }
        });
    }

    fn complete_turn(&self) {
        let length = self.update(|inner| {
            let length = match &inner.turn {
                TurnState::Streaming { accumulator, .. } => accumulator.len(),
                _ => 0,
            };
            inner.turn = TurnState::Completed;
            length
        });
        tracing::debug!(bytes = length, "reply complete");
    }

    // Partial text already shown stays in place; only an empty placeholder
    // is replaced by the error notice.
    fn fail_turn(&self, reason: String) {
        self.update(|inner| {
            let reply_id = match &inner.turn {
                TurnState::Streaming { reply_id, .. } => Some(*reply_id),
                _ => None,
            };
            if let Some(reply) = reply_id.and_then(|id| inner.conversation.message_mut(id)) {
                if reply.content.is_empty() {
                    reply.content = STREAM_ERROR_MESSAGE.to_string();
                }
            }
            inner.turn = TurnState::Failed { reason };
            inner.last_error = Some(STREAM_ERROR_MESSAGE.to_string());
        });
    }

    fn update<R>(&self, f: impl FnOnce(&mut InnerState) -> R) -> R {
        let result = {
            let mut inner = self.inner.write();
            f(&mut *inner)
        };
        self.bump();
        result
    }

    fn bump(&self) {
        self.revision
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.read().conversation.messages().to_vec()
    }

    pub fn status(&self) -> Status {
        self.inner.read().status()
    }

    pub fn turn(&self) -> TurnState {
        self.inner.read().turn.clone()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let inner = self.inner.read();
        ConversationSnapshot {
            messages: inner.conversation.messages().to_vec(),
            status: inner.status(),
            turn: inner.turn.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.read().turn.is_streaming()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().session.is_some()
    }

    /// Notifies after every change to the conversation or status.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

/// Held by `submit` while its reply streams. If the future is dropped first,
/// the turn is failed so the conversation does not stay busy.
struct OpenTurn<'a> {
    state: &'a ChatState,
    settled: bool,
}

impl OpenTurn<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for OpenTurn<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("reply stream abandoned before it finished");
            self.state
                .fail_turn("reply stream abandoned before it finished".to_string());
        }
    }
}
