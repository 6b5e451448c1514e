pub mod config;
pub mod error;
pub mod gemini;
pub mod llm;
pub mod prompts;
pub mod state;
pub mod telemetry;

pub use config::{AiConfigError, AiRuntimeSettings, GeminiSettings};
pub use error::ChatError;
pub use llm::{
    provider_from_settings, ChatSession, Chunk, ChunkStream, LlmProviderKind, MockProvider,
    MockScript, ProviderError, SessionConfig, SessionProvider,
};
pub use state::{
    ChatMessage, ChatState, Conversation, ConversationSnapshot, MessageAuthor, Status, TurnState,
};
