use crate::prompts::STREAM_ERROR_MESSAGE;

/// Failures surfaced by [`crate::state::ChatState`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The session could not be created; the conversation is unusable.
    #[error("{0}")]
    Initialization(String),
    /// One submission failed; the conversation stays usable.
    #[error("{}", STREAM_ERROR_MESSAGE)]
    Stream,
    #[error("chat session has not been initialized")]
    NotInitialized,
    #[error("a reply is still streaming")]
    AlreadyBusy,
}
