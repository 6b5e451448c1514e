//! Fixed strings shared by the session layer and the conversation state.

/// Instruction every session is created with.
pub const SYSTEM_INSTRUCTION: &str = "You are a world-class AI assistant, specializing in providing informative answers and expert-level code assistance. When providing code, always include the language identifier for syntax highlighting (e.g., ```typescript). Be concise, accurate, and helpful. Format your responses using markdown.";

pub const GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Seeded as the first bot message once a session exists.
pub const GREETING: &str =
    "Hello! I'm your Gemini-powered code assistant. How can I help you today?";

/// Shown in place of a reply when a submission fails.
pub const STREAM_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";
