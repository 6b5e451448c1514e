use gemchat_core::llm::{MockProvider, MockScript};
use gemchat_core::prompts::{GREETING, STREAM_ERROR_MESSAGE};
use gemchat_core::state::{ChatState, MessageAuthor, TurnState};
use gemchat_core::ChatError;
use std::sync::Arc;

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn authored(state: &ChatState) -> Vec<(MessageAuthor, String)> {
    state
        .messages()
        .into_iter()
        .map(|message| (message.author, message.content))
        .collect()
}

#[test]
fn conversation_grows_in_user_bot_pairs() {
    let runtime = test_runtime();
    let state = ChatState::new(Arc::new(MockProvider::chunks(["Hi", " there", "!"])));
    state.initialize().expect("initialize");

    runtime.block_on(state.submit("hello")).expect("first");
    runtime.block_on(state.submit("again")).expect("second");

    assert_eq!(
        authored(&state),
        vec![
            (MessageAuthor::Bot, GREETING.to_string()),
            (MessageAuthor::User, "hello".to_string()),
            (MessageAuthor::Bot, "Hi there!".to_string()),
            (MessageAuthor::User, "again".to_string()),
            (MessageAuthor::Bot, "Hi there!".to_string()),
        ]
    );
    assert!(!state.status().busy);
}

#[test]
fn echo_provider_answers_through_the_state() {
    let runtime = test_runtime();
    let state = ChatState::new(Arc::new(MockProvider::echo()));
    state.initialize().expect("initialize");

    runtime
        .block_on(state.submit("hello world"))
        .expect("send message");

    let reply = state.messages().pop().expect("reply");
    assert_eq!(reply.author, MessageAuthor::Bot);
    assert!(reply.content.contains("hello world"));
    assert_eq!(state.turn(), TurnState::Completed);
}

#[test]
fn failed_stream_leaves_conversation_usable() {
    let runtime = test_runtime();
    let state = ChatState::new(Arc::new(MockProvider::failing()));
    state.initialize().expect("initialize");

    assert_eq!(
        runtime.block_on(state.submit("bad")),
        Err(ChatError::Stream)
    );
    assert_eq!(
        runtime.block_on(state.submit("worse")),
        Err(ChatError::Stream)
    );

    let snapshot = state.snapshot();
    assert_eq!(snapshot.messages.len(), 5);
    assert_eq!(snapshot.messages[2].content, STREAM_ERROR_MESSAGE);
    assert_eq!(snapshot.messages[4].content, STREAM_ERROR_MESSAGE);
    assert!(!snapshot.status.busy);
    assert_eq!(
        snapshot.status.last_error.as_deref(),
        Some(STREAM_ERROR_MESSAGE)
    );
}

#[test]
fn initialization_failure_blocks_submissions() {
    let runtime = test_runtime();
    let state = ChatState::new(Arc::new(MockProvider::new(MockScript::FailSession(
        "Gemini API key is not set".into(),
    ))));

    assert!(matches!(
        state.initialize(),
        Err(ChatError::Initialization(message)) if message == "Gemini API key is not set"
    ));
    assert_eq!(
        runtime.block_on(state.submit("hello")),
        Err(ChatError::NotInitialized)
    );
    assert!(state.messages().is_empty());
    assert!(state.status().last_error.is_some());
}
