use egui::{self, RawInput};
use gemchat::{render_ui, GemchatEguiApp, ThemeMode};
use gemchat_core::llm::{MockProvider, MockScript};
use gemchat_core::state::ChatState;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn build_app(provider: MockProvider, theme: ThemeMode) -> GemchatEguiApp {
    let runtime = Arc::new(test_runtime());
    let state = ChatState::new(Arc::new(provider));
    let _ = state.initialize();
    if state.is_initialized() {
        runtime
            .block_on(state.submit("Seed the conversation with ```rust\nfn main() {}\n```"))
            .expect("seed message");
    }
    GemchatEguiApp::new(state, runtime, theme)
}

fn render(app: &mut GemchatEguiApp) -> usize {
    let ctx = egui::Context::default();
    let output = ctx.run(RawInput::default(), |ctx| {
        render_ui(ctx, app);
    });
    ctx.tessellate(output.shapes, 1.0).len()
}

#[test]
fn renders_conversation_in_both_themes() {
    for theme in [ThemeMode::Dark, ThemeMode::Light] {
        let mut app = build_app(MockProvider::echo(), theme);
        assert_eq!(app.state().messages().len(), 3);
        assert!(render(&mut app) > 0, "{theme:?} frame drew nothing");
    }
}

#[test]
fn renders_initialization_banner_without_session() {
    let mut app = build_app(
        MockProvider::new(MockScript::FailSession("no key".into())),
        ThemeMode::Dark,
    );
    assert!(!app.state().is_initialized());
    assert!(render(&mut app) > 0);
}

#[test]
fn rejected_submission_returns_text_to_the_input() {
    let runtime = Arc::new(test_runtime());
    let state = ChatState::new(Arc::new(MockProvider::new(MockScript::FailSession(
        "no key".into(),
    ))));
    let _ = state.initialize();
    let mut app = GemchatEguiApp::new(state, runtime.clone(), ThemeMode::Dark);

    app.set_draft("  keep me  ");
    app.submit_message();
    assert!(app.draft().is_empty());

    runtime.block_on(async { tokio::time::sleep(Duration::from_millis(20)).await });
    assert!(render(&mut app) > 0);
    assert_eq!(app.draft(), "keep me");
    assert_eq!(app.notice(), Some("chat session has not been initialized"));
    assert!(app.state().messages().is_empty());
}
