use crate::ui::{ChatPanel, ErrorBanner, Header, InputBar, InputBarState, ThemeMode, ThemePalette};
use egui_commonmark::CommonMarkCache;
use gemchat_core::state::ChatState;
use gemchat_core::ChatError;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

pub struct GemchatEguiApp {
    state: ChatState,
    runtime: Arc<Runtime>,
    theme: ThemeMode,
    palette: ThemePalette,
    input: InputBarState,
    markdown_cache: CommonMarkCache,
    visuals_applied: bool,
    repaint_hook: Option<egui::Context>,
    rejected_tx: mpsc::UnboundedSender<(String, ChatError)>,
    rejected_rx: mpsc::UnboundedReceiver<(String, ChatError)>,
    notice: Option<String>,
}

impl GemchatEguiApp {
    pub fn new(state: ChatState, runtime: Arc<Runtime>, theme: ThemeMode) -> Self {
        let (rejected_tx, rejected_rx) = mpsc::unbounded_channel();
        Self {
            state,
            runtime,
            theme,
            palette: theme.palette(),
            input: InputBarState::default(),
            markdown_cache: CommonMarkCache::default(),
            visuals_applied: false,
            repaint_hook: None,
            rejected_tx,
            rejected_rx,
            notice: None,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn draft(&self) -> &str {
        &self.input.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.input.draft = text.into();
    }

    /// Message shown above the input after a rejected submission.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Sends the current draft. A rejected submission hands its text back to
    /// the input box on the next frame.
    pub fn submit_message(&mut self) {
        let Some(content) = self.input.take_message() else {
            return;
        };
        self.notice = None;
        let state = self.state.clone();
        let rejected = self.rejected_tx.clone();
        let repaint = self.repaint_hook.clone();
        self.runtime.spawn(async move {
            match state.submit(content.clone()).await {
                Ok(()) | Err(ChatError::Stream) => {}
                Err(err) => {
                    tracing::warn!(%err, "submission rejected");
                    let _ = rejected.send((content, err));
                    if let Some(ctx) = repaint {
                        ctx.request_repaint();
                    }
                }
            }
        });
    }

    /// Puts rejected text back into an empty input box.
    pub fn restore_rejected(&mut self) {
        while let Ok((content, err)) = self.rejected_rx.try_recv() {
            if self.input.draft.trim().is_empty() {
                self.input.draft = content;
            }
            self.notice = Some(err.to_string());
        }
    }

    // Streams advance on the runtime, so the UI is woken on every state change.
    fn ensure_repaint_hook(&mut self, ctx: &egui::Context) {
        if self.repaint_hook.is_some() {
            return;
        }
        self.repaint_hook = Some(ctx.clone());
        let mut revisions = self.state.subscribe();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            while revisions.changed().await.is_ok() {
                ctx.request_repaint();
            }
        });
    }
}

pub fn render_ui(ctx: &egui::Context, app: &mut GemchatEguiApp) {
    if !app.visuals_applied {
        ctx.set_visuals(app.palette.visuals(app.theme == ThemeMode::Dark));
        app.visuals_applied = true;
    }
    app.ensure_repaint_hook(ctx);
    app.restore_rejected();

    let snapshot = app.state.snapshot();
    let initialized = app.state.is_initialized();
    let palette = app.palette;

    egui::TopBottomPanel::top("header").show(ctx, |ui| {
        ui.add_space(8.0);
        Header::show(ui, &palette);
        if !initialized {
            if let Some(error) = snapshot.status.last_error.as_deref() {
                ui.add_space(6.0);
                ErrorBanner::show(ui, &palette, error);
            }
        }
        ui.add_space(8.0);
    });

    let mut send = false;
    egui::TopBottomPanel::bottom("input").show(ctx, |ui| {
        ui.add_space(8.0);
        if let Some(notice) = app.notice.as_deref() {
            ErrorBanner::show(ui, &palette, notice);
            ui.add_space(6.0);
        }
        let enabled = initialized && !snapshot.status.busy;
        send = InputBar::show(ui, &mut app.input, &palette, enabled).send;
        ui.add_space(8.0);
    });

    egui::CentralPanel::default().show(ctx, |ui| {
        ChatPanel::show(ui, &palette, &snapshot, &mut app.markdown_cache);
    });

    if send {
        app.submit_message();
    }
    if snapshot.status.busy {
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

impl eframe::App for GemchatEguiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        render_ui(ctx, self);
    }
}
