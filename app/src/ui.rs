use chrono::{DateTime, Local, Utc};
use egui::{self, Align, Color32, Frame, Layout, Margin, RichText, ScrollArea, Vec2};
use egui_commonmark::{CommonMarkCache, CommonMarkViewer};
use gemchat_core::state::{ChatMessage, ConversationSnapshot, MessageAuthor};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ThemeMode {
    Light,
    #[default]
    Dark,
}

impl ThemeMode {
    pub fn label(self) -> &'static str {
        match self {
            ThemeMode::Light => "Light",
            ThemeMode::Dark => "Dark",
        }
    }

    pub fn fallback_theme(self) -> eframe::Theme {
        match self {
            ThemeMode::Light => eframe::Theme::Light,
            ThemeMode::Dark => eframe::Theme::Dark,
        }
    }

    pub fn palette(self) -> ThemePalette {
        match self {
            ThemeMode::Light => ThemePalette::for_light(),
            ThemeMode::Dark => ThemePalette::for_dark(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemePalette {
    pub background: Color32,
    pub surface: Color32,
    pub user_bubble: Color32,
    pub bot_bubble: Color32,
    pub accent: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,
    pub border: Color32,
    pub warning: Color32,
    pub warning_fill: Color32,
}

impl ThemePalette {
    pub fn for_dark() -> Self {
        Self {
            background: color_from_hex("#111827"),
            surface: color_from_hex("#1F2937"),
            user_bubble: color_from_hex("#0F766E"),
            bot_bubble: color_from_hex("#1F2937"),
            accent: color_from_hex("#2DD4BF"),
            text_primary: color_from_hex("#F9FAFB"),
            text_secondary: color_from_hex("#9CA3AF"),
            border: color_from_hex("#374151"),
            warning: color_from_hex("#F87171"),
            warning_fill: Color32::from_rgba_unmultiplied(127, 29, 29, 80),
        }
    }

    pub fn for_light() -> Self {
        Self {
            background: color_from_hex("#FFFFFF"),
            surface: color_from_hex("#F3F4F6"),
            user_bubble: color_from_hex("#CCFBF1"),
            bot_bubble: color_from_hex("#F3F4F6"),
            accent: color_from_hex("#0D9488"),
            text_primary: color_from_hex("#111827"),
            text_secondary: color_from_hex("#4B5563"),
            border: color_from_hex("#D1D5DB"),
            warning: color_from_hex("#B91C1C"),
            warning_fill: color_from_hex("#FEE2E2"),
        }
    }

    pub fn visuals(&self, dark_mode: bool) -> egui::Visuals {
        let mut visuals = if dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        };
        visuals.window_fill = self.surface;
        visuals.panel_fill = self.background;
        visuals.extreme_bg_color = self.surface;
        visuals.widgets.noninteractive.bg_fill = self.surface;
        visuals.widgets.noninteractive.fg_stroke.color = self.text_primary;
        visuals.widgets.active.fg_stroke.color = self.text_primary;
        visuals.widgets.inactive.fg_stroke.color = self.text_primary;
        visuals.dark_mode = dark_mode;
        visuals
    }
}

fn color_from_hex(hex: &str) -> Color32 {
    let trimmed = hex.trim_start_matches('#');
    if trimmed.len() == 6 {
        if let Ok(value) = u32::from_str_radix(trimmed, 16) {
            let r = ((value >> 16) & 0xFF) as u8;
            let g = ((value >> 8) & 0xFF) as u8;
            let b = (value & 0xFF) as u8;
            return Color32::from_rgb(r, g, b);
        }
    }
    Color32::WHITE
}

pub struct Header;

impl Header {
    pub fn show(ui: &mut egui::Ui, palette: &ThemePalette) {
        ui.vertical_centered(|ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new("Gemini").heading().strong().color(palette.accent));
                ui.label(
                    RichText::new("Code Assistant")
                        .heading()
                        .strong()
                        .color(palette.text_secondary),
                );
            });
        });
    }
}

pub struct ErrorBanner;

impl ErrorBanner {
    pub fn show(ui: &mut egui::Ui, palette: &ThemePalette, message: &str) {
        ui.vertical_centered(|ui| {
            Frame::none()
                .fill(palette.warning_fill)
                .stroke(egui::Stroke::new(1.0, palette.warning))
                .rounding(6.0)
                .inner_margin(Margin::symmetric(12.0, 8.0))
                .show(ui, |ui| {
                    ui.label(RichText::new(message).color(palette.warning).small());
                });
        });
    }
}

pub struct ChatPanel;

impl ChatPanel {
    /// Draws the conversation, pinned to the newest message.
    pub fn show(
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        snapshot: &ConversationSnapshot,
        markdown_cache: &mut CommonMarkCache,
    ) {
        let busy = snapshot.status.busy;
        let last = snapshot.messages.len().saturating_sub(1);
        ScrollArea::vertical()
            .id_source("chat_history")
            .stick_to_bottom(true)
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                for (index, message) in snapshot.messages.iter().enumerate() {
                    let streaming = busy && index == last;
                    Self::chat_bubble(ui, palette, markdown_cache, message, streaming);
                    ui.add_space(8.0);
                }
                if let Some(error) = snapshot.status.last_error.as_deref() {
                    if !busy && !snapshot.messages.is_empty() {
                        ErrorBanner::show(ui, palette, error);
                    }
                }
            });
    }

    fn chat_bubble(
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        markdown_cache: &mut CommonMarkCache,
        message: &ChatMessage,
        streaming: bool,
    ) {
        let is_user = matches!(message.author, MessageAuthor::User);
        let bubble_color = if is_user {
            palette.user_bubble
        } else {
            palette.bot_bubble
        };
        let total_width = ui.available_width().max(0.0);
        let bubble_width = (total_width * 0.8).max(240.0).min(total_width);
        let layout = if is_user {
            Layout::right_to_left(Align::Min)
        } else {
            Layout::left_to_right(Align::Min)
        };
        ui.with_layout(layout, |ui| {
            ui.allocate_ui_with_layout(
                Vec2::new(bubble_width, 0.0),
                Layout::top_down(Align::Min),
                |ui| {
                    Frame::none()
                        .fill(bubble_color)
                        .stroke(egui::Stroke::new(1.0, palette.border))
                        .rounding(egui::Rounding::same(10.0))
                        .inner_margin(Margin::symmetric(12.0, 8.0))
                        .show(ui, |ui| {
                            ui.horizontal(|ui| {
                                ui.label(RichText::new(message.author_label()).strong());
                                ui.label(
                                    RichText::new(format_timestamp(message.created_at))
                                        .color(palette.text_secondary)
                                        .small(),
                                );
                            });
                            if streaming && message.content.is_empty() {
                                ui.spinner();
                                return;
                            }
                            CommonMarkViewer::new(format!("msg_{}", message.id)).show(
                                ui,
                                markdown_cache,
                                &message.content,
                            );
                            if streaming {
                                ui.spinner();
                                return;
                            }
                            for block in extract_code_blocks(&message.content) {
                                ui.horizontal(|ui| {
                                    ui.label(
                                        RichText::new(format!("Code ({})", block.language))
                                            .color(palette.text_secondary)
                                            .small(),
                                    );
                                    if ui
                                        .button("Copy")
                                        .on_hover_text("Copy code block to clipboard")
                                        .clicked()
                                    {
                                        ui.output_mut(|out| {
                                            out.copied_text = block.content.clone()
                                        });
                                    }
                                });
                            }
                        });
                },
            );
        });
    }
}

fn format_timestamp(time: DateTime<Utc>) -> String {
    let local: DateTime<Local> = DateTime::from(time);
    local.format("%H:%M").to_string()
}

trait AuthorLabel {
    fn author_label(&self) -> &'static str;
}

impl AuthorLabel for ChatMessage {
    fn author_label(&self) -> &'static str {
        match self.author {
            MessageAuthor::User => "You",
            MessageAuthor::Bot => "Gemini",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CodeBlock {
    pub(crate) language: String,
    pub(crate) content: String,
}

pub(crate) fn extract_code_blocks(content: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current_language = String::new();
    let mut current = String::new();
    let mut in_block = false;
    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            if in_block {
                blocks.push(CodeBlock {
                    language: std::mem::take(&mut current_language),
                    content: current.trim().to_string(),
                });
                current.clear();
                in_block = false;
            } else {
                in_block = true;
                current_language = line.trim().trim_matches('`').trim().to_string();
                if current_language.is_empty() {
                    current_language = "text".to_string();
                }
            }
            continue;
        }
        if in_block {
            current.push_str(line);
            current.push('\n');
        }
    }
    blocks
}

#[derive(Clone, Default)]
pub struct InputBarState {
    pub draft: String,
}

impl InputBarState {
    /// Trimmed draft ready to send, clearing the box. Blank drafts stay put.
    pub fn take_message(&mut self) -> Option<String> {
        let message = self.draft.trim().to_string();
        if message.is_empty() {
            return None;
        }
        self.draft.clear();
        Some(message)
    }
}

#[derive(Default)]
pub struct InputBarOutput {
    pub send: bool,
}

pub struct InputBar;

impl InputBar {
    pub fn show(
        ui: &mut egui::Ui,
        state: &mut InputBarState,
        palette: &ThemePalette,
        enabled: bool,
    ) -> InputBarOutput {
        let mut output = InputBarOutput::default();
        Frame::none()
            .fill(palette.surface)
            .rounding(6.0)
            .stroke(egui::Stroke::new(1.0, palette.border))
            .inner_margin(Margin::symmetric(10.0, 8.0))
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    let input_id = ui.make_persistent_id("chat_input");
                    let focused = ui.memory(|mem| mem.has_focus(input_id));
                    let send_shortcut = enabled && focused && ui.input_mut(take_plain_enter);
                    let hint = if enabled {
                        "Ask me anything about code…"
                    } else {
                        "Waiting for Gemini…"
                    };
                    let width = (ui.available_width() - 80.0).max(120.0);
                    let response = ui.add_enabled(
                        enabled,
                        egui::TextEdit::multiline(&mut state.draft)
                            .id(input_id)
                            .desired_rows(2)
                            .desired_width(width)
                            .hint_text(hint)
                            .frame(false),
                    );
                    if send_shortcut && response.has_focus() {
                        output.send = true;
                    }
                    if ui
                        .add_enabled(enabled, egui::Button::new("Send"))
                        .clicked()
                    {
                        output.send = true;
                    }
                });
            });
        output
    }
}

/// Removes Enter presses without Shift from this frame's input so the text
/// box does not turn them into newlines. Shift+Enter is left alone.
fn take_plain_enter(input: &mut egui::InputState) -> bool {
    let before = input.events.len();
    input.events.retain(|event| !is_plain_enter(event));
    input.events.len() != before
}

fn is_plain_enter(event: &egui::Event) -> bool {
    matches!(
        event,
        egui::Event::Key {
            key: egui::Key::Enter,
            pressed: true,
            modifiers,
            ..
        } if !modifiers.shift
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter(modifiers: egui::Modifiers) -> egui::Event {
        egui::Event::Key {
            key: egui::Key::Enter,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers,
        }
    }

    #[test]
    fn enter_sends_but_shift_enter_stays_in_the_box() {
        let mut input = egui::InputState::default();
        input.events = vec![enter(egui::Modifiers::SHIFT)];
        assert!(!take_plain_enter(&mut input));
        assert_eq!(input.events.len(), 1);

        input.events.push(enter(egui::Modifiers::NONE));
        assert!(take_plain_enter(&mut input));
        assert_eq!(input.events, vec![enter(egui::Modifiers::SHIFT)]);
    }

    #[test]
    fn extracts_fenced_blocks_with_language() {
        let content = "Intro\n```rust\nfn main() {}\n```\nthen\n```\nplain\n```\n";
        let blocks = extract_code_blocks(content);
        assert_eq!(
            blocks,
            vec![
                CodeBlock {
                    language: "rust".into(),
                    content: "fn main() {}".into(),
                },
                CodeBlock {
                    language: "text".into(),
                    content: "plain".into(),
                },
            ]
        );
    }

    #[test]
    fn unterminated_block_is_not_offered_for_copy() {
        assert!(extract_code_blocks("```python\nprint(1)\n").is_empty());
    }

    #[test]
    fn take_message_trims_and_clears() {
        let mut state = InputBarState {
            draft: "  hello \n".into(),
        };
        assert_eq!(state.take_message().as_deref(), Some("hello"));
        assert!(state.draft.is_empty());

        state.draft = "   \n".into();
        assert_eq!(state.take_message(), None);
        assert_eq!(state.draft, "   \n");
    }

    #[test]
    fn hex_colors_parse_or_fall_back() {
        assert_eq!(color_from_hex("#0D9488"), Color32::from_rgb(0x0D, 0x94, 0x88));
        assert_eq!(color_from_hex("nope"), Color32::WHITE);
    }
}
