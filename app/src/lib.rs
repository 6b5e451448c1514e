pub mod app;
pub mod ui;

pub use app::{render_ui, GemchatEguiApp};
pub use ui::ThemeMode;
