// User Interface module
// Handles the terminal user interface

pub mod terminal_ui;
pub mod widgets;

// Re-export important types
pub use terminal_ui::{action_allowed, TerminalUI, UiAction};
