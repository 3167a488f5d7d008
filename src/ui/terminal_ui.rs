use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Terminal,
};
use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::app::{App, Controls};
use crate::audio::AudioStatus;
use crate::serial::SerialStatus;
use crate::ui::widgets::SurfaceView;

/// Actions a key press can request from the page controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    ScanSerial,
    ToggleSerial,
    ScanAudio,
    ToggleAudio,
    NextPort,
    PrevPort,
    NextInput,
    PrevInput,
    Quit,
}

/// Main UI controller that manages terminal rendering
pub struct TerminalUI {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    running: Arc<AtomicBool>,
}

impl TerminalUI {
    pub fn new() -> Self {
        Self {
            terminal: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Checks if the terminal UI is initialized
    pub fn is_initialized(&self) -> bool {
        self.terminal.is_some()
    }

    /// Initializes the terminal UI
    pub fn initialize(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

        let backend = CrosstermBackend::new(stdout);
        self.terminal = Some(Terminal::new(backend)?);
        self.running.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Shuts down the terminal UI
    pub fn shutdown(&mut self) -> io::Result<()> {
        if let Some(terminal) = self.terminal.as_mut() {
            disable_raw_mode()?;
            execute!(
                terminal.backend_mut(),
                LeaveAlternateScreen,
                DisableMouseCapture
            )?;
            terminal.show_cursor()?;
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Polls for terminal events
    pub fn poll_events(&self, timeout: Duration) -> io::Result<Option<Event>> {
        if event::poll(timeout)? {
            return Ok(Some(event::read()?));
        }
        Ok(None)
    }

    /// Maps a key press to a page action. Gating on control state happens in
    /// the dispatcher, not here.
    pub fn handle_key_event(&mut self, key: KeyCode) -> Option<UiAction> {
        match key {
            KeyCode::Char('s') => Some(UiAction::ScanSerial),
            KeyCode::Char('c') => Some(UiAction::ToggleSerial),
            KeyCode::Char('a') => Some(UiAction::ScanAudio),
            KeyCode::Char('u') => Some(UiAction::ToggleAudio),
            KeyCode::Up => Some(UiAction::PrevPort),
            KeyCode::Down => Some(UiAction::NextPort),
            KeyCode::Char('k') => Some(UiAction::PrevInput),
            KeyCode::Char('j') => Some(UiAction::NextInput),
            KeyCode::Char('q') | KeyCode::Esc => Some(UiAction::Quit),
            _ => None,
        }
    }

    /// Renders the UI
    pub fn render(&mut self, app: &App) -> io::Result<()> {
        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };

        let waveform = app.waveform_surface();
        let spectrum = app.spectrum_surface();

        terminal.draw(|frame| {
            let area = frame.size();

            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(8), // Device panels
                    Constraint::Min(8),    // Visualization surfaces
                    Constraint::Length(3), // Status bar
                ])
                .split(area);

            let panels = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(rows[0]);

            // Serial panel (left)
            let port_items: Vec<ListItem> = app
                .ports()
                .iter()
                .map(|p| ListItem::new(Line::from(Span::raw(p.name.clone()))))
                .collect();
            let mut port_state = ListState::default();
            if !app.ports().is_empty() {
                port_state.select(Some(app.selected_port()));
            }
            let serial_title = format!(
                "Serial  {}  {}",
                control_hint("s", "Scan", app.controls.scan_serial),
                control_hint(
                    "c",
                    &app.controls.connect_label.to_string(),
                    app.controls.connect
                ),
            );
            let port_list = List::new(port_items)
                .block(Block::default().title(serial_title).borders(Borders::ALL))
                .highlight_style(selector_style(app.controls.serial_select));
            frame.render_stateful_widget(port_list, panels[0], &mut port_state);

            // Audio panel (right)
            let input_items: Vec<ListItem> = app
                .audio_inputs()
                .iter()
                .map(|d| ListItem::new(Line::from(Span::raw(d.label.clone()))))
                .collect();
            let mut input_state = ListState::default();
            if !app.audio_inputs().is_empty() {
                input_state.select(Some(app.selected_input()));
            }
            let audio_title = format!(
                "Audio In  {}  {}",
                control_hint("a", "Scan", app.controls.scan_audio),
                control_hint(
                    "u",
                    &app.controls.use_audio_label.to_string(),
                    app.controls.use_audio
                ),
            );
            let input_list = List::new(input_items)
                .block(Block::default().title(audio_title).borders(Borders::ALL))
                .highlight_style(selector_style(app.controls.audio_select));
            frame.render_stateful_widget(input_list, panels[1], &mut input_state);

            // Visualization surfaces
            let views = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(rows[1]);

            {
                let waveform = waveform.lock().unwrap();
                frame.render_widget(
                    SurfaceView::new(&waveform)
                        .block(Block::default().title("Waveform").borders(Borders::ALL))
                        .style(Style::default().fg(Color::Green)),
                    views[0],
                );
            }
            {
                let spectrum = spectrum.lock().unwrap();
                frame.render_widget(
                    SurfaceView::new(&spectrum)
                        .block(Block::default().title("Spectrum").borders(Borders::ALL))
                        .style(Style::default().fg(Color::Cyan)),
                    views[1],
                );
            }

            // Status bar
            let status = Paragraph::new(Line::from(vec![
                Span::raw(format!("serial: {}", status_word(app.serial_status()))),
                Span::raw("  |  "),
                Span::raw(format!("audio: {}", audio_status_word(app.audio_status()))),
                Span::raw("  |  "),
                Span::styled(
                    "up/down ports  j/k inputs  q quit",
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
            .block(Block::default().borders(Borders::ALL));
            frame.render_widget(status, rows[2]);
        })?;

        Ok(())
    }
}

impl Default for TerminalUI {
    fn default() -> Self {
        Self::new()
    }
}

fn control_hint(key: &str, label: &str, enabled: bool) -> String {
    if enabled {
        format!("[{}] {}", key, label)
    } else {
        format!("({}) {}", key, label)
    }
}

fn selector_style(enabled: bool) -> Style {
    if enabled {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn status_word(status: SerialStatus) -> &'static str {
    match status {
        SerialStatus::Closed => "closed",
        SerialStatus::Opening => "opening",
        SerialStatus::Open => "open",
        SerialStatus::Closing => "closing",
    }
}

fn audio_status_word(status: AudioStatus) -> &'static str {
    match status {
        AudioStatus::Closed => "closed",
        AudioStatus::Requesting => "requesting",
        AudioStatus::Open => "open",
    }
}

/// Returns true when the action's control is currently enabled.
pub fn action_allowed(action: UiAction, controls: &Controls) -> bool {
    match action {
        UiAction::ScanSerial => controls.scan_serial,
        UiAction::ToggleSerial => controls.connect,
        UiAction::ScanAudio => controls.scan_audio,
        UiAction::ToggleAudio => controls.use_audio,
        UiAction::NextPort | UiAction::PrevPort => controls.serial_select,
        UiAction::NextInput | UiAction::PrevInput => controls.audio_select,
        UiAction::Quit => true,
    }
}
