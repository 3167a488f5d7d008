use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyModifiers};
use log::warn;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use wavescope::app::config::Config;
use wavescope::app::App;
use wavescope::audio::CpalMediaDevices;
use wavescope::serial::SystemSerialDriver;
use wavescope::ui::{action_allowed, TerminalUI, UiAction};

const CONFIG_FILE: &str = "wavescope.conf";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut app = App::new(
        Arc::new(SystemSerialDriver::new()),
        Arc::new(CpalMediaDevices::new()),
        Config::default(),
    );

    if Path::new(CONFIG_FILE).exists() {
        if let Err(e) = app.load_config(CONFIG_FILE) {
            warn!("{}", e);
        }
    }

    // Page load: populate both device lists before the first frame.
    app.initialize().await;

    let mut ui = TerminalUI::new();
    ui.initialize()?;

    let result = run_ui(&mut app, &mut ui).await;

    ui.shutdown()?;
    app.shutdown().await;

    result
}

async fn run_ui(app: &mut App, ui: &mut TerminalUI) -> Result<()> {
    let tick_rate = Duration::from_millis(33); // ~30 FPS
    let mut last_tick = Instant::now();

    loop {
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if let Some(Event::Key(key)) = ui.poll_events(timeout)? {
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                break;
            }

            if let Some(action) = ui.handle_key_event(key.code) {
                if action == UiAction::Quit {
                    break;
                }
                // Keys for disabled controls are ignored, like clicks on a
                // disabled button.
                if action_allowed(action, &app.controls) {
                    dispatch(app, action).await;
                }
            }
        }

        // Serial events arrive between frames; drain them on every pass.
        app.pump_serial_events().await;

        if last_tick.elapsed() >= tick_rate {
            ui.render(app)?;
            last_tick = Instant::now();
        }
    }

    Ok(())
}

async fn dispatch(app: &mut App, action: UiAction) {
    match action {
        UiAction::ScanSerial => app.scan_serial_ports().await,
        UiAction::ToggleSerial => app.toggle_serial().await,
        UiAction::ScanAudio => app.scan_audio_inputs().await,
        UiAction::ToggleAudio => app.toggle_audio().await,
        UiAction::NextPort => app.select_next_port(),
        UiAction::PrevPort => app.select_prev_port(),
        UiAction::NextInput => app.select_next_input(),
        UiAction::PrevInput => app.select_prev_input(),
        UiAction::Quit => {}
    }
}
