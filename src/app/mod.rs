pub mod config;

use log::{info, warn};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::audio::{
    AudioDeviceDescriptor, AudioSessionManager, AudioStatus, DeviceKind, MediaDevices,
};
use crate::render::{Surface, Visualizer};
use crate::serial::{PortDescriptor, SerialDriver, SerialEvent, SerialSessionManager, SerialStatus};
use config::Config;

/// Label shown on the serial connect control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectLabel {
    Connect,
    Connecting,
    Disconnect,
}

impl fmt::Display for ConnectLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectLabel::Connect => write!(f, "Connect"),
            ConnectLabel::Connecting => write!(f, "Connecting..."),
            ConnectLabel::Disconnect => write!(f, "Disconnect"),
        }
    }
}

/// Label shown on the audio use control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseLabel {
    Use,
    Unuse,
}

impl fmt::Display for UseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseLabel::Use => write!(f, "Use"),
            UseLabel::Unuse => write!(f, "Unuse"),
        }
    }
}

/// Enabled/disabled state and labels for every page control.
///
/// The serial and audio domains are gated independently; no operation on one
/// ever touches the other's controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    pub scan_serial: bool,
    pub connect: bool,
    pub connect_label: ConnectLabel,
    pub serial_select: bool,
    pub scan_audio: bool,
    pub use_audio: bool,
    pub use_audio_label: UseLabel,
    pub audio_select: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            scan_serial: false,
            connect: false,
            connect_label: ConnectLabel::Connect,
            serial_select: false,
            scan_audio: false,
            use_audio: false,
            use_audio_label: UseLabel::Use,
            audio_select: false,
        }
    }
}

/// Main application struct that coordinates all components.
///
/// Owns every piece of page state explicitly: control gating, the scanned
/// device lists, the two session managers, the visualizer, and the drawing
/// surfaces. Every handler takes `&mut self` on the single control task.
pub struct App {
    config: Config,
    driver: Arc<dyn SerialDriver>,
    media: Arc<dyn MediaDevices>,
    pub controls: Controls,
    ports: Vec<PortDescriptor>,
    audio_inputs: Vec<AudioDeviceDescriptor>,
    selected_port: usize,
    selected_input: usize,
    serial: SerialSessionManager,
    audio: AudioSessionManager,
    visualizer: Visualizer,
    waveform_surface: Arc<Mutex<Surface>>,
    spectrum_surface: Arc<Mutex<Surface>>,
}

impl App {
    /// Creates a new application instance over the given device seams.
    pub fn new(
        driver: Arc<dyn SerialDriver>,
        media: Arc<dyn MediaDevices>,
        config: Config,
    ) -> Self {
        let waveform_surface = Arc::new(Mutex::new(Surface::new(
            "waveform",
            config.surface_width,
            config.surface_height,
        )));
        let spectrum_surface = Arc::new(Mutex::new(Surface::new(
            "spectrum",
            config.surface_width,
            config.surface_height,
        )));

        Self {
            serial: SerialSessionManager::new(Arc::clone(&driver)),
            audio: AudioSessionManager::new(Arc::clone(&media)),
            driver,
            media,
            config,
            controls: Controls::default(),
            ports: Vec::new(),
            audio_inputs: Vec::new(),
            selected_port: 0,
            selected_input: 0,
            visualizer: Visualizer::new(),
            waveform_surface,
            spectrum_surface,
        }
    }

    /// Runs both device scans, as on page load.
    pub async fn initialize(&mut self) {
        self.scan_serial_ports().await;
        self.scan_audio_inputs().await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn update_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Loads configuration from a file
    pub fn load_config<P: AsRef<Path>>(&mut self, path: P) -> Result<(), String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let config =
            Config::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

        self.config = config;
        Ok(())
    }

    /// Saves configuration to a file
    pub fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let content = self.config.to_string();

        fs::write(path, content).map_err(|e| format!("Failed to write config file: {}", e))?;

        Ok(())
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn audio_inputs(&self) -> &[AudioDeviceDescriptor] {
        &self.audio_inputs
    }

    pub fn selected_port(&self) -> usize {
        self.selected_port
    }

    pub fn selected_input(&self) -> usize {
        self.selected_input
    }

    pub fn serial_status(&self) -> SerialStatus {
        self.serial.status()
    }

    pub fn audio_status(&self) -> AudioStatus {
        self.audio.status()
    }

    pub fn visualizer_running(&self) -> bool {
        self.visualizer.is_running()
    }

    pub fn waveform_surface(&self) -> Arc<Mutex<Surface>> {
        Arc::clone(&self.waveform_surface)
    }

    pub fn spectrum_surface(&self) -> Arc<Mutex<Surface>> {
        Arc::clone(&self.spectrum_surface)
    }

    /// Rescans serial ports and repopulates the selector.
    ///
    /// Resets the connect control first; it only comes back enabled when the
    /// fresh list is non-empty. A failed scan leaves it disabled until the
    /// user re-triggers the scan.
    pub async fn scan_serial_ports(&mut self) {
        self.controls.connect = false;
        self.controls.connect_label = ConnectLabel::Connect;
        self.controls.scan_serial = true;
        self.controls.serial_select = true;

        match self.driver.list().await {
            Ok(ports) => {
                self.ports = ports;
                self.selected_port = 0;
                if !self.ports.is_empty() {
                    self.controls.connect = true;
                }
            }
            Err(e) => {
                warn!("serial port scan failed: {}", e);
            }
        }
    }

    /// Rescans media devices, keeping only capture inputs.
    pub async fn scan_audio_inputs(&mut self) {
        self.controls.use_audio = false;
        self.controls.use_audio_label = UseLabel::Use;
        self.controls.scan_audio = true;
        self.controls.audio_select = true;

        match self.media.enumerate_devices().await {
            Ok(devices) => {
                self.audio_inputs = devices
                    .into_iter()
                    .filter(|d| d.kind == DeviceKind::AudioInput)
                    .map(|d| {
                        info!("{}", d.label);
                        AudioDeviceDescriptor {
                            device_id: d.device_id,
                            label: d.label,
                        }
                    })
                    .collect();
                self.selected_input = 0;
                if !self.audio_inputs.is_empty() {
                    self.controls.use_audio = true;
                }
            }
            Err(e) => {
                warn!("audio input scan failed: {}", e);
            }
        }
    }

    /// Connect control action, dispatched on the current serial state:
    /// Closed connects, Open disconnects, transitional states ignore it.
    pub async fn toggle_serial(&mut self) {
        match self.serial.status() {
            SerialStatus::Open => self.disconnect_serial().await,
            SerialStatus::Closed => self.connect_serial().await,
            SerialStatus::Opening | SerialStatus::Closing => {}
        }
    }

    async fn connect_serial(&mut self) {
        let Some(port) = self.ports.get(self.selected_port).cloned() else {
            warn!("no serial port selected");
            return;
        };

        // Entering Opening: freeze the selector and scan controls.
        self.controls.serial_select = false;
        self.controls.connect = false;
        self.controls.connect_label = ConnectLabel::Connecting;
        self.controls.scan_serial = false;

        match self.serial.connect(&port.name, self.config.baud_rate).await {
            Ok(()) => {
                self.controls.connect = true;
                self.controls.connect_label = ConnectLabel::Disconnect;
            }
            Err(e) => {
                warn!("serial open failed: {}", e);
                // Back to Closed; rescanning re-arms the controls.
                self.scan_serial_ports().await;
            }
        }
    }

    async fn disconnect_serial(&mut self) {
        if let Err(e) = self.serial.disconnect().await {
            warn!("serial close failed: {}", e);
        }
        // Entering Closed re-runs the scanner and discards the session.
        self.scan_serial_ports().await;
    }

    /// Drains pending serial events; called from the control loop tick.
    pub async fn pump_serial_events(&mut self) {
        while let Some(event) = self.serial.poll_event() {
            match event {
                SerialEvent::Data(bytes) => {
                    info!("data: {}", String::from_utf8_lossy(&bytes));
                }
                SerialEvent::Error(reason) => {
                    warn!("serial error: {}", reason);
                    // A driver error while Open forces an immediate close.
                    self.disconnect_serial().await;
                }
                SerialEvent::Disconnected => {
                    info!("serial disconnected");
                }
                SerialEvent::Closed => {
                    info!("serial closed by driver");
                    self.disconnect_serial().await;
                }
            }
        }
    }

    /// Use control action, dispatched on the current audio state.
    pub async fn toggle_audio(&mut self) {
        match self.audio.status() {
            AudioStatus::Open => self.disconnect_audio().await,
            AudioStatus::Closed => self.connect_audio().await,
            AudioStatus::Requesting => {}
        }
    }

    async fn connect_audio(&mut self) {
        let Some(input) = self.audio_inputs.get(self.selected_input).cloned() else {
            warn!("no audio input selected");
            return;
        };

        self.controls.audio_select = false;
        self.controls.scan_audio = false;
        self.controls.use_audio_label = UseLabel::Unuse;

        match self
            .audio
            .connect(&input.device_id, self.config.fft_size, self.config.smoothing)
            .await
        {
            Ok(analyser) => {
                self.visualizer.start(
                    &analyser,
                    Arc::clone(&self.waveform_surface),
                    Arc::clone(&self.spectrum_surface),
                    self.config.frame_rate,
                );
            }
            Err(e) => {
                warn!("audio capture request failed: {}", e);
                // Session stays Closed; re-arm the audio controls so the
                // user can retry.
                self.controls.use_audio_label = UseLabel::Use;
                self.controls.scan_audio = true;
                self.controls.audio_select = true;
            }
        }
    }

    async fn disconnect_audio(&mut self) {
        // Render loops first, so nothing touches the analyser mid-teardown.
        self.visualizer.stop().await;
        if let Err(e) = self.audio.disconnect().await {
            warn!("audio close failed: {}", e);
        }
        self.scan_audio_inputs().await;
    }

    pub fn select_next_port(&mut self) {
        if self.controls.serial_select && !self.ports.is_empty() {
            self.selected_port = (self.selected_port + 1) % self.ports.len();
        }
    }

    pub fn select_prev_port(&mut self) {
        if self.controls.serial_select && !self.ports.is_empty() {
            self.selected_port = (self.selected_port + self.ports.len() - 1) % self.ports.len();
        }
    }

    pub fn select_next_input(&mut self) {
        if self.controls.audio_select && !self.audio_inputs.is_empty() {
            self.selected_input = (self.selected_input + 1) % self.audio_inputs.len();
        }
    }

    pub fn select_prev_input(&mut self) {
        if self.controls.audio_select && !self.audio_inputs.is_empty() {
            self.selected_input =
                (self.selected_input + self.audio_inputs.len() - 1) % self.audio_inputs.len();
        }
    }

    /// Shuts down the application, releasing both sessions.
    pub async fn shutdown(&mut self) {
        if matches!(self.audio.status(), AudioStatus::Open) {
            self.visualizer.stop().await;
            let _ = self.audio.disconnect().await;
        }
        if matches!(self.serial.status(), SerialStatus::Open) {
            let _ = self.serial.disconnect().await;
        }
    }
}
