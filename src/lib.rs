// Wavescope: serial + audio input picker with live waveform/spectrum views
// Expose public modules for use in integration tests

pub mod app;
pub mod audio;
pub mod render;
pub mod serial;
pub mod ui;

// Re-export commonly used types for convenience
pub use app::config::Config;
pub use app::{App, ConnectLabel, Controls, UseLabel};
pub use audio::{Analyser, AudioSessionManager, AudioStatus, CpalMediaDevices, MediaDevices};
pub use render::{Surface, Visualizer};
pub use serial::{PortDescriptor, SerialDriver, SerialSessionManager, SerialStatus, SystemSerialDriver};
pub use ui::{TerminalUI, UiAction};
