use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use wavescope::app::config::Config;
use wavescope::app::{App, ConnectLabel, UseLabel};
use wavescope::audio::{
    AudioError, AudioStatus, CaptureStream, DeviceInfo, DeviceKind, MediaDevices,
};
use wavescope::serial::{
    PortDescriptor, SerialDriver, SerialError, SerialLink, SerialStatus,
};

/// Serial driver stub over a fixed port list; opens always succeed with a
/// detached link.
struct StubSerialDriver {
    ports: Vec<String>,
}

impl StubSerialDriver {
    fn new(ports: &[&str]) -> Self {
        Self {
            ports: ports.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[async_trait]
impl SerialDriver for StubSerialDriver {
    async fn list(&self) -> Result<Vec<PortDescriptor>, SerialError> {
        Ok(self
            .ports
            .iter()
            .map(|name| PortDescriptor { name: name.clone() })
            .collect())
    }

    async fn open(&self, port: &str, _baud_rate: u32) -> Result<SerialLink, SerialError> {
        Ok(SerialLink::detached(port).0)
    }
}

/// Media layer stub reporting the given capture inputs plus one output that
/// the scanner must filter away.
struct StubMediaDevices {
    inputs: Vec<String>,
}

impl StubMediaDevices {
    fn new(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[async_trait]
impl MediaDevices for StubMediaDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        let mut devices: Vec<DeviceInfo> = self
            .inputs
            .iter()
            .map(|label| DeviceInfo {
                kind: DeviceKind::AudioInput,
                device_id: format!("id-{}", label),
                label: label.clone(),
            })
            .collect();
        devices.push(DeviceInfo {
            kind: DeviceKind::AudioOutput,
            device_id: "id-speakers".to_string(),
            label: "Speakers".to_string(),
        });
        Ok(devices)
    }

    async fn get_user_media(&self, device_id: &str) -> Result<CaptureStream, AudioError> {
        let known = self.inputs.iter().any(|l| format!("id-{}", l) == device_id);
        if !known {
            return Err(AudioError::DeviceNotFound(device_id.to_string()));
        }
        let samples: Vec<f32> = (0..4096)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        Ok(CaptureStream::synthetic(device_id, 48_000, &samples))
    }
}

fn build_app(ports: &[&str], inputs: &[&str]) -> App {
    App::new(
        Arc::new(StubSerialDriver::new(ports)),
        Arc::new(StubMediaDevices::new(inputs)),
        Config::default(),
    )
}

#[tokio::test]
async fn scan_populates_selector_and_enables_connect() {
    let mut app = build_app(&["COM3", "COM4"], &[]);
    app.initialize().await;

    let names: Vec<&str> = app.ports().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["COM3", "COM4"]);
    assert!(app.controls.connect);
    assert_eq!(app.controls.connect_label, ConnectLabel::Connect);
}

#[tokio::test]
async fn empty_port_list_keeps_connect_disabled() {
    let mut app = build_app(&[], &[]);
    app.initialize().await;

    assert!(app.ports().is_empty());
    assert!(!app.controls.connect);
}

#[tokio::test]
async fn audio_scan_lists_only_capture_inputs() {
    let mut app = build_app(&[], &["Mic"]);
    app.initialize().await;

    assert_eq!(app.audio_inputs().len(), 1);
    assert_eq!(app.audio_inputs()[0].label, "Mic");
    assert!(app.controls.use_audio);
}

#[tokio::test]
async fn serial_connect_is_a_toggle() {
    let mut app = build_app(&["COM3"], &[]);
    app.initialize().await;

    app.toggle_serial().await;
    assert_eq!(app.serial_status(), SerialStatus::Open);
    assert_eq!(app.controls.connect_label, ConnectLabel::Disconnect);

    // Same action again must disconnect, not reconnect.
    app.toggle_serial().await;
    assert_eq!(app.serial_status(), SerialStatus::Closed);
    assert_eq!(app.controls.connect_label, ConnectLabel::Connect);
    // The close rescan repopulated the selector.
    assert_eq!(app.ports().len(), 1);
    assert!(app.controls.connect);
}

#[tokio::test]
async fn audio_connect_is_a_toggle_and_stops_all_painting() {
    let mut app = build_app(&[], &["Mic"]);
    app.initialize().await;

    app.toggle_audio().await;
    assert_eq!(app.audio_status(), AudioStatus::Open);
    assert!(app.visualizer_running());
    assert_eq!(app.controls.use_audio_label, UseLabel::Unuse);

    let waveform = app.waveform_surface();
    let spectrum = app.spectrum_surface();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(waveform.lock().unwrap().frames() > 0);
    assert!(spectrum.lock().unwrap().frames() > 0);

    app.toggle_audio().await;
    assert_eq!(app.audio_status(), AudioStatus::Closed);
    assert!(!app.visualizer_running());
    assert_eq!(app.controls.use_audio_label, UseLabel::Use);

    // No frame may land after disconnect.
    let wf = waveform.lock().unwrap().frames();
    let sp = spectrum.lock().unwrap().frames();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(waveform.lock().unwrap().frames(), wf);
    assert_eq!(spectrum.lock().unwrap().frames(), sp);
}

/// Media layer that lists a device but refuses to grant capture on it.
struct DenyingMediaDevices;

#[async_trait]
impl MediaDevices for DenyingMediaDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        Ok(vec![DeviceInfo {
            kind: DeviceKind::AudioInput,
            device_id: "id-mic".to_string(),
            label: "Mic".to_string(),
        }])
    }

    async fn get_user_media(&self, _device_id: &str) -> Result<CaptureStream, AudioError> {
        Err(AudioError::CaptureDenied("permission denied".to_string()))
    }
}

#[tokio::test]
async fn denied_grant_leaves_audio_closed_and_controls_recover() {
    let mut app = App::new(
        Arc::new(StubSerialDriver::new(&[])),
        Arc::new(DenyingMediaDevices),
        Config::default(),
    );
    app.initialize().await;
    assert!(app.controls.use_audio);

    app.toggle_audio().await;
    assert_eq!(app.audio_status(), AudioStatus::Closed);
    assert!(!app.visualizer_running());
    // The scan control came back so the user can retry by hand.
    assert!(app.controls.scan_audio);
    assert_eq!(app.controls.use_audio_label, UseLabel::Use);
}

#[tokio::test]
async fn shutdown_releases_both_sessions() {
    let mut app = build_app(&["COM3"], &["Mic"]);
    app.initialize().await;

    app.toggle_serial().await;
    app.toggle_audio().await;
    assert_eq!(app.serial_status(), SerialStatus::Open);
    assert_eq!(app.audio_status(), AudioStatus::Open);

    app.shutdown().await;
    assert_eq!(app.serial_status(), SerialStatus::Closed);
    assert_eq!(app.audio_status(), AudioStatus::Closed);
    assert!(!app.visualizer_running());
}
