use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::error;
#[cfg(test)]
use mockall::automock;
use ringbuf::{HeapConsumer, HeapRb};
use std::fmt;
use std::sync::mpsc;
use std::thread;
use thiserror::Error;

/// Ring capacity between the capture callback and the source pump.
const RING_CAPACITY: usize = 1024 * 8;

/// Kind of media device reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
}

/// Raw platform device record; the scanner filters these down to inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub kind: DeviceKind,
    pub device_id: String,
    pub label: String,
}

/// A selectable capture input, refreshed on each scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceDescriptor {
    pub device_id: String,
    pub label: String,
}

impl fmt::Display for AudioDeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to enumerate audio devices: {0}")]
    Enumerate(String),
    #[error("no capture device matches id {0:?}")]
    DeviceNotFound(String),
    #[error("capture request failed: {0}")]
    CaptureDenied(String),
    #[error("analyser transform size {0} is not a power of two")]
    InvalidFftSize(usize),
    #[error("audio session already active")]
    AlreadyActive,
    #[error("no open audio session")]
    NotOpen,
    #[error("capture grant arrived after disconnect")]
    Superseded,
}

/// A granted capture stream.
///
/// The platform stream object itself lives on a dedicated worker thread (it
/// cannot move between threads); this handle owns the worker and the sample
/// ring the capture callback fills.
pub struct CaptureStream {
    device_id: String,
    sample_rate: u32,
    samples: Option<HeapConsumer<f32>>,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CaptureStream {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Takes the sample consumer for wiring into the analysis graph.
    /// Yields `None` on the second call.
    pub fn take_samples(&mut self) -> Option<HeapConsumer<f32>> {
        self.samples.take()
    }

    /// Stops capture and waits for the worker thread to drop the stream.
    pub async fn release(mut self) {
        // Dropping the sender unparks the worker even if it never saw a stop
        // message.
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        }
    }

    /// A capture stream fed from a fixed sample buffer instead of hardware.
    /// Used by tests and offline runs.
    pub fn synthetic(device_id: &str, sample_rate: u32, samples: &[f32]) -> Self {
        let rb = HeapRb::<f32>::new(samples.len().max(1));
        let (mut prod, cons) = rb.split();
        for &sample in samples {
            let _ = prod.push(sample);
        }
        Self {
            device_id: device_id.to_string(),
            sample_rate,
            samples: Some(cons),
            stop: None,
            worker: None,
        }
    }
}

/// Platform media seam: device enumeration and capture grants.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Lists every media device the platform reports, inputs and outputs.
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError>;

    /// Requests a capture stream constrained to exactly the given device id.
    async fn get_user_media(&self, device_id: &str) -> Result<CaptureStream, AudioError>;
}

/// Production media layer backed by cpal.
pub struct CpalMediaDevices;

impl CpalMediaDevices {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for CpalMediaDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        tokio::task::spawn_blocking(|| {
            let host = cpal::default_host();
            let mut devices = Vec::new();

            let inputs = host
                .input_devices()
                .map_err(|e| AudioError::Enumerate(e.to_string()))?;
            for device in inputs {
                if let Ok(name) = device.name() {
                    devices.push(DeviceInfo {
                        kind: DeviceKind::AudioInput,
                        device_id: name.clone(),
                        label: name,
                    });
                }
            }

            // Output enumeration failures are not fatal; the scanner only
            // keeps inputs anyway.
            if let Ok(outputs) = host.output_devices() {
                for device in outputs {
                    if let Ok(name) = device.name() {
                        devices.push(DeviceInfo {
                            kind: DeviceKind::AudioOutput,
                            device_id: name.clone(),
                            label: name,
                        });
                    }
                }
            }

            Ok(devices)
        })
        .await
        .map_err(|e| AudioError::Enumerate(e.to_string()))?
    }

    async fn get_user_media(&self, device_id: &str) -> Result<CaptureStream, AudioError> {
        let id = device_id.to_string();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = {
            let id = id.clone();
            thread::Builder::new()
                .name("audio-capture".to_string())
                .spawn(move || match build_capture(&id) {
                    Ok((stream, sample_rate, consumer)) => {
                        if ready_tx.send(Ok((sample_rate, consumer))).is_err() {
                            return;
                        }
                        // Park until release() drops the stop sender, then
                        // let the stream drop on this thread.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                })
                .map_err(|e| AudioError::CaptureDenied(e.to_string()))?
        };

        let granted = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| AudioError::CaptureDenied(e.to_string()))?
            .map_err(|e| AudioError::CaptureDenied(e.to_string()))?;

        match granted {
            Ok((sample_rate, consumer)) => Ok(CaptureStream {
                device_id: id,
                sample_rate,
                samples: Some(consumer),
                stop: Some(stop_tx),
                worker: Some(worker),
            }),
            Err(e) => {
                let _ = tokio::task::spawn_blocking(move || worker.join()).await;
                Err(e)
            }
        }
    }
}

/// Opens the device and starts the stream. Runs on the capture worker thread
/// because the returned stream must stay there.
fn build_capture(
    device_id: &str,
) -> Result<(cpal::Stream, u32, HeapConsumer<f32>), AudioError> {
    let host = cpal::default_host();
    let device = host
        .input_devices()
        .map_err(|e| AudioError::Enumerate(e.to_string()))?
        .find(|d| matches!(d.name(), Ok(name) if name == device_id))
        .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))?;

    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::CaptureDenied(e.to_string()))?;
    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let rb = HeapRb::<f32>::new(RING_CAPACITY);
    let (mut prod, cons) = rb.split();

    let err_fn = |err: cpal::StreamError| {
        error!("audio stream error: {}", err);
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let _ = prod.push(sample);
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let normalized = sample as f32 / i16::MAX as f32;
                    let _ = prod.push(normalized);
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let normalized = (sample as f32 / u16::MAX as f32) * 2.0 - 1.0;
                    let _ = prod.push(normalized);
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::CaptureDenied(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| AudioError::CaptureDenied(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::CaptureDenied(e.to_string()))?;

    Ok((stream, sample_rate, cons))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_stream_yields_its_samples() {
        let mut stream = CaptureStream::synthetic("mic", 48_000, &[0.1, -0.2, 0.3]);
        assert_eq!(stream.device_id(), "mic");
        assert_eq!(stream.sample_rate(), 48_000);

        let mut consumer = stream.take_samples().unwrap();
        let mut drained = Vec::new();
        while let Some(sample) = consumer.pop() {
            drained.push(sample);
        }
        assert_eq!(drained, vec![0.1, -0.2, 0.3]);

        // Consumer can only be taken once.
        assert!(stream.take_samples().is_none());
    }

    #[tokio::test]
    async fn test_synthetic_stream_release_is_clean() {
        let stream = CaptureStream::synthetic("mic", 44_100, &[]);
        stream.release().await;
    }
}
