use log::{debug, info};
use ringbuf::HeapConsumer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::analyser::Analyser;
use super::devices::{AudioError, CaptureStream, MediaDevices};

/// How often the source pump drains the capture ring into the analyser.
const PUMP_INTERVAL: Duration = Duration::from_millis(20);
const PUMP_CHUNK: usize = 4096;

/// Externally visible connection state of the audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStatus {
    Closed,
    Requesting,
    Open,
}

/// The wired analysis graph: capture stream -> source pump -> analyser.
struct AudioSession {
    stream: CaptureStream,
    analyser: Arc<Mutex<Analyser>>,
    pump_stop: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl AudioSession {
    async fn release(self) {
        self.pump_stop.store(true, Ordering::SeqCst);
        let _ = self.pump.await;
        self.stream.release().await;
    }
}

enum State {
    Closed,
    Requesting,
    Open(AudioSession),
}

/// Owns the single audio capture session.
///
/// Transitions: Closed -> Requesting -> Open -> Closed. A denied grant falls
/// back to Closed; a grant that lands after a disconnect is released on the
/// spot instead of resurrecting the session.
pub struct AudioSessionManager {
    media: Arc<dyn MediaDevices>,
    state: State,
    generation: u64,
}

impl AudioSessionManager {
    pub fn new(media: Arc<dyn MediaDevices>) -> Self {
        Self {
            media,
            state: State::Closed,
            generation: 0,
        }
    }

    pub fn status(&self) -> AudioStatus {
        match self.state {
            State::Closed => AudioStatus::Closed,
            State::Requesting => AudioStatus::Requesting,
            State::Open(_) => AudioStatus::Open,
        }
    }

    /// Shared handle to the live analyser, if the session is open.
    pub fn analyser(&self) -> Option<Arc<Mutex<Analyser>>> {
        match &self.state {
            State::Open(session) => Some(Arc::clone(&session.analyser)),
            _ => None,
        }
    }

    /// Requests capture from the given device and wires the analysis graph.
    /// Only legal from Closed.
    pub async fn connect(
        &mut self,
        device_id: &str,
        fft_size: usize,
        smoothing: f32,
    ) -> Result<Arc<Mutex<Analyser>>, AudioError> {
        if !matches!(self.state, State::Closed) {
            return Err(AudioError::AlreadyActive);
        }

        let generation = self.generation;
        self.state = State::Requesting;

        let mut stream = match self.media.get_user_media(device_id).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = State::Closed;
                return Err(e);
            }
        };

        if self.generation != generation || !matches!(self.state, State::Requesting) {
            // Disconnected while the request was pending; the grant must not
            // outlive it.
            stream.release().await;
            return Err(AudioError::Superseded);
        }

        let analyser = match Analyser::new(fft_size, smoothing) {
            Ok(analyser) => Arc::new(Mutex::new(analyser)),
            Err(e) => {
                self.state = State::Closed;
                stream.release().await;
                return Err(e);
            }
        };

        let pump_stop = Arc::new(AtomicBool::new(false));
        let pump = tokio::spawn(pump_samples(
            stream.take_samples(),
            Arc::clone(&analyser),
            Arc::clone(&pump_stop),
        ));

        info!("audio capture open on {}", stream.device_id());
        self.state = State::Open(AudioSession {
            stream,
            analyser: Arc::clone(&analyser),
            pump_stop,
            pump,
        });
        Ok(analyser)
    }

    /// Tears down the graph and releases the capture stream.
    pub async fn disconnect(&mut self) -> Result<(), AudioError> {
        self.generation += 1;
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(session) => {
                session.release().await;
                info!("audio capture closed");
                Ok(())
            }
            State::Requesting => {
                // The pending grant will be dropped when it arrives.
                Ok(())
            }
            State::Closed => Err(AudioError::NotOpen),
        }
    }
}

/// Source node analogue: bridges the capture ring into the analyser window.
async fn pump_samples(
    consumer: Option<HeapConsumer<f32>>,
    analyser: Arc<Mutex<Analyser>>,
    stop: Arc<AtomicBool>,
) {
    let Some(mut consumer) = consumer else {
        return;
    };

    let mut interval = tokio::time::interval(PUMP_INTERVAL);
    let mut chunk = Vec::with_capacity(PUMP_CHUNK);
    loop {
        interval.tick().await;
        if stop.load(Ordering::SeqCst) {
            break;
        }

        chunk.clear();
        while let Some(sample) = consumer.pop() {
            chunk.push(sample);
            if chunk.len() >= PUMP_CHUNK {
                break;
            }
        }
        if !chunk.is_empty() {
            debug!("pumping {} samples into analyser", chunk.len());
            analyser.lock().unwrap().push_samples(&chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::devices::MockMediaDevices;
    use std::f32::consts::PI;

    fn media_granting(samples: Vec<f32>) -> Arc<MockMediaDevices> {
        let mut media = MockMediaDevices::new();
        media
            .expect_get_user_media()
            .returning(move |id| Ok(CaptureStream::synthetic(id, 48_000, &samples)));
        Arc::new(media)
    }

    #[tokio::test]
    async fn test_connect_wires_the_graph() {
        let samples: Vec<f32> = (0..2048)
            .map(|i| (2.0 * PI * 64.0 * i as f32 / 2048.0).sin())
            .collect();
        let mut manager = AudioSessionManager::new(media_granting(samples));

        let analyser = manager.connect("Mic", 2048, 0.0).await.unwrap();
        assert_eq!(manager.status(), AudioStatus::Open);
        assert_eq!(analyser.lock().unwrap().frequency_bin_count(), 1024);

        // Give the pump a couple of ticks to drain the synthetic stream.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let mut time = vec![0u8; 1024];
        analyser.lock().unwrap().get_byte_time_domain_data(&mut time);
        assert!(time.iter().any(|&b| b != 128));

        manager.disconnect().await.unwrap();
        assert_eq!(manager.status(), AudioStatus::Closed);
    }

    #[tokio::test]
    async fn test_denied_grant_returns_to_closed() {
        let mut media = MockMediaDevices::new();
        media
            .expect_get_user_media()
            .returning(|_| Err(AudioError::CaptureDenied("permission denied".to_string())));
        let mut manager = AudioSessionManager::new(Arc::new(media));

        let result = manager.connect("Mic", 2048, 0.0).await;
        assert!(matches!(result, Err(AudioError::CaptureDenied(_))));
        assert_eq!(manager.status(), AudioStatus::Closed);
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let mut manager = AudioSessionManager::new(media_granting(Vec::new()));
        manager.connect("Mic", 2048, 0.0).await.unwrap();

        let second = manager.connect("Mic", 2048, 0.0).await;
        assert!(matches!(second, Err(AudioError::AlreadyActive)));
        assert_eq!(manager.status(), AudioStatus::Open);
    }

    #[tokio::test]
    async fn test_bad_fft_size_releases_the_grant() {
        let mut manager = AudioSessionManager::new(media_granting(Vec::new()));
        let result = manager.connect("Mic", 1000, 0.0).await;
        assert!(matches!(result, Err(AudioError::InvalidFftSize(1000))));
        assert_eq!(manager.status(), AudioStatus::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_requires_a_session() {
        let mut manager = AudioSessionManager::new(Arc::new(MockMediaDevices::new()));
        assert!(matches!(
            manager.disconnect().await,
            Err(AudioError::NotOpen)
        ));
    }
}
