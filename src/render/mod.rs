// Render loops: explicit frame ticks with a cancellation flag, painting
// analyser frames onto shared surfaces.

pub mod surface;

pub use surface::{paint_spectrum, paint_waveform, Surface};

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::audio::Analyser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Waveform,
    Spectrum,
}

/// Handle to a running render loop.
///
/// The loop checks the cancellation flag at the top of every frame, so
/// cancelling takes effect within one frame period.
pub struct RenderHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RenderHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Cancels the loop and waits for it to wind down.
    pub async fn stopped(self) {
        self.cancel();
        let _ = self.task.await;
    }
}

/// Spawns one render loop pulling analysis frames at the given frame rate.
///
/// The loop holds only a weak analyser reference: if the session is torn
/// down before the loop is cancelled, the upgrade fails and the loop exits
/// without touching released state.
pub fn spawn_render_loop(
    mode: RenderMode,
    analyser: Weak<Mutex<Analyser>>,
    surface: Arc<Mutex<Surface>>,
    frame_rate: u32,
) -> RenderHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);

    let task = tokio::spawn(async move {
        let period = Duration::from_millis(1000 / frame_rate.max(1) as u64);
        let mut interval = tokio::time::interval(period);
        let mut data: Vec<u8> = Vec::new();

        loop {
            interval.tick().await;
            if flag.load(Ordering::SeqCst) {
                break;
            }
            let Some(analyser) = analyser.upgrade() else {
                debug!("analyser released, {:?} loop exiting", mode);
                break;
            };

            {
                let mut analyser = analyser.lock().unwrap();
                data.resize(analyser.frequency_bin_count(), 0);
                match mode {
                    RenderMode::Spectrum => analyser.get_byte_frequency_data(&mut data),
                    RenderMode::Waveform => analyser.get_byte_time_domain_data(&mut data),
                }
            }

            let mut surface = surface.lock().unwrap();
            match mode {
                RenderMode::Spectrum => paint_spectrum(&mut surface, &data),
                RenderMode::Waveform => paint_waveform(&mut surface, &data),
            }
        }
    });

    RenderHandle { cancel, task }
}

/// The two page-level render loops, waveform and spectrum.
pub struct Visualizer {
    waveform: Option<RenderHandle>,
    spectrum: Option<RenderHandle>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            waveform: None,
            spectrum: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.waveform.is_some() || self.spectrum.is_some()
    }

    /// Starts both loops against the given analyser.
    pub fn start(
        &mut self,
        analyser: &Arc<Mutex<Analyser>>,
        waveform_surface: Arc<Mutex<Surface>>,
        spectrum_surface: Arc<Mutex<Surface>>,
        frame_rate: u32,
    ) {
        self.waveform = Some(spawn_render_loop(
            RenderMode::Waveform,
            Arc::downgrade(analyser),
            waveform_surface,
            frame_rate,
        ));
        self.spectrum = Some(spawn_render_loop(
            RenderMode::Spectrum,
            Arc::downgrade(analyser),
            spectrum_surface,
            frame_rate,
        ));
    }

    /// Cancels both loops and waits until neither can paint again.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.waveform.take() {
            handle.stopped().await;
        }
        if let Some(handle) = self.spectrum.take() {
            handle.stopped().await;
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_analyser(fft_size: usize) -> Arc<Mutex<Analyser>> {
        Arc::new(Mutex::new(Analyser::new(fft_size, 0.0).unwrap()))
    }

    fn shared_surface(name: &str) -> Arc<Mutex<Surface>> {
        Arc::new(Mutex::new(Surface::new(name, 64, 32)))
    }

    #[tokio::test]
    async fn test_loop_paints_frames_until_cancelled() {
        let analyser = shared_analyser(256);
        let surface = shared_surface("spectrum");

        let handle = spawn_render_loop(
            RenderMode::Spectrum,
            Arc::downgrade(&analyser),
            Arc::clone(&surface),
            120,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(surface.lock().unwrap().frames() > 0);

        handle.stopped().await;
        let frozen = surface.lock().unwrap().frames();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(surface.lock().unwrap().frames(), frozen);
    }

    #[tokio::test]
    async fn test_loop_exits_when_analyser_is_released() {
        let analyser = shared_analyser(256);
        let surface = shared_surface("waveform");

        let handle = spawn_render_loop(
            RenderMode::Waveform,
            Arc::downgrade(&analyser),
            Arc::clone(&surface),
            120,
        );

        drop(analyser);
        // The loop notices the dead weak reference on its next tick and
        // exits without being cancelled.
        let _ = handle.task.await;
    }

    #[tokio::test]
    async fn test_visualizer_stop_halts_both_surfaces() {
        let analyser = shared_analyser(256);
        let waveform = shared_surface("waveform");
        let spectrum = shared_surface("spectrum");

        let mut visualizer = Visualizer::new();
        visualizer.start(&analyser, Arc::clone(&waveform), Arc::clone(&spectrum), 120);
        assert!(visualizer.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        visualizer.stop().await;
        assert!(!visualizer.is_running());

        let wf = waveform.lock().unwrap().frames();
        let sp = spectrum.lock().unwrap().frames();
        assert!(wf > 0 && sp > 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(waveform.lock().unwrap().frames(), wf);
        assert_eq!(spectrum.lock().unwrap().frames(), sp);
    }
}
