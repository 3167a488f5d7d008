use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use super::devices::AudioError;

// Decibel range mapped onto the 0..=255 byte scale.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

/// Frequency/time-domain analyser over a rolling window of capture samples.
///
/// Mirrors the usual analyser-node contract: a power-of-two transform size,
/// half as many frequency bins, byte-scaled output in both domains, and a
/// smoothing constant blending consecutive magnitude frames (0.0 means each
/// frame reflects only the current window).
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    window: Vec<f32>,
    samples: VecDeque<f32>,
    fft: Arc<dyn Fft<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new(fft_size: usize, smoothing: f32) -> Result<Self, AudioError> {
        if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
            return Err(AudioError::InvalidFftSize(fft_size));
        }

        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Ok(Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            window: blackman_window(fft_size),
            samples: VecDeque::with_capacity(fft_size),
            fft,
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Half the transform size: one bin per frequency band up to Nyquist.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Appends capture samples, keeping only the most recent window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.samples.len() == self.fft_size {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Writes byte-scaled time-domain amplitudes, 128 marking the zero
    /// crossing. The window is copied chronologically; positions beyond the
    /// buffered data read as silence.
    pub fn get_byte_time_domain_data(&self, out: &mut [u8]) {
        let mut iter = self.samples.iter();
        for slot in out.iter_mut() {
            let sample = iter.next().copied().unwrap_or(0.0);
            *slot = time_domain_byte(sample);
        }
    }

    /// Writes byte-scaled magnitudes for the lowest `out.len()` bins.
    ///
    /// Magnitudes are Blackman-windowed, normalized by the transform size,
    /// blended with the previous frame by the smoothing constant, then
    /// mapped from [-100 dB, -30 dB] onto 0..=255 with clamping.
    pub fn get_byte_frequency_data(&mut self, out: &mut [u8]) {
        let n = self.fft_size;
        let mut buffer: Vec<Complex<f32>> = Vec::with_capacity(n);
        let missing = n - self.samples.len();
        buffer.extend(std::iter::repeat(Complex::new(0.0, 0.0)).take(missing));
        for (i, &sample) in self.samples.iter().enumerate() {
            buffer.push(Complex::new(sample * self.window[missing + i], 0.0));
        }

        self.fft.process(&mut buffer);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (k, slot) in self.smoothed.iter_mut().enumerate() {
            let magnitude = buffer[k].norm() / n as f32;
            *slot = self.smoothing * *slot + (1.0 - self.smoothing) * magnitude;
        }
        for (k, slot) in out.iter_mut().enumerate() {
            let value = match self.smoothed.get(k) {
                Some(&magnitude) if magnitude > 0.0 => {
                    let db = 20.0 * magnitude.log10();
                    (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0)
                }
                _ => 0.0,
            };
            *slot = value as u8;
        }
    }
}

fn time_domain_byte(sample: f32) -> u8 {
    (128.0 * (1.0 + sample)).round().clamp(0.0, 255.0) as u8
}

fn blackman_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * i as f32 / n as f32;
            0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_size_must_be_power_of_two() {
        assert!(matches!(
            Analyser::new(1000, 0.0),
            Err(AudioError::InvalidFftSize(1000))
        ));
        assert!(Analyser::new(8192, 0.0).is_ok());
    }

    #[test]
    fn test_bin_count_is_half_the_transform_size() {
        let analyser = Analyser::new(8192, 0.0).unwrap();
        assert_eq!(analyser.frequency_bin_count(), 4096);
    }

    #[test]
    fn test_silence_maps_to_midpoint_and_floor() {
        let mut analyser = Analyser::new(2048, 0.0).unwrap();
        analyser.push_samples(&vec![0.0; 2048]);

        let mut time = vec![0u8; 1024];
        analyser.get_byte_time_domain_data(&mut time);
        assert!(time.iter().all(|&b| b == 128));

        let mut freq = vec![0u8; 1024];
        analyser.get_byte_frequency_data(&mut freq);
        assert!(freq.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_time_domain_byte_mapping() {
        assert_eq!(time_domain_byte(0.0), 128);
        assert_eq!(time_domain_byte(1.0), 255);
        assert_eq!(time_domain_byte(-1.0), 0);
        // out-of-range samples clamp instead of wrapping
        assert_eq!(time_domain_byte(2.0), 255);
        assert_eq!(time_domain_byte(-2.0), 0);
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let n = 2048;
        let bin = 64;
        let mut analyser = Analyser::new(n, 0.0).unwrap();
        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / n as f32).sin())
            .collect();
        analyser.push_samples(&samples);

        let mut freq = vec![0u8; n / 2];
        analyser.get_byte_frequency_data(&mut freq);

        // A full-scale tone sits far above the -30 dB ceiling.
        assert_eq!(freq[bin], 255);
        // Energy away from the main lobe stays well below the peak.
        assert!(freq[bin + 100] < freq[bin]);
        assert!(freq[bin / 2] < freq[bin]);
    }

    #[test]
    fn test_zero_smoothing_reacts_instantly() {
        let n = 2048;
        let bin = 32;
        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / n as f32).sin())
            .collect();

        let mut instant = Analyser::new(n, 0.0).unwrap();
        let mut damped = Analyser::new(n, 0.9).unwrap();
        instant.push_samples(&samples);
        damped.push_samples(&samples);

        let mut a = vec![0u8; n / 2];
        let mut b = vec![0u8; n / 2];
        instant.get_byte_frequency_data(&mut a);
        damped.get_byte_frequency_data(&mut b);

        // The damped analyser is still climbing from its zeroed history.
        assert!(a[bin] > b[bin]);
    }

    #[test]
    fn test_window_rolls_forward() {
        let mut analyser = Analyser::new(32, 0.0).unwrap();
        analyser.push_samples(&vec![1.0; 32]);
        analyser.push_samples(&[-1.0]);

        let mut time = vec![0u8; 32];
        analyser.get_byte_time_domain_data(&mut time);
        // Oldest sample fell out; the newest (-1.0) sits at the end.
        assert_eq!(time[0], 255);
        assert_eq!(time[31], 0);
    }
}
