//! Short-time Fourier transform shared by chroma extraction and onset detection.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

pub const FFT_SIZE: usize = 2048;
pub const HOP_SIZE: usize = 512;

pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Magnitude spectra (`FFT_SIZE / 2` bins each) of Hann-windowed frames
/// starting every `HOP_SIZE` samples. The final partial frame is zero padded,
/// so any non-empty input yields at least one frame.
pub fn magnitude_frames(samples: &[f32]) -> Vec<Vec<f32>> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    let hann = hann_window(FFT_SIZE);

    let mut frames = Vec::with_capacity(samples.len() / HOP_SIZE + 1);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
    let mut pos = 0;

    while pos < samples.len() {
        let end = (pos + FFT_SIZE).min(samples.len());
        for (i, slot) in buffer.iter_mut().enumerate() {
            let sample = if pos + i < end { samples[pos + i] } else { 0.0 };
            *slot = Complex::new(sample * hann[i], 0.0);
        }
        fft.process(&mut buffer);
        frames.push(buffer[..FFT_SIZE / 2].iter().map(|c| c.norm()).collect());

        if end == samples.len() {
            break;
        }
        pos += HOP_SIZE;
    }

    frames
}

/// Centre frequency (Hz) of FFT bin `bin`.
pub fn bin_frequency(bin: usize, sample_rate: u32) -> f32 {
    bin as f32 * sample_rate as f32 / FFT_SIZE as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count() {
        assert!(magnitude_frames(&[]).is_empty());
        assert_eq!(magnitude_frames(&[0.5; 100]).len(), 1);
        // frames start at 0, 512, 1024, ... until one reaches the end of the input
        assert_eq!(magnitude_frames(&vec![0.0; 4096]).len(), 5);
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let sample_rate = 44_100;
        let bin = 40;
        let freq = bin_frequency(bin, sample_rate);
        let samples: Vec<f32> = (0..FFT_SIZE)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        let frame = &magnitude_frames(&samples)[0];
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
    }
}
