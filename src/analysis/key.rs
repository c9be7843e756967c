//! # Key Estimation
//!
//! Template matching over a time-averaged chroma profile.
//!
//! ## Algorithm:
//! 1. Fold each STFT frame's power spectrum onto 12 pitch classes and
//!    normalize the frame by its loudest class
//! 2. Average the frames into one 12-vector
//! 3. Correlate (Pearson) that vector with every rotation of the
//!    Krumhansl-Schmuckler major and minor profiles
//! 4. The best-correlated rotation/mode wins; ties keep the first maximum
//!    found scanning rotations 0..11, major before minor

use crate::analysis::spectrum::{bin_frequency, magnitude_frames, FFT_SIZE};
use crate::audio::Waveform;
use std::fmt;

/// Pitch-class names, index 0 = C.
pub const PITCH_CLASSES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Krumhansl-Schmuckler major key profile (tonic at index 0).
pub const MAJOR_PROFILE: [f32; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Schmuckler minor key profile (tonic at index 0).
pub const MINOR_PROFILE: [f32; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Spectrum bins below C1 are ignored when building chroma.
pub const MIN_CHROMA_FREQUENCY_HZ: f32 = 32.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => write!(f, "Major"),
            Mode::Minor => write!(f, "Minor"),
        }
    }
}

/// One of the 24 major/minor keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalKey {
    /// Tonic pitch class, 0 = C .. 11 = B
    pub tonic: usize,
    pub mode: Mode,
}

impl MusicalKey {
    pub fn tonic_name(&self) -> &'static str {
        PITCH_CLASSES[self.tonic % 12]
    }
}

/// Formats as `"<PitchClass> <Major|Minor>"`, e.g. `"A Minor"`.
impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic_name(), self.mode)
    }
}

/// Pitch class (0 = C) nearest to `frequency`, equal temperament with A4 = 440 Hz.
pub fn pitch_class_of(frequency: f32) -> usize {
    let midi = 69.0 + 12.0 * (frequency / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

/// Time-averaged 12-bin chroma profile of a waveform.
///
/// Returns all zeros for an empty or silent buffer.
pub fn chroma_profile(waveform: &Waveform) -> [f32; 12] {
    let bin_classes: Vec<Option<usize>> = (0..FFT_SIZE / 2)
        .map(|bin| {
            let freq = bin_frequency(bin, waveform.sample_rate);
            (freq >= MIN_CHROMA_FREQUENCY_HZ).then(|| pitch_class_of(freq))
        })
        .collect();

    let frames = magnitude_frames(&waveform.samples);
    let mut profile = [0.0f32; 12];
    if frames.is_empty() {
        return profile;
    }

    for magnitudes in &frames {
        let mut frame_chroma = [0.0f32; 12];
        for (magnitude, class) in magnitudes.iter().zip(&bin_classes) {
            if let Some(class) = class {
                frame_chroma[*class] += magnitude * magnitude;
            }
        }

        let loudest = frame_chroma.iter().copied().fold(0.0f32, f32::max);
        if loudest > 0.0 {
            for (acc, value) in profile.iter_mut().zip(frame_chroma) {
                *acc += value / loudest;
            }
        }
    }

    let count = frames.len() as f32;
    profile.iter_mut().for_each(|v| *v /= count);
    profile
}

/// Rotate a profile so its tonic moves from index 0 to index `k`.
pub fn rotate(profile: &[f32; 12], k: usize) -> [f32; 12] {
    let mut rotated = [0.0f32; 12];
    for (j, slot) in rotated.iter_mut().enumerate() {
        *slot = profile[(j + 12 - k % 12) % 12];
    }
    rotated
}

/// Pearson correlation coefficient; `None` when either vector is constant.
pub fn pearson(a: &[f32; 12], b: &[f32; 12]) -> Option<f64> {
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / 12.0;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / 12.0;

    let (mut cov, mut var_a, mut var_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(cov / denom)
}

/// Best-matching key for a chroma vector, `None` if the vector has no variance.
pub fn estimate_key(chroma: &[f32; 12]) -> Option<MusicalKey> {
    let mut candidates = Vec::with_capacity(24);

    for tonic in 0..12 {
        for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
            let r = pearson(chroma, &rotate(profile, tonic))?;
            candidates.push((r, MusicalKey { tonic, mode }));
        }
    }

    best_of(&candidates)
}

/// Highest-correlation candidate. On equal correlation the earlier entry wins.
pub fn best_of(candidates: &[(f64, MusicalKey)]) -> Option<MusicalKey> {
    let mut best: Option<(f64, MusicalKey)> = None;
    for &(r, key) in candidates {
        if best.map_or(true, |(best_r, _)| r > best_r) {
            best = Some((r, key));
        }
    }
    best.map(|(_, key)| key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_rotation_consistency() {
        for k in 0..12 {
            let major = estimate_key(&rotate(&MAJOR_PROFILE, k)).unwrap();
            assert_eq!(major, MusicalKey { tonic: k, mode: Mode::Major });

            let minor = estimate_key(&rotate(&MINOR_PROFILE, k)).unwrap();
            assert_eq!(minor, MusicalKey { tonic: k, mode: Mode::Minor });
        }
    }

    fn scan_order(values: impl Fn(usize, Mode) -> f64) -> Vec<(f64, MusicalKey)> {
        (0..12)
            .flat_map(|tonic| [Mode::Major, Mode::Minor].map(|mode| (tonic, mode)))
            .map(|(tonic, mode)| (values(tonic, mode), MusicalKey { tonic, mode }))
            .collect()
    }

    #[test]
    fn test_equal_correlation_keeps_earliest_tonic() {
        let candidates = scan_order(|tonic, mode| match (tonic, mode) {
            (3, Mode::Minor) | (5, Mode::Major) => 0.9,
            _ => 0.1,
        });
        assert_eq!(best_of(&candidates), Some(MusicalKey { tonic: 3, mode: Mode::Minor }));
    }

    #[test]
    fn test_equal_correlation_prefers_major_at_same_tonic() {
        let candidates = scan_order(|tonic, _| if tonic == 7 { 0.8 } else { -0.2 });
        assert_eq!(best_of(&candidates), Some(MusicalKey { tonic: 7, mode: Mode::Major }));
        assert_eq!(best_of(&[]), None);
    }

    #[test]
    fn test_rotate_moves_tonic() {
        let rotated = rotate(&MAJOR_PROFILE, 9);
        assert_eq!(rotated[9], MAJOR_PROFILE[0]);
        assert_eq!(rotated[0], MAJOR_PROFILE[3]);
        assert_eq!(rotate(&MAJOR_PROFILE, 0), MAJOR_PROFILE);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(MusicalKey { tonic: 9, mode: Mode::Minor }.to_string(), "A Minor");
        assert_eq!(MusicalKey { tonic: 1, mode: Mode::Major }.to_string(), "C# Major");
        assert_eq!(estimate_key(&rotate(&MINOR_PROFILE, 9)).unwrap().to_string(), "A Minor");
    }

    #[test]
    fn test_flat_chroma_has_no_key() {
        assert_eq!(estimate_key(&[0.0; 12]), None);
        assert_eq!(estimate_key(&[0.3; 12]), None);
    }

    #[test]
    fn test_pitch_class_of() {
        assert_eq!(pitch_class_of(440.0), 9);
        assert_eq!(pitch_class_of(261.63), 0);
        assert_eq!(pitch_class_of(880.0), 9);
        assert_eq!(pitch_class_of(466.16), 10);
    }

    #[test]
    fn test_chroma_of_pure_a_peaks_at_a() {
        let sample_rate = 44_100;
        let samples: Vec<f32> = (0..sample_rate)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        let chroma = chroma_profile(&Waveform::new(samples, sample_rate as u32));

        let loudest = chroma
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(PITCH_CLASSES[loudest], "A");
    }

    #[test]
    fn test_silence_has_flat_chroma() {
        let chroma = chroma_profile(&Waveform::new(vec![0.0; 8192], 44_100));
        assert_eq!(chroma, [0.0; 12]);
        assert!(chroma_profile(&Waveform::new(Vec::new(), 44_100)).iter().all(|v| *v == 0.0));
    }
}
