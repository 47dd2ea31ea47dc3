//! Pitch shifting: phase-vocoder time stretch followed by sinc resampling

use std::f32::consts::PI;
use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;
use tracing::debug;

const TWO_PI: f32 = 2.0 * PI;
/// Floor for overlap-add window normalization.
const WINDOW_SUM_EPSILON: f32 = 1e-3;
/// Frequency at which the requested resolution must hold.
const RESOLUTION_REFERENCE_HZ: f32 = 440.0;
const MIN_FFT_SIZE: usize = 512;
const MAX_FFT_SIZE: usize = 8192;
/// Zero tail appended before resampling to flush the sinc filter.
const RESAMPLER_TAIL: usize = 256;

#[derive(Debug, Error)]
pub enum PitchShiftError {
    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("Invalid shift of {0} semitones")]
    InvalidShift(f64),
    #[error("Resampler error: {0}")]
    Resample(String),
}

/// Transposes a mono buffer without changing its length.
pub trait PitchShifter {
    /// Returns exactly `samples.len()` samples, `semitones` higher (or lower
    /// when negative). `bins_per_octave` is the frequency resolution the
    /// analysis must reach.
    fn shift(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        semitones: f64,
        bins_per_octave: u32,
    ) -> Result<Vec<f32>, PitchShiftError>;
}

impl<T: PitchShifter + ?Sized> PitchShifter for &mut T {
    fn shift(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        semitones: f64,
        bins_per_octave: u32,
    ) -> Result<Vec<f32>, PitchShiftError> {
        (**self).shift(samples, sample_rate, semitones, bins_per_octave)
    }
}

/// FFT size whose bin spacing at 440 Hz is no coarser than `1/bins_per_octave` octave.
pub fn fft_size_for_resolution(sample_rate: u32, bins_per_octave: u32) -> usize {
    let bins = bins_per_octave.max(1) as f32;
    let bin_hz = RESOLUTION_REFERENCE_HZ * (2f32.powf(1.0 / bins) - 1.0);
    let needed = (sample_rate as f32 / bin_hz).ceil() as usize;
    needed.next_power_of_two().clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
}

/// Phase vocoder pitch shifter
pub struct PhaseVocoderShifter {
    planner: FftPlanner<f32>,
}

impl Default for PhaseVocoderShifter {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseVocoderShifter {
    pub fn new() -> Self {
        Self { planner: FftPlanner::new() }
    }

    /// Stretch `input` in time by `hop_synthesis / hop_analysis` keeping its pitch.
    fn stretch(
        &mut self,
        input: &[f32],
        fft_size: usize,
        hop_analysis: usize,
        hop_synthesis: usize,
    ) -> Vec<f32> {
        let forward = self.planner.plan_fft_forward(fft_size);
        let inverse = self.planner.plan_fft_inverse(fft_size);
        let mut vocoder = Vocoder::new(fft_size, hop_analysis, hop_synthesis, forward, inverse);

        // Centre the first frame on sample 0 and run past the end by half a frame
        let half = fft_size / 2;
        let num_frames = (input.len() + half) / hop_analysis + 1;
        let mut padded = vec![0.0f32; (num_frames - 1) * hop_analysis + fft_size];
        padded[half..half + input.len()].copy_from_slice(input);

        let output_len = (num_frames - 1) * hop_synthesis + fft_size;
        let mut output = vec![0.0f32; output_len];
        let mut window_sum = vec![0.0f32; output_len];

        for frame_idx in 0..num_frames {
            let analysis_pos = frame_idx * hop_analysis;
            let synthesis_pos = frame_idx * hop_synthesis;
            vocoder.process_frame(&padded[analysis_pos..analysis_pos + fft_size]);

            let norm = 1.0 / fft_size as f32;
            for (i, (&w, bin)) in vocoder.window.iter().zip(&vocoder.buffer).enumerate() {
                output[synthesis_pos + i] += bin.re * norm * w;
                window_sum[synthesis_pos + i] += w * w;
            }
        }

        for (sample, &sum) in output.iter_mut().zip(&window_sum) {
            *sample /= sum.max(WINDOW_SUM_EPSILON);
        }

        // Input sample t lands at output half + t * ratio
        let ratio = hop_synthesis as f64 / hop_analysis as f64;
        let wanted = (input.len() as f64 * ratio).round() as usize;
        let mut stretched: Vec<f32> = output.into_iter().skip(half).take(wanted).collect();
        stretched.resize(wanted, 0.0);
        stretched
    }
}

impl PitchShifter for PhaseVocoderShifter {
    fn shift(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        semitones: f64,
        bins_per_octave: u32,
    ) -> Result<Vec<f32>, PitchShiftError> {
        if sample_rate == 0 {
            return Err(PitchShiftError::ZeroSampleRate);
        }
        if !semitones.is_finite() {
            return Err(PitchShiftError::InvalidShift(semitones));
        }
        if samples.is_empty() || semitones == 0.0 {
            return Ok(samples.to_vec());
        }

        let fft_size = fft_size_for_resolution(sample_rate, bins_per_octave);
        let hop_analysis = fft_size / 4;
        let target_ratio = 2f64.powf(semitones / 12.0);
        let hop_synthesis = ((hop_analysis as f64 * target_ratio).round() as usize).max(1);

        let stretched = self.stretch(samples, fft_size, hop_analysis, hop_synthesis);
        let shifted = resample_to_length(&stretched, samples.len())?;

        debug!(
            semitones,
            fft_size,
            hop_analysis,
            hop_synthesis,
            frames = samples.len(),
            "Pitch shifted segment"
        );
        Ok(shifted)
    }
}

/// Per-bin phase tracking for one stretch pass
struct Vocoder {
    hop_analysis: usize,
    hop_synthesis: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    prev_phase: Vec<f32>,
    phase_accum: Vec<f32>,
    /// Expected phase advance per analysis hop for each bin
    expected: Vec<f32>,
    first_frame: bool,
}

impl Vocoder {
    fn new(
        fft_size: usize,
        hop_analysis: usize,
        hop_synthesis: usize,
        forward: Arc<dyn Fft<f32>>,
        inverse: Arc<dyn Fft<f32>>,
    ) -> Self {
        let num_bins = fft_size / 2 + 1;
        let window = (0..fft_size)
            .map(|i| 0.5 - 0.5 * (TWO_PI * i as f32 / fft_size as f32).cos())
            .collect();
        let expected = (0..num_bins)
            .map(|bin| TWO_PI * bin as f32 * hop_analysis as f32 / fft_size as f32)
            .collect();

        Self {
            hop_analysis,
            hop_synthesis,
            window,
            forward,
            inverse,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            prev_phase: vec![0.0; num_bins],
            phase_accum: vec![0.0; num_bins],
            expected,
            first_frame: true,
        }
    }

    /// Analyze one frame and leave the resynthesized time-domain frame in `buffer`.
    fn process_frame(&mut self, frame: &[f32]) {
        let fft_size = self.buffer.len();
        let num_bins = fft_size / 2 + 1;

        for ((slot, &s), &w) in self.buffer.iter_mut().zip(frame).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.forward.process(&mut self.buffer);

        let hop_ratio = self.hop_synthesis as f32 / self.hop_analysis as f32;
        for bin in 0..num_bins {
            let (magnitude, phase) = self.buffer[bin].to_polar();
            if self.first_frame {
                self.phase_accum[bin] = phase;
            } else {
                let delta = wrap_phase(phase - self.prev_phase[bin] - self.expected[bin]);
                self.phase_accum[bin] =
                    wrap_phase(self.phase_accum[bin] + (self.expected[bin] + delta) * hop_ratio);
            }
            self.prev_phase[bin] = phase;
            self.buffer[bin] = Complex::from_polar(magnitude, self.phase_accum[bin]);
        }
        self.first_frame = false;

        // Hermitian mirror so the inverse transform is real
        for bin in num_bins..fft_size {
            self.buffer[bin] = self.buffer[fft_size - bin].conj();
        }
        self.inverse.process(&mut self.buffer);
    }
}

fn wrap_phase(phase: f32) -> f32 {
    phase - TWO_PI * (phase / TWO_PI).round()
}

/// Band-limited resample of `input` so that it spans exactly `target_len` samples.
fn resample_to_length(input: &[f32], target_len: usize) -> Result<Vec<f32>, PitchShiftError> {
    if input.is_empty() || target_len == 0 {
        return Ok(vec![0.0; target_len]);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_len as f64 / input.len() as f64;
    let mut padded = input.to_vec();
    padded.extend(std::iter::repeat(0.0).take(RESAMPLER_TAIL));

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, padded.len(), 1)
        .map_err(|e| PitchShiftError::Resample(format!("init: {e}")))?;
    let delay = resampler.output_delay();

    let output = resampler
        .process(&[padded], None)
        .map_err(|e| PitchShiftError::Resample(e.to_string()))?;

    let mut shifted: Vec<f32> = output
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .skip(delay)
        .take(target_len)
        .collect();
    shifted.resize(target_len, 0.0);
    Ok(shifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch_detection::{NsdfPitchExtractor, PitchExtractor};
    use choir_core::{hz_to_midi, median};
    use std::f32::consts::TAU;

    fn sine(hz: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (TAU * hz * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn detected_midi(audio: &[f32], sample_rate: u32) -> f64 {
        let contour = NsdfPitchExtractor::new()
            .extract(audio, sample_rate, 256, 65.0, 1046.0)
            .unwrap();
        let mut pitches = contour.voiced_pitches_in(0.1, audio.len() as f64 / sample_rate as f64 - 0.1);
        median(&mut pitches).unwrap()
    }

    #[test]
    fn test_fft_size_tracks_resolution() {
        assert_eq!(fft_size_for_resolution(44100, 24), 4096);
        assert_eq!(fft_size_for_resolution(44100, 12), 2048);
        assert_eq!(fft_size_for_resolution(8000, 1), MIN_FFT_SIZE);
        assert_eq!(fft_size_for_resolution(192000, 48), MAX_FFT_SIZE);
    }

    #[test]
    fn test_output_length_matches_input() {
        let mut shifter = PhaseVocoderShifter::new();
        for len in [1, 100, 2048, 22050] {
            let input = sine(220.0, 22050, len);
            for semitones in [-12.0, -3.5, 4.0, 7.0, 14.0] {
                let out = shifter.shift(&input, 22050, semitones, 24).unwrap();
                assert_eq!(out.len(), input.len(), "len {len}, shift {semitones}");
            }
        }
    }

    #[test]
    fn test_octave_up_doubles_frequency() {
        let sr = 22050;
        let input = sine(220.0, sr, sr as usize);
        let out = PhaseVocoderShifter::new().shift(&input, sr, 12.0, 24).unwrap();
        let midi = detected_midi(&out, sr);
        assert!((midi - (hz_to_midi(220.0) + 12.0)).abs() < 0.3, "got {midi}");
    }

    #[test]
    fn test_fifth_down() {
        let sr = 22050;
        let input = sine(440.0, sr, sr as usize);
        let out = PhaseVocoderShifter::new().shift(&input, sr, -7.0, 24).unwrap();
        let midi = detected_midi(&out, sr);
        assert!((midi - 62.0).abs() < 0.3, "got {midi}");
    }

    /// First 128-sample block whose peak reaches half the steady level.
    fn onset_block(audio: &[f32]) -> usize {
        const BLOCK: usize = 128;
        let peaks: Vec<f32> = audio
            .chunks(BLOCK)
            .map(|b| b.iter().fold(0.0f32, |acc, s| acc.max(s.abs())))
            .collect();
        let middle = &peaks[peaks.len() / 2..peaks.len() * 3 / 4];
        let steady = middle.iter().sum::<f32>() / middle.len() as f32;
        let block = peaks.iter().position(|&p| p >= 0.5 * steady).unwrap();
        block * BLOCK
    }

    #[test]
    fn test_shifted_onset_stays_aligned_with_input() {
        let sr = 22050;
        let onset = sr as usize / 2;
        let mut input = vec![0.0f32; onset];
        input.extend(sine(220.0, sr, sr as usize));
        let input_onset = onset_block(&input) as i64;

        // 20 ms, well under the drift a misaligned trim would cause at these ratios
        let tolerance = (0.020 * sr as f64) as i64;
        let mut shifter = PhaseVocoderShifter::new();
        for semitones in [-12.0, 4.0, 19.0] {
            let out = shifter.shift(&input, sr, semitones, 24).unwrap();
            let offset = onset_block(&out) as i64 - input_onset;
            assert!(offset.abs() <= tolerance, "shift {semitones}: onset moved {offset} samples");
        }
    }

    #[test]
    fn test_steady_tone_reaches_end_of_segment() {
        let sr = 22050;
        let input = sine(220.0, sr, sr as usize);
        let mut shifter = PhaseVocoderShifter::new();
        for semitones in [-12.0, 19.0] {
            let out = shifter.shift(&input, sr, semitones, 24).unwrap();
            let last = &out[out.len() - 512..out.len() - 256];
            let peak = last.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
            assert!(peak > 0.1, "shift {semitones}: tail peak {peak}");
        }
    }

    #[test]
    fn test_zero_shift_and_empty_input_pass_through() {
        let mut shifter = PhaseVocoderShifter::new();
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(shifter.shift(&input, 44100, 0.0, 24).unwrap(), input);
        assert!(shifter.shift(&[], 44100, 5.0, 24).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_invalid_arguments() {
        let mut shifter = PhaseVocoderShifter::new();
        assert!(matches!(shifter.shift(&[0.0; 8], 0, 1.0, 24), Err(PitchShiftError::ZeroSampleRate)));
        assert!(matches!(
            shifter.shift(&[0.0; 8], 44100, f64::NAN, 24),
            Err(PitchShiftError::InvalidShift(_))
        ));
    }
}
