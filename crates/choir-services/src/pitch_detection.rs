//! Monophonic pitch tracking (McLeod normalized square difference function)

use std::sync::Arc;

use choir_core::PitchContour;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PitchDetectError {
    #[error("Hop size must be non-zero")]
    ZeroHop,
    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("Invalid frequency range {f_min}..{f_max} Hz")]
    InvalidRange { f_min: f32, f_max: f32 },
}

/// Fundamental-frequency estimator run once over a whole take.
pub trait PitchExtractor {
    /// One estimate per hop, frame `i` centred on sample `i * hop_size`.
    /// Unvoiced frames are `NaN`.
    fn extract(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        hop_size: usize,
        f_min: f32,
        f_max: f32,
    ) -> Result<PitchContour, PitchDetectError>;
}

/// NSDF pitch tracker with key-maximum peak picking
#[derive(Debug, Clone)]
pub struct NsdfPitchExtractor {
    /// Minimum NSDF peak height for a frame to count as voiced
    pub clarity_threshold: f32,
    /// A key maximum within this fraction of the highest one is taken as the period
    pub peak_ratio: f32,
    /// Frames quieter than this RMS are unvoiced
    pub silence_rms: f32,
}

impl Default for NsdfPitchExtractor {
    fn default() -> Self {
        Self {
            clarity_threshold: 0.6,
            peak_ratio: 0.9,
            silence_rms: 1e-3,
        }
    }
}

impl NsdfPitchExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analysis window: at least two periods of the lowest pitch.
    pub fn window_size(sample_rate: u32, f_min: f32) -> usize {
        let two_periods = (2.0 * sample_rate as f32 / f_min).ceil() as usize;
        two_periods.next_power_of_two().max(1024)
    }

    /// Pitch and clarity of a single frame, `None` when unvoiced.
    fn analyze_frame(
        &self,
        frame: &[f32],
        fft: &FrameFft,
        sample_rate: u32,
        f_min: f32,
        f_max: f32,
    ) -> Option<(f32, f32)> {
        let energy: f32 = frame.iter().map(|s| s * s).sum();
        if (energy / frame.len() as f32).sqrt() < self.silence_rms {
            return None;
        }

        let nsdf = fft.nsdf(frame);
        let max_lag = ((sample_rate as f32 / f_min).ceil() as usize).min(nsdf.len() - 2);

        // Lags under the f_max period are searched too, so a voice above
        // f_max is rejected instead of aliasing an octave down.
        let peaks = key_maxima(&nsdf[..=max_lag + 1]);
        let highest = peaks.iter().fold(0.0f32, |acc, &(_, v)| acc.max(v));
        if highest < self.clarity_threshold {
            return None;
        }

        let &(lag, _) = peaks.iter().find(|&&(_, v)| v >= highest * self.peak_ratio)?;
        let (period, clarity) = parabolic_peak(&nsdf, lag);
        let hz = sample_rate as f32 / period;
        (hz >= f_min && hz <= f_max).then_some((hz, clarity))
    }
}

impl PitchExtractor for NsdfPitchExtractor {
    fn extract(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        hop_size: usize,
        f_min: f32,
        f_max: f32,
    ) -> Result<PitchContour, PitchDetectError> {
        if hop_size == 0 {
            return Err(PitchDetectError::ZeroHop);
        }
        if sample_rate == 0 {
            return Err(PitchDetectError::ZeroSampleRate);
        }
        if !(f_min > 0.0 && f_max > f_min) {
            return Err(PitchDetectError::InvalidRange { f_min, f_max });
        }

        let window = Self::window_size(sample_rate, f_min);
        let fft = FrameFft::new(window);
        let num_frames = 1 + samples.len() / hop_size;
        let half = window / 2;

        let mut contour = PitchContour {
            frequencies: Vec::with_capacity(num_frames),
            confidence: Vec::with_capacity(num_frames),
            voiced: Vec::with_capacity(num_frames),
            hop_size,
            sample_rate,
        };

        let mut frame = vec![0.0f32; window];
        for i in 0..num_frames {
            // Centred frame, zero-padded past either end
            let center = i * hop_size;
            for (j, slot) in frame.iter_mut().enumerate() {
                let idx = (center + j).checked_sub(half);
                *slot = idx.and_then(|k| samples.get(k)).copied().unwrap_or(0.0);
            }

            match self.analyze_frame(&frame, &fft, sample_rate, f_min, f_max) {
                Some((hz, clarity)) => {
                    contour.frequencies.push(hz);
                    contour.confidence.push(clarity);
                    contour.voiced.push(true);
                }
                None => {
                    contour.frequencies.push(f32::NAN);
                    contour.confidence.push(0.0);
                    contour.voiced.push(false);
                }
            }
        }

        let voiced = contour.voiced.iter().filter(|v| **v).count();
        debug!(frames = num_frames, voiced, window, "Pitch contour extracted");
        Ok(contour)
    }
}

/// FFT plans for autocorrelation of one frame size
struct FrameFft {
    size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl FrameFft {
    fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            size,
            forward: planner.plan_fft_forward(size * 2),
            inverse: planner.plan_fft_inverse(size * 2),
        }
    }

    /// Normalized square difference function, `n(τ) = 2 r(τ) / m(τ)`.
    fn nsdf(&self, frame: &[f32]) -> Vec<f32> {
        let n = self.size;
        let mut buf: Vec<Complex<f32>> = frame
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(n))
            .collect();

        self.forward.process(&mut buf);
        for c in buf.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        self.inverse.process(&mut buf);

        let scale = 1.0 / (2 * n) as f32;
        let mut m: f32 = 2.0 * frame.iter().map(|s| s * s).sum::<f32>();
        let mut out = Vec::with_capacity(n);
        for tau in 0..n {
            if tau > 0 {
                m -= frame[tau - 1] * frame[tau - 1] + frame[n - tau] * frame[n - tau];
            }
            let r = buf[tau].re * scale;
            out.push(if m > 1e-9 { 2.0 * r / m } else { 0.0 });
        }
        out
    }
}

/// Highest point between each positive-going and the next negative-going zero crossing.
fn key_maxima(nsdf: &[f32]) -> Vec<(usize, f32)> {
    let mut peaks = Vec::new();
    let mut tau = 1;

    // Skip the initial lobe around lag 0
    while tau < nsdf.len() && nsdf[tau] > 0.0 {
        tau += 1;
    }

    while tau < nsdf.len() {
        while tau < nsdf.len() && nsdf[tau] <= 0.0 {
            tau += 1;
        }
        let mut best: Option<(usize, f32)> = None;
        while tau < nsdf.len() && nsdf[tau] > 0.0 {
            if best.is_none_or(|(_, v)| nsdf[tau] > v) {
                best = Some((tau, nsdf[tau]));
            }
            tau += 1;
        }
        // A lobe cut off by the end of the search range is not a maximum
        if tau < nsdf.len() {
            peaks.extend(best);
        }
    }
    peaks
}

/// Refine a peak position with a parabola through its neighbours.
fn parabolic_peak(values: &[f32], idx: usize) -> (f32, f32) {
    if idx == 0 || idx + 1 >= values.len() {
        return (idx as f32, values[idx]);
    }
    let (a, b, c) = (values[idx - 1], values[idx], values[idx + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < f32::EPSILON {
        return (idx as f32, b);
    }
    let shift = 0.5 * (a - c) / denom;
    (idx as f32 + shift, b - 0.25 * (a - c) * shift)
}
