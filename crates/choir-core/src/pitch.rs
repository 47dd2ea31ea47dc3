//! Pitch units and the detected melody contour

/// Reference tuning (A4).
pub const A4_HZ: f64 = 440.0;
/// MIDI note number of A4.
pub const A4_MIDI: f64 = 69.0;

/// Convert a frequency to continuous MIDI pitch. Non-positive input maps to 0.
pub fn hz_to_midi(hz: f64) -> f64 {
    if hz <= 0.0 {
        return 0.0;
    }
    A4_MIDI + 12.0 * (hz / A4_HZ).log2()
}

pub fn midi_to_hz(midi: f64) -> f64 {
    A4_HZ * 2f64.powf((midi - A4_MIDI) / 12.0)
}

/// Median of a set of values; the mean of the two middle values for even counts.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Frame-wise fundamental frequency estimates over a whole recording.
///
/// Unvoiced frames hold `NaN` in `frequencies`.
#[derive(Debug, Clone, Default)]
pub struct PitchContour {
    pub frequencies: Vec<f32>,
    /// Detector confidence per frame (0..1)
    pub confidence: Vec<f32>,
    pub voiced: Vec<bool>,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl PitchContour {
    pub fn new(frequencies: Vec<f32>, hop_size: usize, sample_rate: u32) -> Self {
        let voiced = frequencies.iter().map(|f| f.is_finite()).collect();
        let confidence = frequencies
            .iter()
            .map(|f| if f.is_finite() { 1.0 } else { 0.0 })
            .collect();
        Self { frequencies, confidence, voiced, hop_size, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Time in seconds of frame `index`
    pub fn frame_time(&self, index: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        index as f64 * self.hop_size as f64 / self.sample_rate as f64
    }

    /// Finite, positive estimates whose frame time falls in `[start, end)`, as MIDI pitch.
    pub fn voiced_pitches_in(&self, start: f64, end: f64) -> Vec<f64> {
        self.frequencies
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let t = self.frame_time(*i);
                t >= start && t < end
            })
            .map(|(_, &hz)| hz as f64)
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .map(hz_to_midi)
            .collect()
    }

    /// Median MIDI pitch of the voiced frames in `[start, end)`.
    ///
    /// `None` means the span is unvoiced.
    pub fn reference_pitch(&self, start: f64, end: f64) -> Option<f64> {
        let mut pitches = self.voiced_pitches_in(start, end);
        median(&mut pitches)
    }
}
