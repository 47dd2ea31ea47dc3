//! Stereo mix bus: dry + harmony accumulation and peak-safe mastering

use choir_core::stereo_pan;
use tracing::{debug, info};

/// Outcome of [`MixBus::master`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterResult {
    /// Peak absolute sample before mastering
    pub peak: f32,
    /// Gain applied to both channels, `None` when the mix was left alone
    pub gain: Option<f32>,
}

/// Left/right accumulation buffers spanning the whole take.
#[derive(Debug, Clone, Default)]
pub struct MixBus {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl MixBus {
    pub fn new(len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn into_channels(self) -> (Vec<f32>, Vec<f32>) {
        (self.left, self.right)
    }

    /// Add the original vocal, centred, across the whole bus.
    pub fn add_dry(&mut self, dry: &[f32], gain: f32) {
        self.add_panned(0, dry, 0.0, gain);
    }

    /// Spatialize `mono` at `pan` and add it at `gain`, starting at sample `offset`.
    pub fn add_panned(&mut self, offset: usize, mono: &[f32], pan: f32, gain: f32) {
        let (left, right) = stereo_pan(mono, pan);
        self.add_stereo(offset, &left, &right, gain);
    }

    /// Sum a stereo pair into the bus at `gain`, starting at sample `offset`.
    ///
    /// Samples that would land past the end of the bus are dropped.
    pub fn add_stereo(&mut self, offset: usize, left: &[f32], right: &[f32], gain: f32) {
        let len = left.len().min(right.len());
        let end = (offset + len).min(self.left.len());
        if offset >= end {
            return;
        }

        let bus = self.left[offset..end].iter_mut().zip(self.right[offset..end].iter_mut());
        for ((l, r), (&sl, &sr)) in bus.zip(left.iter().zip(right)) {
            *l += sl * gain;
            *r += sr * gain;
        }
    }

    /// Largest absolute sample across both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Rescale so the peak sits at `target` when it exceeds `threshold`.
    ///
    /// A mix at or below `threshold` is not touched.
    pub fn master(&mut self, threshold: f32, target: f32) -> MasterResult {
        let peak = self.peak();
        if peak <= threshold {
            debug!(peak, "Mix under ceiling, no gain applied");
            return MasterResult { peak, gain: None };
        }

        let gain = target / peak;
        for sample in self.left.iter_mut().chain(self.right.iter_mut()) {
            *sample *= gain;
        }
        info!(peak, gain, "Normalized master");
        MasterResult { peak, gain: Some(gain) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_1_SQRT_2;

    #[test]
    fn test_dry_is_centre_panned() {
        let mut bus = MixBus::new(2);
        bus.add_dry(&[1.0, -0.5], 0.8);
        assert_abs_diff_eq!(bus.left()[0], 0.8 * FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_abs_diff_eq!(bus.right()[1], -0.4 * FRAC_1_SQRT_2, epsilon = 1e-6);
    }

    #[test]
    fn test_voices_sum_into_their_range_only() {
        let mut bus = MixBus::new(6);
        bus.add_panned(2, &[1.0, 1.0], -1.0, 0.5);
        bus.add_panned(3, &[1.0, 1.0], -1.0, 0.5);
        assert_eq!(bus.left(), &[0.0, 0.0, 0.5, 1.0, 0.5, 0.0]);
        assert!(bus.right().iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn test_writes_past_end_are_clipped() {
        let mut bus = MixBus::new(3);
        bus.add_panned(2, &[1.0, 1.0, 1.0], 1.0, 1.0);
        bus.add_panned(10, &[1.0], 1.0, 1.0);
        assert_abs_diff_eq!(bus.right()[2], 1.0, epsilon = 1e-6);
        assert_eq!(bus.len(), 3);
    }

    #[test]
    fn test_quiet_mix_is_bit_identical_after_master() {
        let mut bus = MixBus::new(4);
        bus.add_panned(0, &[0.3, -0.95, 0.2, 0.1], -1.0, 1.0);
        let before = bus.clone();

        let result = bus.master(0.95, 0.944);
        assert_eq!(result.gain, None);
        assert_eq!(bus.left(), before.left());
        assert_eq!(bus.right(), before.right());
    }

    #[test]
    fn test_hot_mix_lands_on_target_peak() {
        let mut bus = MixBus::new(3);
        bus.add_panned(0, &[1.5, -2.0, 0.5], 0.3, 1.0);
        bus.add_panned(0, &[0.5, 0.5, 0.5], -0.7, 1.0);

        let result = bus.master(0.95, 0.944);
        assert!(result.peak > 0.95);
        assert!(result.gain.is_some());
        assert_abs_diff_eq!(bus.peak(), 0.944, epsilon = 1e-6);
    }
}
