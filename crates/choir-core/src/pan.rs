//! Constant-power stereo panning and per-voice placement

use std::f32::consts::FRAC_PI_4;

/// Default spread of the harmony stack (0.0 = mono, 1.0 = hard left/right).
pub const DEFAULT_STEREO_WIDTH: f32 = 0.85;

/// Left/right gains for pan position `pan` (-1.0 = left, 1.0 = right).
///
/// Sine/cosine law: `left² + right² == 1` across the whole range, so centre
/// sits at -3 dB per side instead of the -6 dB of a linear crossfade.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Split a mono buffer into a panned stereo pair.
pub fn stereo_pan(mono: &[f32], pan: f32) -> (Vec<f32>, Vec<f32>) {
    let (gain_l, gain_r) = pan_gains(pan);
    let left = mono.iter().map(|s| s * gain_l).collect();
    let right = mono.iter().map(|s| s * gain_r).collect();
    (left, right)
}

/// Pan position for voice `index` out of `voice_count` sorted voices.
///
/// The bass (index 0) stays centred; the rest alternate left (odd) and
/// right (even), moving further out the higher they sit in the stack.
pub fn voice_pan(index: usize, voice_count: usize, stereo_width: f32) -> f32 {
    if index == 0 || voice_count == 0 {
        return 0.0;
    }
    let side = if index % 2 != 0 { -1.0 } else { 1.0 };
    let spread = (index as f32 / voice_count as f32) * stereo_width;
    side * spread
}

/// Extra attenuation for voices shifted further than `threshold` semitones.
pub fn extension_gain(shift_semitones: f64, threshold: f64, attenuation: f32) -> f32 {
    if shift_semitones.abs() > threshold {
        attenuation
    } else {
        1.0
    }
}
