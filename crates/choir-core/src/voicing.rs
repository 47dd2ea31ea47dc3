//! Spread voicing of a chord around the sung melody

/// Lowest pitch the bass voice may sit on (C2).
pub const BASS_FLOOR: f64 = 36.0;

/// Harmony tones closer than this to the melody are dropped.
pub const UNISON_GUARD: f64 = 0.5;

/// Octave of the melody, i.e. the reference pitch rounded down to a multiple of 12.
pub fn octave_anchor(reference_pitch: f64) -> f64 {
    (reference_pitch / 12.0).floor() * 12.0
}

/// Build the target pitches for one segment.
///
/// The stack is:
/// * a bass voice on the chord root, one octave under the melody's octave
///   (raised an octave if it would sit below [`BASS_FLOOR`])
/// * every other chord tone in whichever octave lies closest to the melody,
///   unless it would double the melody itself
/// * an "air" voice on the third chord tone one octave above the melody's octave
///
/// Result is deduplicated and sorted ascending. Empty when there are no
/// chord tones or the reference pitch is not finite.
pub fn build_voicing(reference_pitch: f64, chord_pcs: &[u8]) -> Vec<f64> {
    if chord_pcs.is_empty() || !reference_pitch.is_finite() {
        return Vec::new();
    }

    let anchor = octave_anchor(reference_pitch);
    let root = chord_pcs[0] as f64;
    let mut voicing = Vec::with_capacity(chord_pcs.len() + 1);

    let mut bass = root + anchor - 12.0;
    if bass < BASS_FLOOR {
        bass += 12.0;
    }
    voicing.push(bass);

    for &pc in &chord_pcs[1..] {
        let pc = pc as f64;
        let candidates = [pc + anchor, pc + anchor - 12.0, pc + anchor + 12.0];
        let best = candidates
            .into_iter()
            .fold(candidates[0], |best, cand| {
                if (cand - reference_pitch).abs() < (best - reference_pitch).abs() {
                    cand
                } else {
                    best
                }
            });

        if (best - reference_pitch).abs() > UNISON_GUARD {
            voicing.push(best);
        }
    }

    let air = chord_pcs[2 % chord_pcs.len()] as f64 + anchor + 12.0;
    voicing.push(air);

    voicing.sort_by(f64::total_cmp);
    voicing.dedup();
    voicing
}
