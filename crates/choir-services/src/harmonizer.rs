//! Harmony rendering: walks the chord timeline, voices each segment around
//! the sung melody and mixes the shifted voices onto the stereo bus.

use choir_core::{
    build_voicing, chord_for_key, extension_gain, voice_pan, ChordSegment, Degree, PitchContour,
    RenderSettings, SessionConfig, Timeline,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::mix_bus::MixBus;
use crate::pitch_shift::{PitchShiftError, PitchShifter};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Pitch shift failed: {0}")]
    Shift(#[from] PitchShiftError),
}

/// Why a segment produced no harmony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `end <= start`
    Degenerate,
    /// Lies entirely past the end of the audio
    EmptyRange,
    /// No voiced pitch estimate inside the segment
    Unvoiced,
    /// Voicing came back empty
    NoVoicing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    Rendered { voices_rendered: usize, voices_skipped: usize },
    Skipped(SkipReason),
}

/// Summary of one render pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub segments_rendered: usize,
    pub segments_skipped: usize,
    /// Timeline entries dropped at load time
    pub malformed_segments: usize,
    pub voices_rendered: usize,
    /// Voices too close to the lead to be worth shifting
    pub voices_skipped: usize,
    /// Bus peak before mastering
    pub peak: f32,
    /// Master gain, `None` when the mix needed no normalization
    pub applied_gain: Option<f32>,
}

impl RenderReport {
    fn record(&mut self, outcome: SegmentOutcome) {
        match outcome {
            SegmentOutcome::Rendered { voices_rendered, voices_skipped } => {
                self.segments_rendered += 1;
                self.voices_rendered += voices_rendered;
                self.voices_skipped += voices_skipped;
            }
            SegmentOutcome::Skipped(_) => self.segments_skipped += 1,
        }
    }
}

/// Renders harmony voices with a pluggable pitch shifter.
pub struct Harmonizer<S: PitchShifter> {
    shifter: S,
    settings: RenderSettings,
}

impl<S: PitchShifter> Harmonizer<S> {
    pub fn new(shifter: S, settings: RenderSettings) -> Self {
        Self { shifter, settings }
    }

    pub fn into_shifter(self) -> S {
        self.shifter
    }

    /// Shift the segment audio from `reference` to `target` (MIDI pitch).
    ///
    /// Returns `None` without calling the shifter when the two are closer
    /// than `min_shift` semitones.
    pub fn render_voice(
        &mut self,
        segment_audio: &[f32],
        sample_rate: u32,
        reference: f64,
        target: f64,
    ) -> Result<Option<Vec<f32>>, RenderError> {
        let shift = target - reference;
        if shift.abs() < self.settings.min_shift {
            debug!(target, shift, "Voice too close to lead, skipped");
            return Ok(None);
        }

        let shifted =
            self.shifter
                .shift(segment_audio, sample_rate, shift, self.settings.bins_per_octave)?;
        Ok(Some(shifted))
    }

    /// Voice one segment and mix its harmony onto `bus`.
    pub fn process_segment(
        &mut self,
        segment: &ChordSegment,
        dry: &[f32],
        sample_rate: u32,
        contour: &PitchContour,
        config: &SessionConfig,
        bus: &mut MixBus,
    ) -> Result<SegmentOutcome, RenderError> {
        if segment.is_degenerate() {
            return Ok(SegmentOutcome::Skipped(SkipReason::Degenerate));
        }

        let range = segment.sample_range(sample_rate, dry.len());
        if range.is_empty() {
            return Ok(SegmentOutcome::Skipped(SkipReason::EmptyRange));
        }

        let Some(reference) = contour.reference_pitch(segment.start, segment.end) else {
            return Ok(SegmentOutcome::Skipped(SkipReason::Unvoiced));
        };

        let chord = chord_for_key(config.key, &segment.degree);
        let voicing = build_voicing(reference, &chord);
        if voicing.is_empty() {
            return Ok(SegmentOutcome::Skipped(SkipReason::NoVoicing));
        }

        debug!(
            start = segment.start,
            end = segment.end,
            degree = %segment.degree,
            numeral = Degree::parse(&segment.degree).map_or("tonic triad", |d| d.name()),
            reference,
            voices = ?voicing,
            "Voicing segment"
        );

        let audio = &dry[range.clone()];
        let (mut rendered, mut skipped) = (0, 0);
        for (index, &target) in voicing.iter().enumerate() {
            let Some(voice) = self.render_voice(audio, sample_rate, reference, target)? else {
                skipped += 1;
                continue;
            };

            let pan = voice_pan(index, voicing.len(), self.settings.stereo_width);
            let gain = self.voice_gain(target - reference, config.mix);
            bus.add_panned(range.start, &voice, pan, gain);
            rendered += 1;
        }

        Ok(SegmentOutcome::Rendered { voices_rendered: rendered, voices_skipped: skipped })
    }

    /// Wet gain for a voice shifted by `shift` semitones.
    fn voice_gain(&self, shift: f64, mix: f32) -> f32 {
        mix * extension_gain(
            shift,
            self.settings.extension_threshold,
            self.settings.extension_gain,
        )
    }

    /// Mix the dry vocal with harmony for every timeline segment, then master.
    pub fn render(
        &mut self,
        dry: &[f32],
        sample_rate: u32,
        contour: &PitchContour,
        timeline: &Timeline,
        config: &SessionConfig,
    ) -> Result<(MixBus, RenderReport), RenderError> {
        let mut bus = MixBus::new(dry.len());
        bus.add_dry(dry, self.settings.dry_gain);

        let mut report = RenderReport {
            malformed_segments: timeline.malformed.len(),
            ..RenderReport::default()
        };

        for segment in &timeline.segments {
            let outcome =
                self.process_segment(segment, dry, sample_rate, contour, config, &mut bus)?;
            if let SegmentOutcome::Skipped(reason) = outcome {
                debug!(start = segment.start, end = segment.end, ?reason, "Segment skipped");
            }
            report.record(outcome);
        }

        let master = bus.master(self.settings.peak_threshold, self.settings.peak_target);
        report.peak = master.peak;
        report.applied_gain = master.gain;

        info!(
            segments = report.segments_rendered,
            skipped = report.segments_skipped,
            voices = report.voices_rendered,
            "Harmony rendered"
        );
        Ok((bus, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use choir_core::{midi_to_hz, Key};

    const SR: u32 = 8000;
    const HOP: usize = 256;

    /// Returns its input unchanged and remembers every requested shift.
    #[derive(Default)]
    struct RecordingShifter {
        shifts: Vec<f64>,
        lengths: Vec<usize>,
    }

    impl PitchShifter for RecordingShifter {
        fn shift(
            &mut self,
            samples: &[f32],
            _sample_rate: u32,
            semitones: f64,
            bins_per_octave: u32,
        ) -> Result<Vec<f32>, PitchShiftError> {
            assert_eq!(bins_per_octave, 24);
            self.shifts.push(semitones);
            self.lengths.push(samples.len());
            Ok(samples.to_vec())
        }
    }

    struct FailingShifter;

    impl PitchShifter for FailingShifter {
        fn shift(
            &mut self,
            _samples: &[f32],
            _sample_rate: u32,
            semitones: f64,
            _bins_per_octave: u32,
        ) -> Result<Vec<f32>, PitchShiftError> {
            Err(PitchShiftError::InvalidShift(semitones))
        }
    }

    fn harmonizer() -> Harmonizer<RecordingShifter> {
        Harmonizer::new(RecordingShifter::default(), RenderSettings::default())
    }

    fn steady_contour(midi: f64, secs: f64) -> PitchContour {
        let frames = 1 + (secs * SR as f64) as usize / HOP;
        PitchContour::new(vec![midi_to_hz(midi) as f32; frames], HOP, SR)
    }

    fn tone(secs: f64) -> Vec<f32> {
        vec![0.1; (secs * SR as f64) as usize]
    }

    fn config_c() -> SessionConfig {
        SessionConfig { key_name: "C".into(), key: Key::C, mix: 0.7 }
    }

    #[test]
    fn test_middle_c_tonic_scenario() {
        let dry = tone(1.0);
        let contour = steady_contour(60.0, 1.0);
        let timeline = Timeline::new(vec![ChordSegment::new(0.0, 1.0, "I")]);
        let mut h = harmonizer();

        let (_, report) = h.render(&dry, SR, &contour, &timeline, &config_c()).unwrap();
        assert_eq!(report.segments_rendered, 1);
        assert_eq!(report.voices_skipped, 0);
        assert_eq!(report.voices_rendered, 6);

        let shifter = h.into_shifter();
        let expected = [-12.0, -5.0, -1.0, 2.0, 4.0, 19.0];
        assert_eq!(shifter.shifts.len(), expected.len());
        for (got, want) in shifter.shifts.iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-4);
        }
        assert!(shifter.lengths.iter().all(|&len| len == dry.len()));
    }

    #[test]
    fn test_voice_near_lead_is_not_shifted() {
        let mut h = harmonizer();
        let audio = tone(0.1);

        assert!(h.render_voice(&audio, SR, 60.0, 60.15).unwrap().is_none());
        assert!(h.render_voice(&audio, SR, 60.0, 59.81).unwrap().is_none());
        let shifted = h.render_voice(&audio, SR, 60.0, 60.25).unwrap();
        assert_eq!(shifted.map(|v| v.len()), Some(audio.len()));

        let shifter = h.into_shifter();
        assert_eq!(shifter.shifts.len(), 1);
        assert_abs_diff_eq!(shifter.shifts[0], 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_unvoiced_segment_leaves_only_dry() {
        let dry = tone(1.0);
        let mut contour = steady_contour(60.0, 1.0);
        contour.frequencies.iter_mut().for_each(|f| *f = f32::NAN);
        let timeline = Timeline::new(vec![ChordSegment::new(0.0, 1.0, "IV")]);

        let mut h = harmonizer();
        let (bus, report) = h.render(&dry, SR, &contour, &timeline, &config_c()).unwrap();
        assert_eq!(report.segments_skipped, 1);
        assert!(h.into_shifter().shifts.is_empty());

        let mut dry_only = MixBus::new(dry.len());
        dry_only.add_dry(&dry, 0.80);
        assert_eq!(bus.left(), dry_only.left());
        assert_eq!(bus.right(), dry_only.right());
    }

    #[test]
    fn test_harmony_stays_inside_segment_range() {
        let dry = tone(1.0);
        let contour = steady_contour(64.0, 1.0);
        let timeline = Timeline::new(vec![ChordSegment::new(0.25, 0.5, "V")]);

        let mut h = harmonizer();
        let (bus, _) = h.render(&dry, SR, &contour, &timeline, &config_c()).unwrap();

        let mut dry_only = MixBus::new(dry.len());
        dry_only.add_dry(&dry, 0.80);
        let (s0, s1) = (2000, 4000);
        assert_eq!(&bus.left()[..s0], &dry_only.left()[..s0]);
        assert_eq!(&bus.left()[s1..], &dry_only.left()[s1..]);
        assert!(bus.left()[s0] > dry_only.left()[s0]);
        assert!(h.into_shifter().lengths.iter().all(|&len| len == s1 - s0));
    }

    #[test]
    fn test_malformed_entry_is_ignored() {
        let timeline = Timeline::from_json(
            r#"[{"start": 0.0, "end": 0.5, "degree": "I"}, {"start": 0.5, "end": 1.0}]"#,
        )
        .unwrap();
        let dry = tone(1.0);
        let contour = steady_contour(62.0, 1.0);

        let mut h = harmonizer();
        let (_, report) = h.render(&dry, SR, &contour, &timeline, &config_c()).unwrap();
        assert_eq!(report.malformed_segments, 1);
        assert_eq!(report.segments_rendered, 1);
        assert_eq!(report.segments_skipped, 0);
    }

    #[test]
    fn test_degenerate_and_out_of_range_segments_skip() {
        let dry = tone(1.0);
        let contour = steady_contour(60.0, 1.0);
        let mut bus = MixBus::new(dry.len());
        let mut h = harmonizer();
        let config = config_c();

        let backwards = ChordSegment::new(0.6, 0.4, "I");
        let past_end = ChordSegment::new(2.0, 3.0, "I");
        for (segment, reason) in
            [(backwards, SkipReason::Degenerate), (past_end, SkipReason::EmptyRange)]
        {
            let outcome =
                h.process_segment(&segment, &dry, SR, &contour, &config, &mut bus).unwrap();
            assert_eq!(outcome, SegmentOutcome::Skipped(reason));
        }
        assert_eq!(bus.peak(), 0.0);
    }

    #[test]
    fn test_wide_shifts_are_attenuated() {
        let h = harmonizer();
        assert_abs_diff_eq!(h.voice_gain(7.0, 0.7), 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(h.voice_gain(-12.0, 0.7), 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(h.voice_gain(19.0, 0.7), 0.56, epsilon = 1e-6);
        assert_abs_diff_eq!(h.voice_gain(-12.5, 0.5), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_loud_mix_is_normalized() {
        let dry = vec![0.9; SR as usize];
        let contour = steady_contour(60.0, 1.0);
        let timeline = Timeline::new(vec![ChordSegment::new(0.0, 1.0, "I")]);

        let mut h = harmonizer();
        let (bus, report) = h.render(&dry, SR, &contour, &timeline, &config_c()).unwrap();
        assert!(report.peak > 0.95);
        assert!(report.applied_gain.is_some());
        assert_abs_diff_eq!(bus.peak(), 0.944, epsilon = 1e-5);
    }

    #[test]
    fn test_shifter_failure_aborts_render() {
        let dry = tone(0.5);
        let contour = steady_contour(60.0, 0.5);
        let timeline = Timeline::new(vec![ChordSegment::new(0.0, 0.5, "I")]);

        let mut h = Harmonizer::new(FailingShifter, RenderSettings::default());
        let result = h.render(&dry, SR, &contour, &timeline, &config_c());
        assert!(matches!(result, Err(RenderError::Shift(PitchShiftError::InvalidShift(_)))));
    }
}
