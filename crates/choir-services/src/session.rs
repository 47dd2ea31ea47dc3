//! Session directory: input discovery, loading, and the full render run

use std::path::{Path, PathBuf};

use choir_core::{ChoirError, RenderSettings, SessionConfig, Timeline};
use thiserror::Error;
use tracing::info;

use crate::harmonizer::{Harmonizer, RenderError, RenderReport};
use crate::pitch_detection::{PitchDetectError, PitchExtractor};
use crate::pitch_shift::PitchShifter;
use crate::wav_io::{read_wav_mono, write_wav_stereo, WavError};

pub const DRY_AUDIO_FILE: &str = "output.wav";
pub const TIMELINE_FILE: &str = "timeline.json";
pub const CONFIG_FILE: &str = "config.json";
pub const OUTPUT_FILE: &str = "harmonized_enhanced.wav";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Missing {name} at {}", .path.display())]
    MissingInput { name: &'static str, path: PathBuf },
    #[error("Failed to load session data: {0}")]
    Data(#[from] ChoirError),
    #[error("Audio file error: {0}")]
    Wav(#[from] WavError),
    #[error("Pitch tracking failed: {0}")]
    PitchDetect(#[from] PitchDetectError),
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),
}

/// Locations of a session's input and output files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub dry_audio: PathBuf,
    pub timeline: PathBuf,
    pub config: PathBuf,
    pub output: PathBuf,
}

impl SessionPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            dry_audio: dir.join(DRY_AUDIO_FILE),
            timeline: dir.join(TIMELINE_FILE),
            config: dir.join(CONFIG_FILE),
            output: dir.join(OUTPUT_FILE),
            dir,
        }
    }

    /// Fail on the first required input that does not exist.
    pub fn check_inputs(&self) -> Result<(), SessionError> {
        let inputs = [
            (DRY_AUDIO_FILE, &self.dry_audio),
            (TIMELINE_FILE, &self.timeline),
            (CONFIG_FILE, &self.config),
        ];
        for (name, path) in inputs {
            if !path.is_file() {
                return Err(SessionError::MissingInput { name, path: path.clone() });
            }
        }
        Ok(())
    }
}

/// Render `harmonized_enhanced.wav` for the session in `dir`.
///
/// All inputs are checked before anything is loaded, and the output file
/// only appears once the whole mix has been rendered.
pub fn run_session<E, S>(
    dir: &Path,
    extractor: &mut E,
    shifter: S,
    settings: RenderSettings,
) -> Result<RenderReport, SessionError>
where
    E: PitchExtractor,
    S: PitchShifter,
{
    let paths = SessionPaths::new(dir);
    paths.check_inputs()?;

    let config = SessionConfig::load(&paths.config)?;
    let timeline = Timeline::load(&paths.timeline)?;
    let (dry, sample_rate) = read_wav_mono(&paths.dry_audio)?;
    info!(
        key = %config.key_name,
        tonic = config.key.name(),
        mix = config.mix,
        segments = timeline.len(),
        timeline_secs = timeline.duration_secs(),
        malformed = timeline.malformed.len(),
        "Session loaded"
    );

    let contour =
        extractor.extract(&dry, sample_rate, settings.hop_size, settings.f_min, settings.f_max)?;

    let mut harmonizer = Harmonizer::new(shifter, settings);
    let (bus, report) = harmonizer.render(&dry, sample_rate, &contour, &timeline, &config)?;

    let (left, right) = bus.into_channels();
    write_wav_stereo(&paths.output, &left, &right, sample_rate)?;
    Ok(report)
}
