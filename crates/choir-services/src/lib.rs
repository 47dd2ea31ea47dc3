//! choir-services: Pitch tracking, pitch shifting, mixing and session rendering

pub mod harmonizer;
pub mod mix_bus;
pub mod pitch_detection;
pub mod pitch_shift;
pub mod session;
pub mod wav_io;

pub use harmonizer::{Harmonizer, RenderError, RenderReport, SegmentOutcome, SkipReason};
pub use mix_bus::{MasterResult, MixBus};
pub use pitch_detection::{NsdfPitchExtractor, PitchDetectError, PitchExtractor};
pub use pitch_shift::{fft_size_for_resolution, PhaseVocoderShifter, PitchShiftError, PitchShifter};
pub use session::{run_session, SessionError, SessionPaths, OUTPUT_FILE};
pub use wav_io::{read_wav, read_wav_mono, to_mono, write_wav_stereo, AudioData, WavError};
