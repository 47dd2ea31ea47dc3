//! choir-core: Music theory and mix primitives for vocal harmony rendering

pub mod chord;
pub mod config;
mod error;
pub mod key;
pub mod pan;
pub mod pitch;
pub mod timeline;
pub mod voicing;

pub use chord::{chord_for_key, chord_pitch_classes, ChordQuality, Degree, MAJOR_SCALE};
pub use config::{RenderSettings, SessionConfig, DEFAULT_MIX};
pub use error::{ChoirError, Result};
pub use key::{key_to_semitone, normalize_key_name, Key};
pub use pan::{extension_gain, pan_gains, stereo_pan, voice_pan, DEFAULT_STEREO_WIDTH};
pub use pitch::{hz_to_midi, median, midi_to_hz, PitchContour};
pub use timeline::{compress_segments, default_timeline, write_timeline, ChordSegment, Timeline};
pub use voicing::{build_voicing, octave_anchor, BASS_FLOOR, UNISON_GUARD};
