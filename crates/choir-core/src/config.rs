//! Session configuration and render settings

use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::error::{ChoirError, Result};
use crate::key::{key_to_semitone, normalize_key_name, Key};
use crate::pan::DEFAULT_STEREO_WIDTH;

/// Default level of the harmony voices relative to full scale
pub const DEFAULT_MIX: f32 = 0.70;
pub const DEFAULT_KEY: &str = "C";

/// Per-session settings read from `config.json`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Key name as written by the user (normalized accidentals)
    pub key_name: String,
    pub key: Key,
    /// Wet (harmony) gain
    pub mix: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_name: DEFAULT_KEY.to_string(),
            key: Key::C,
            mix: DEFAULT_MIX,
        }
    }
}

impl SessionConfig {
    /// Parse `config.json`. Missing fields take their defaults; `mix` may be
    /// a number or a numeric string. Fields the engine does not use
    /// (`scale`, `voices`) are ignored.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(map) = value else {
            return Err(ChoirError::ConfigNotObject);
        };

        let key_name = match map.get("key") {
            Some(Value::String(s)) => normalize_key_name(s),
            Some(Value::Null) | None => DEFAULT_KEY.to_string(),
            Some(other) => normalize_key_name(&other.to_string()),
        };
        let key = Key::from_name(&key_name);
        if key_to_semitone(&key_name).is_none() {
            warn!(key = %key_name, "Unrecognized key, using C");
        }

        let mix = match map.get("mix") {
            None | Some(Value::Null) => DEFAULT_MIX,
            Some(v) => parse_mix(v).unwrap_or_else(|| {
                warn!(mix = %v, "Invalid mix value, using default");
                DEFAULT_MIX
            }),
        };

        Ok(Self { key_name, key, mix })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

fn parse_mix(value: &Value) -> Option<f32> {
    let mix = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    mix.is_finite().then_some(mix as f32)
}

/// Fixed engine constants. `Default` gives the studio settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Gain of the original vocal on the mix bus
    pub dry_gain: f32,
    /// How far the harmony stack spreads (0 = mono, 1 = hard L/R)
    pub stereo_width: f32,
    /// Voices closer than this (semitones) to the lead are not rendered
    pub min_shift: f64,
    /// Voices shifted further than this (semitones) get `extension_gain`
    pub extension_threshold: f64,
    pub extension_gain: f32,
    /// Peak above which the master is rescaled
    pub peak_threshold: f32,
    /// Peak after rescaling (~ -0.5 dBFS)
    pub peak_target: f32,
    /// Pitch tracker frame hop in samples
    pub hop_size: usize,
    pub f_min: f32,
    pub f_max: f32,
    /// Frequency resolution requested from the pitch shifter
    pub bins_per_octave: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            dry_gain: 0.80,
            stereo_width: DEFAULT_STEREO_WIDTH,
            min_shift: 0.2,
            extension_threshold: 12.0,
            extension_gain: 0.8,
            peak_threshold: 0.95,
            peak_target: 0.944,
            hop_size: 512,
            f_min: 65.0,
            f_max: 1046.0,
            bins_per_octave: 24,
        }
    }
}
