//! Chord timeline: which scale degree is sung over which span of the take

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{ChoirError, Result};

/// Label a chord detector emits when it sees no chord.
pub const NO_CHORD: &str = "NONE";
/// Adjacent runs of the same degree closer than this (seconds) are merged.
pub const MERGE_GAP_SECS: f64 = 0.15;
/// Compressed segments shorter than this (seconds) are dropped.
pub const MIN_SEGMENT_SECS: f64 = 0.2;

/// One chord held from `start` to `end` seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSegment {
    pub start: f64,
    pub end: f64,
    pub degree: String,
}

impl ChordSegment {
    pub fn new(start: f64, end: f64, degree: impl Into<String>) -> Self {
        Self { start, end, degree: degree.into() }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Zero or negative length
    pub fn is_degenerate(&self) -> bool {
        !(self.end > self.start)
    }

    /// Sample range `[s0, s1)` covered by this segment, clipped to `total` samples.
    pub fn sample_range(&self, sample_rate: u32, total: usize) -> std::ops::Range<usize> {
        let to_index = |secs: f64| (secs * sample_rate as f64).round().max(0.0) as usize;
        let s0 = to_index(self.start).min(total);
        let s1 = to_index(self.end).min(total);
        s0..s1.max(s0)
    }
}

/// Ordered chord segments loaded from `timeline.json`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub segments: Vec<ChordSegment>,
    /// Positions of entries that were missing fields or had the wrong types
    pub malformed: Vec<usize>,
}

impl Timeline {
    pub fn new(segments: Vec<ChordSegment>) -> Self {
        Self { segments, malformed: Vec::new() }
    }

    /// Parse a timeline document. Entries lacking a usable `start`, `end` or
    /// `degree` are recorded in [`Timeline::malformed`] and left out.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(entries) = value else {
            return Err(ChoirError::TimelineNotArray);
        };

        let mut timeline = Timeline::default();
        for (idx, entry) in entries.iter().enumerate() {
            match parse_segment(entry) {
                Some(segment) => timeline.segments.push(segment),
                None => {
                    warn!(entry = idx, "Skipping malformed timeline entry");
                    timeline.malformed.push(idx);
                }
            }
        }
        Ok(timeline)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End of the last segment in seconds
    pub fn duration_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.end).fold(0.0, f64::max)
    }
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn as_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_segment(entry: &Value) -> Option<ChordSegment> {
    let start = as_seconds(entry.get("start")?)?;
    let end = as_seconds(entry.get("end")?)?;
    let degree = match entry.get("degree")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(ChordSegment { start, end, degree })
}

fn round_ms(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

/// Collapse per-frame chord detections `(start, end, degree)` into a timeline.
///
/// `NONE` runs are dropped, same-degree runs separated by less than
/// [`MERGE_GAP_SECS`] are joined, and anything shorter than
/// [`MIN_SEGMENT_SECS`] after merging is discarded.
pub fn compress_segments(raw: &[(f64, f64, String)]) -> Vec<ChordSegment> {
    let mut merged: Vec<ChordSegment> = Vec::new();

    for (start, end, degree) in raw {
        if degree == NO_CHORD {
            continue;
        }
        if let Some(last) = merged.last_mut() {
            if last.degree == *degree && (start - last.end).abs() < MERGE_GAP_SECS {
                last.end = *end;
                continue;
            }
        }
        merged.push(ChordSegment::new(round_ms(*start), round_ms(*end), degree.clone()));
    }

    merged.retain(|seg| seg.duration() >= MIN_SEGMENT_SECS);
    merged
}

/// Timeline used when a detector produced nothing usable.
pub fn default_timeline() -> Vec<ChordSegment> {
    vec![ChordSegment::new(0.0, 0.5, "I")]
}

/// Write segments as pretty-printed `timeline.json`.
pub fn write_timeline(path: &Path, segments: &[ChordSegment]) -> Result<()> {
    let text = serde_json::to_string_pretty(segments)?;
    std::fs::write(path, text)?;
    Ok(())
}
