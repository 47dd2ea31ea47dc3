//! Musical key names and their semitone classes

/// A key reduced to its tonic semitone class (0 = C, 11 = B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Key(u8);

impl Key {
    pub const C: Key = Key(0);

    /// Build a key from any semitone value, wrapping into 0..12.
    pub fn from_semitone(semitone: i32) -> Self {
        Self(semitone.rem_euclid(12) as u8)
    }

    /// Parse a key name. Unrecognized names fall back to C.
    pub fn from_name(name: &str) -> Self {
        Self(key_to_semitone(name).unwrap_or(0))
    }

    pub fn semitone(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "C",
            1 => "C#",
            2 => "D",
            3 => "Eb",
            4 => "E",
            5 => "F",
            6 => "F#",
            7 => "G",
            8 => "Ab",
            9 => "A",
            10 => "Bb",
            _ => "B",
        }
    }
}

/// Replace unicode accidentals and strip surrounding whitespace.
pub fn normalize_key_name(name: &str) -> String {
    name.trim().replace('♯', "#").replace('♭', "b")
}

/// Enharmonic lookup. Returns `None` for names outside the table.
pub fn key_to_semitone(name: &str) -> Option<u8> {
    let semitone = match normalize_key_name(name).as_str() {
        "C" | "B#" => 0,
        "C#" | "Db" => 1,
        "D" => 2,
        "D#" | "Eb" => 3,
        "E" | "Fb" => 4,
        "F" | "E#" => 5,
        "F#" | "Gb" => 6,
        "G" => 7,
        "G#" | "Ab" => 8,
        "A" => 9,
        "A#" | "Bb" => 10,
        "B" | "Cb" => 11,
        _ => return None,
    };
    Some(semitone)
}
