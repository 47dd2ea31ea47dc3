//! Scale degrees and the chord tones they produce within a key

use crate::key::Key;

/// Major scale intervals (semitones from the tonic), one per degree.
pub const MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Chord quality used for the extended vocal-pad stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordQuality {
    Major,
    Major9,
    Minor7,
    Minor9,
    Dominant9,
    HalfDiminished7,
}

impl ChordQuality {
    /// Get chord intervals from root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Major9 => &[0, 4, 7, 11, 14],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::Minor9 => &[0, 3, 7, 10, 14],
            Self::Dominant9 => &[0, 4, 7, 10, 14],
            Self::HalfDiminished7 => &[0, 3, 6, 10],
        }
    }
}

/// Diatonic scale degree, written as a roman numeral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degree {
    I,
    II,
    III,
    IV,
    V,
    VI,
    VII,
}

impl Degree {
    pub const ALL: [Degree; 7] = [
        Degree::I,
        Degree::II,
        Degree::III,
        Degree::IV,
        Degree::V,
        Degree::VI,
        Degree::VII,
    ];

    /// Parse a degree label such as `"ii"`, `"V7"` or `" IVmaj "`.
    ///
    /// Only the `I` and `V` characters survive, so quality suffixes and
    /// other informal decorations are ignored. Returns `None` when what is
    /// left is not one of I..VII.
    pub fn parse(label: &str) -> Option<Self> {
        let numeral: String = label
            .trim()
            .to_uppercase()
            .chars()
            .filter(|c| matches!(c, 'I' | 'V'))
            .collect();

        match numeral.as_str() {
            "I" => Some(Self::I),
            "II" => Some(Self::II),
            "III" => Some(Self::III),
            "IV" => Some(Self::IV),
            "V" => Some(Self::V),
            "VI" => Some(Self::VI),
            "VII" => Some(Self::VII),
            _ => None,
        }
    }

    /// Zero-based position in the scale
    pub fn index(&self) -> usize {
        match self {
            Self::I => 0,
            Self::II => 1,
            Self::III => 2,
            Self::IV => 3,
            Self::V => 4,
            Self::VI => 5,
            Self::VII => 6,
        }
    }

    /// Semitone distance of the chord root from the tonic
    pub fn root_offset(&self) -> u8 {
        MAJOR_SCALE[self.index()]
    }

    /// Extended quality sung on this degree
    pub fn quality(&self) -> ChordQuality {
        match self {
            Self::I | Self::IV => ChordQuality::Major9,
            Self::II | Self::VI => ChordQuality::Minor9,
            Self::III => ChordQuality::Minor7,
            Self::V => ChordQuality::Dominant9,
            Self::VII => ChordQuality::HalfDiminished7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::I => "I",
            Self::II => "II",
            Self::III => "III",
            Self::IV => "IV",
            Self::V => "V",
            Self::VI => "VI",
            Self::VII => "VII",
        }
    }
}

/// Pitch classes (0..12) of the chord on `degree` in the key with tonic
/// `key_semitone`. The root is always first.
///
/// Labels that do not reduce to I..VII fall back to the tonic major triad.
pub fn chord_pitch_classes(key_semitone: u8, degree: &str) -> Vec<u8> {
    let (root, quality) = match Degree::parse(degree) {
        Some(d) => ((key_semitone % 12 + d.root_offset()) % 12, d.quality()),
        None => (key_semitone % 12, ChordQuality::Major),
    };

    quality
        .intervals()
        .iter()
        .map(|&interval| (root + interval) % 12)
        .collect()
}

/// Convenience wrapper over [`chord_pitch_classes`] taking a parsed key.
pub fn chord_for_key(key: Key, degree: &str) -> Vec<u8> {
    chord_pitch_classes(key.semitone(), degree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tonic_major_nine_in_c() {
        assert_eq!(chord_pitch_classes(0, "I"), vec![0, 4, 7, 11, 2]);
    }

    #[test]
    fn test_degree_roots_follow_major_scale() {
        for (degree, offset) in Degree::ALL.iter().zip(MAJOR_SCALE) {
            let pcs = chord_pitch_classes(0, degree.name());
            assert_eq!(pcs[0], offset, "root of {}", degree.name());
        }
    }

    #[test]
    fn test_qualities_per_degree() {
        // G: dominant 9 -> G B D F A
        assert_eq!(chord_pitch_classes(0, "V"), vec![7, 11, 2, 5, 9]);
        // B half-diminished -> B D F A
        assert_eq!(chord_pitch_classes(0, "VII"), vec![11, 2, 5, 9]);
        // E minor 7 -> E G B D
        assert_eq!(chord_pitch_classes(0, "III"), vec![4, 7, 11, 2]);
        // D minor 9 -> D F A C E
        assert_eq!(chord_pitch_classes(0, "II"), vec![2, 5, 9, 0, 4]);
    }

    #[test]
    fn test_transposes_with_key() {
        // IV in D is G major 9
        assert_eq!(chord_pitch_classes(2, "IV"), vec![7, 11, 2, 6, 9]);
        // VI in Bb is G minor 9
        assert_eq!(chord_for_key(Key::from_name("Bb"), "vi"), vec![7, 10, 2, 5, 9]);
    }

    #[test]
    fn test_decorated_labels_reduce_to_numeral() {
        assert_eq!(chord_pitch_classes(0, " v7 "), chord_pitch_classes(0, "V"));
        assert_eq!(chord_pitch_classes(0, "IVmaj"), chord_pitch_classes(0, "IV"));
    }

    #[test]
    fn test_unknown_degree_falls_back_to_tonic_triad() {
        assert_eq!(chord_pitch_classes(0, "NONE"), vec![0, 4, 7]);
        assert_eq!(chord_pitch_classes(9, "VIII"), vec![9, 1, 4]);
        assert_eq!(chord_pitch_classes(5, ""), vec![5, 9, 0]);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        for key in 0..12u8 {
            for degree in Degree::ALL {
                let a = chord_pitch_classes(key, degree.name());
                let b = chord_pitch_classes(key, degree.name());
                assert_eq!(a, b);
                assert!(!a.is_empty());
                assert_eq!(a[0], (key + degree.root_offset()) % 12);
                assert!(a.iter().all(|&pc| pc < 12));
            }
        }
    }
}
