//! Chord matching against a fixed, ordered template table
//!
//! Given the distinct pitch classes played so far, find the first chord
//! template whose intervals are all present relative to some played root.
//! Roots are tried in ascending semitone order and templates in table
//! order, so lower roots and simpler chords win ties. Extra notes beyond a
//! template are tolerated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::note_mapper::PitchClass;
use crate::analysis::stabilizer::DetectedPitchClassSet;

/// Supported chord qualities, in matching priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordType {
    Major,
    Minor,
    MajorSeventh,
    MinorSeventh,
    DominantSeventh,
    Sus4,
    Sus2,
    Diminished,
    Augmented,
    Power,
}

impl ChordType {
    /// Display name of the chord quality
    pub fn display_name(self) -> &'static str {
        match self {
            ChordType::Major => "Major",
            ChordType::Minor => "Minor",
            ChordType::MajorSeventh => "Major 7th",
            ChordType::MinorSeventh => "Minor 7th",
            ChordType::DominantSeventh => "Dominant 7th",
            ChordType::Sus4 => "Sus4",
            ChordType::Sus2 => "Sus2",
            ChordType::Diminished => "Diminished",
            ChordType::Augmented => "Augmented",
            ChordType::Power => "Power Chord",
        }
    }

    /// Suffix appended to the root name ("" for major)
    pub fn suffix(self) -> &'static str {
        match self {
            ChordType::Major => "",
            ChordType::Minor => "m",
            ChordType::MajorSeventh => "maj7",
            ChordType::MinorSeventh => "m7",
            ChordType::DominantSeventh => "7",
            ChordType::Sus4 => "sus4",
            ChordType::Sus2 => "sus2",
            ChordType::Diminished => "dim",
            ChordType::Augmented => "aug",
            ChordType::Power => "5",
        }
    }
}

impl fmt::Display for ChordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A chord template: quality plus defining intervals above the root
#[derive(Debug, Clone, Copy)]
pub struct ChordTemplate {
    pub chord_type: ChordType,
    pub intervals: &'static [usize],
}

/// Template table in priority order
pub const CHORD_TEMPLATES: [ChordTemplate; 10] = [
    ChordTemplate {
        chord_type: ChordType::Major,
        intervals: &[0, 4, 7],
    },
    ChordTemplate {
        chord_type: ChordType::Minor,
        intervals: &[0, 3, 7],
    },
    ChordTemplate {
        chord_type: ChordType::MajorSeventh,
        intervals: &[0, 4, 7, 11],
    },
    ChordTemplate {
        chord_type: ChordType::MinorSeventh,
        intervals: &[0, 3, 7, 10],
    },
    ChordTemplate {
        chord_type: ChordType::DominantSeventh,
        intervals: &[0, 4, 7, 10],
    },
    ChordTemplate {
        chord_type: ChordType::Sus4,
        intervals: &[0, 5, 7],
    },
    ChordTemplate {
        chord_type: ChordType::Sus2,
        intervals: &[0, 2, 7],
    },
    ChordTemplate {
        chord_type: ChordType::Diminished,
        intervals: &[0, 3, 6],
    },
    ChordTemplate {
        chord_type: ChordType::Augmented,
        intervals: &[0, 4, 8],
    },
    ChordTemplate {
        chord_type: ChordType::Power,
        intervals: &[0, 7],
    },
];

/// Best-fitting chord for a set of pitch classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordMatch {
    pub root: PitchClass,
    pub chord_type: ChordType,
    /// e.g. "Major", "Minor 7th"
    pub chord_type_name: String,
    /// e.g. "C", "Am7", "G5"
    pub suffixed_name: String,
    /// Chord tones in template order starting at the root
    pub members: Vec<PitchClass>,
}

/// Match a pitch-class set against the template table.
///
/// Sets with fewer than two classes never match. "No chord" is a normal
/// result, not an error.
pub fn match_chord(set: &DetectedPitchClassSet) -> Option<ChordMatch> {
    if set.len() < 2 {
        return None;
    }

    // DetectedPitchClassSet iterates in ascending semitone order
    for root in set.iter() {
        let mut relative = [false; 12];
        for pc in set.iter() {
            relative[pc.interval_from(root)] = true;
        }

        for template in CHORD_TEMPLATES.iter() {
            if template.intervals.iter().all(|&interval| relative[interval]) {
                return Some(build_match(root, template));
            }
        }
    }

    None
}

/// Convenience wrapper for callers holding plain pitch classes
pub fn match_pitch_classes(classes: &[PitchClass]) -> Option<ChordMatch> {
    match_chord(&classes.iter().copied().collect())
}

fn build_match(root: PitchClass, template: &ChordTemplate) -> ChordMatch {
    ChordMatch {
        root,
        chord_type: template.chord_type,
        chord_type_name: template.chord_type.display_name().to_string(),
        suffixed_name: format!("{}{}", root.name(), template.chord_type.suffix()),
        members: template
            .intervals
            .iter()
            .map(|&interval| root.transpose(interval as i32))
            .collect(),
    }
}
