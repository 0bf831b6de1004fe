//! Note mapping - frequency to equal-tempered note name and octave
//!
//! Twelve-tone equal temperament referenced to A4 = 440 Hz with MIDI-style
//! semitone numbering (A4 = 69, C4 = 60).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reference pitch for A4
pub const A4_FREQUENCY_HZ: f32 = 440.0;

/// MIDI number of A4
pub const A4_MIDI: i32 = 69;

/// One of the twelve equal-tempered pitch classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C#")]
    CSharp,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D#")]
    DSharp,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "F#")]
    FSharp,
    #[serde(rename = "G")]
    G,
    #[serde(rename = "G#")]
    GSharp,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A#")]
    ASharp,
    #[serde(rename = "B")]
    B,
}

impl PitchClass {
    /// All pitch classes in ascending semitone order
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitone index 0-11 with C = 0
    pub fn index(self) -> usize {
        self as usize
    }

    /// Pitch class for any semitone index (wraps modulo 12)
    pub fn from_index(index: i32) -> PitchClass {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    /// Sharp-based display name
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Semitones from `root` up to `self` (0-11)
    pub fn interval_from(self, root: PitchClass) -> usize {
        (self.index() + 12 - root.index()) % 12
    }

    /// Pitch class `semitones` above `self`
    pub fn transpose(self, semitones: i32) -> PitchClass {
        Self::from_index(self.index() as i32 + semitones)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = String;

    /// Parses sharp or flat spellings such as "C#" or "Db". The note
    /// letter must be upper case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .ok_or_else(|| "empty pitch class".to_string())?;
        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            other => return Err(format!("unknown note letter '{}' in '{}'", other, s)),
        };
        let accidental = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            other => return Err(format!("unknown accidental '{}' in '{}'", other, s)),
        };
        Ok(PitchClass::from_index(base + accidental))
    }
}

/// A pitch class in a specific octave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl Note {
    /// MIDI-style absolute semitone number
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.pitch_class.index() as i32
    }

    /// Equal-tempered frequency of this note
    pub fn frequency_hz(&self) -> f32 {
        A4_FREQUENCY_HZ * 2f32.powf((self.midi() - A4_MIDI) as f32 / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

/// Map a frequency to the nearest equal-tempered note.
///
/// Returns `None` for non-positive or non-finite frequencies.
pub fn note_from_frequency(frequency_hz: f32) -> Option<Note> {
    let midi = midi_from_frequency(frequency_hz)?;
    Some(Note {
        pitch_class: PitchClass::from_index(midi),
        octave: midi.div_euclid(12) - 1,
    })
}

/// Nearest MIDI-style semitone number for a frequency
pub fn midi_from_frequency(frequency_hz: f32) -> Option<i32> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return None;
    }
    let offset = (12.0 * (frequency_hz / A4_FREQUENCY_HZ).log2()).round() as i32;
    Some(offset + A4_MIDI)
}

/// Signed deviation in cents from the nearest equal-tempered note
pub fn cents_from_nearest(frequency_hz: f32) -> Option<f32> {
    let note = note_from_frequency(frequency_hz)?;
    Some(1200.0 * (frequency_hz / note.frequency_hz()).log2())
}
