// Pattern discovery - complexity modes and the self-repetition test
//
// While learning, the trainer keeps a rolling history of played pitch
// classes. After every note it asks whether the most recent L notes repeat
// the L notes right before them, for each L in the complexity range,
// shortest first.

use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::note_mapper::PitchClass;

/// Selectable pattern-length range for the learning phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityMode {
    /// Patterns of 2-4 notes
    Simple,
    /// Patterns of 3-6 notes
    Balanced,
    /// Patterns of 4-10 notes
    Complex,
}

impl ComplexityMode {
    pub fn length_range(self) -> RangeInclusive<usize> {
        match self {
            ComplexityMode::Simple => 2..=4,
            ComplexityMode::Balanced => 3..=6,
            ComplexityMode::Complex => 4..=10,
        }
    }
}

impl fmt::Display for ComplexityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComplexityMode::Simple => "simple",
            ComplexityMode::Balanced => "balanced",
            ComplexityMode::Complex => "complex",
        };
        f.write_str(name)
    }
}

impl FromStr for ComplexityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(ComplexityMode::Simple),
            "balanced" => Ok(ComplexityMode::Balanced),
            "complex" => Ok(ComplexityMode::Complex),
            other => Err(format!(
                "unknown complexity '{}' (expected simple, balanced or complex)",
                other
            )),
        }
    }
}

/// The melodic unit the trainer targets. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    notes: Vec<PitchClass>,
}

impl LearnedPattern {
    /// Build a pattern; returns `None` for an empty sequence
    pub fn new(notes: Vec<PitchClass>) -> Option<Self> {
        if notes.is_empty() {
            None
        } else {
            Some(Self { notes })
        }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<PitchClass> {
        self.notes.get(index).copied()
    }

    pub fn notes(&self) -> &[PitchClass] {
        &self.notes
    }
}

impl fmt::Display for LearnedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.notes.iter().map(|pc| pc.name()).collect();
        write!(f, "[{}]", names.join(" "))
    }
}

/// Bounded history of the most recent pitch classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingHistory {
    notes: VecDeque<PitchClass>,
    capacity: usize,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            notes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a note, discarding the oldest once over capacity
    pub fn push(&mut self, pitch_class: PitchClass) {
        self.notes.push_back(pitch_class);
        while self.notes.len() > self.capacity {
            self.notes.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn to_vec(&self) -> Vec<PitchClass> {
        self.notes.iter().copied().collect()
    }

    /// Shortest `L` in `lengths` whose last `L` notes equal the `L` before them
    pub fn find_repetition(&self, lengths: RangeInclusive<usize>) -> Option<LearnedPattern> {
        let total = self.notes.len();
        for length in lengths {
            if length == 0 || total < length * 2 {
                continue;
            }
            let recent = total - length;
            let previous = total - length * 2;
            let repeats = (0..length).all(|i| self.notes[recent + i] == self.notes[previous + i]);
            if repeats {
                let notes = self.notes.range(recent..).copied().collect();
                return LearnedPattern::new(notes);
            }
        }
        None
    }
}
