// NoteStabilizer - debounce raw per-frame estimates into note events
//
// Every analysis tick produces a frequency or nothing. The stabilizer only
// lets a NoteEvent through when the note actually changed, or when the held
// note drifted by more than the configured tolerance. Silent frames never
// emit and never clear the held note, so short dropouts do not split a
// sustained note in two.
//
// Each newly seen pitch class is added to the shared DetectedPitchClassSet,
// which the chord matcher and the harmonic-context collaborator read.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::analysis::note_mapper::{cents_from_nearest, note_from_frequency, Note, PitchClass};
use crate::config::StabilizerConfig;

/// Why a NoteEvent was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteEventKind {
    /// Note name or octave changed
    Attack,
    /// Same note, frequency moved by at least the drift tolerance
    Drift,
}

/// A debounced note observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch_class: PitchClass,
    pub octave: i32,
    pub frequency_hz: f32,
    /// Deviation from the equal-tempered target in cents
    pub cents: f32,
    /// Milliseconds since the listening session started
    pub timestamp_ms: f64,
    pub kind: NoteEventKind,
}

impl NoteEvent {
    pub fn note(&self) -> Note {
        Note {
            pitch_class: self.pitch_class,
            octave: self.octave,
        }
    }
}

/// Set of distinct pitch classes observed during a session.
///
/// Iteration is always in ascending semitone order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedPitchClassSet {
    classes: BTreeSet<PitchClass>,
}

impl DetectedPitchClassSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert; returns `true` when the class was new
    pub fn insert(&mut self, pitch_class: PitchClass) -> bool {
        self.classes.insert(pitch_class)
    }

    pub fn contains(&self, pitch_class: PitchClass) -> bool {
        self.classes.contains(&pitch_class)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn clear(&mut self) {
        self.classes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = PitchClass> + '_ {
        self.classes.iter().copied()
    }

    /// Ordered names, as handed to the harmonic-context collaborator
    pub fn to_names(&self) -> Vec<String> {
        self.classes.iter().map(|pc| pc.name().to_string()).collect()
    }
}

impl FromIterator<PitchClass> for DetectedPitchClassSet {
    fn from_iter<T: IntoIterator<Item = PitchClass>>(iter: T) -> Self {
        Self {
            classes: iter.into_iter().collect(),
        }
    }
}

/// Debounces per-frame pitch estimates into a clean NoteEvent stream
pub struct NoteStabilizer {
    drift_tolerance_hz: f32,
    last_note: Option<Note>,
    last_frequency_hz: f32,
    detected: Arc<RwLock<DetectedPitchClassSet>>,
}

impl NoteStabilizer {
    /// Create a stabilizer writing into a shared pitch-class set
    pub fn new(config: &StabilizerConfig, detected: Arc<RwLock<DetectedPitchClassSet>>) -> Self {
        Self {
            drift_tolerance_hz: config.drift_tolerance_hz,
            last_note: None,
            last_frequency_hz: 0.0,
            detected,
        }
    }

    /// Create a stabilizer with its own private pitch-class set
    pub fn with_config(config: &StabilizerConfig) -> Self {
        Self::new(config, Arc::new(RwLock::new(DetectedPitchClassSet::new())))
    }

    pub fn detected_handle(&self) -> Arc<RwLock<DetectedPitchClassSet>> {
        Arc::clone(&self.detected)
    }

    /// Copy of the current pitch-class set
    pub fn detected_snapshot(&self) -> DetectedPitchClassSet {
        self.detected
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn last_note(&self) -> Option<Note> {
        self.last_note
    }

    /// Feed one analysis tick.
    ///
    /// # Arguments
    /// * `frequency_hz` - gated estimate for the tick, `None` for no pitch
    /// * `timestamp_ms` - capture time of the frame
    ///
    /// # Returns
    /// `Some(NoteEvent)` when the estimate is a genuine change
    pub fn process(&mut self, frequency_hz: Option<f32>, timestamp_ms: f64) -> Option<NoteEvent> {
        let frequency_hz = frequency_hz?;
        let note = note_from_frequency(frequency_hz)?;

        let kind = match self.last_note {
            Some(last) if last == note => {
                if (frequency_hz - self.last_frequency_hz).abs() < self.drift_tolerance_hz {
                    return None;
                }
                NoteEventKind::Drift
            }
            _ => NoteEventKind::Attack,
        };

        self.last_note = Some(note);
        self.last_frequency_hz = frequency_hz;
        self.record_pitch_class(note.pitch_class);

        Some(NoteEvent {
            pitch_class: note.pitch_class,
            octave: note.octave,
            frequency_hz,
            cents: cents_from_nearest(frequency_hz).unwrap_or(0.0),
            timestamp_ms,
            kind,
        })
    }

    /// Forget the held note (the pitch-class set is left untouched)
    pub fn clear_last_note(&mut self) {
        self.last_note = None;
        self.last_frequency_hz = 0.0;
    }

    fn record_pitch_class(&self, pitch_class: PitchClass) {
        let already_known = self
            .detected
            .read()
            .map(|guard| guard.contains(pitch_class))
            .unwrap_or(false);
        if already_known {
            return;
        }

        match self.detected.write() {
            Ok(mut guard) => {
                if guard.insert(pitch_class) {
                    log::debug!(
                        "[Stabilizer] New pitch class {} ({} distinct)",
                        pitch_class,
                        guard.len()
                    );
                }
            }
            Err(_) => {
                log::warn!("[Stabilizer] Pitch-class set lock poisoned; skipping insert");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stabilizer() -> NoteStabilizer {
        NoteStabilizer::with_config(&StabilizerConfig::default())
    }

    #[test]
    fn test_repeated_note_emits_once() {
        let mut s = stabilizer();
        let events: Vec<_> = (0..10)
            .filter_map(|i| s.process(Some(440.0), i as f64 * 46.0))
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pitch_class, PitchClass::A);
        assert_eq!(events[0].octave, 4);
        assert_eq!(events[0].kind, NoteEventKind::Attack);
    }

    #[test]
    fn test_alternating_notes_emit_every_frame() {
        let mut s = stabilizer();
        let mut emitted = 0;
        for i in 0..8 {
            let hz = if i % 2 == 0 { 440.0 } else { 493.88 };
            if s.process(Some(hz), i as f64).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 8);
    }

    #[test]
    fn test_small_jitter_is_suppressed() {
        let mut s = stabilizer();
        assert!(s.process(Some(440.0), 0.0).is_some());
        assert!(s.process(Some(440.4), 1.0).is_none());
        assert!(s.process(Some(439.3), 2.0).is_none());
    }

    #[test]
    fn test_drift_within_note_re_emits() {
        let mut s = stabilizer();
        assert!(s.process(Some(440.0), 0.0).is_some());
        let drift = s.process(Some(441.5), 1.0).expect("drift should emit");
        assert_eq!(drift.kind, NoteEventKind::Drift);
        assert_eq!(drift.pitch_class, PitchClass::A);
        // Tolerance is measured from the last emitted frequency
        assert!(s.process(Some(442.0), 2.0).is_none());
    }

    #[test]
    fn test_octave_change_is_attack() {
        let mut s = stabilizer();
        s.process(Some(220.0), 0.0);
        let event = s.process(Some(440.0), 1.0).unwrap();
        assert_eq!(event.kind, NoteEventKind::Attack);
        assert_eq!(event.octave, 4);
    }

    #[test]
    fn test_dropout_does_not_clear_held_note() {
        let mut s = stabilizer();
        assert!(s.process(Some(440.0), 0.0).is_some());
        assert!(s.process(None, 1.0).is_none());
        assert!(s.process(None, 2.0).is_none());
        assert!(s.process(Some(440.0), 3.0).is_none());
        assert_eq!(
            s.last_note().map(|n| n.pitch_class),
            Some(PitchClass::A)
        );
    }

    #[test]
    fn test_detected_set_accumulates_distinct_classes() {
        let mut s = stabilizer();
        for &hz in &[261.63f32, 329.63, 392.0, 523.25, 329.63] {
            s.process(Some(hz), 0.0);
        }
        let set = s.detected_snapshot();
        assert_eq!(set.len(), 3);
        assert_eq!(set.to_names(), vec!["C", "E", "G"]);
    }

    #[test]
    fn test_shared_set_visible_to_other_handles() {
        let shared = Arc::new(RwLock::new(DetectedPitchClassSet::new()));
        let mut s = NoteStabilizer::new(&StabilizerConfig::default(), Arc::clone(&shared));
        s.process(Some(440.0), 0.0);
        assert!(shared.read().unwrap().contains(PitchClass::A));
    }

    #[test]
    fn test_event_carries_timestamp_and_cents() {
        let mut s = stabilizer();
        let event = s.process(Some(445.0), 1234.5).unwrap();
        assert_eq!(event.timestamp_ms, 1234.5);
        assert!(event.cents > 19.0);
    }
}
