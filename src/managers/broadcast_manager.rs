// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use tokio::sync::broadcast;

use crate::analysis::chord::ChordMatch;
use crate::analysis::stabilizer::NoteEvent;
use crate::trainer::TrainerFeedback;

/// Buffer for the note stream (about 5 seconds of fast alternating notes)
const NOTE_CHANNEL_CAPACITY: usize = 128;
const CHORD_CHANNEL_CAPACITY: usize = 32;
const FEEDBACK_CHANNEL_CAPACITY: usize = 64;

/// Manages the broadcast channels observed by the presentation layer
///
/// # Channel Types
/// - Notes: debounced NoteEvents from the analysis thread
/// - Chords: chord-or-none, published whenever the pitch-class set grows
///   or is cleared
/// - Feedback: trainer hits, level ups and missed beats
///
/// Channels are created up front, so subscribing never fails. Lagging
/// subscribers lose the oldest messages rather than slowing publishers.
#[derive(Clone)]
pub struct BroadcastChannelManager {
    notes: broadcast::Sender<NoteEvent>,
    chords: broadcast::Sender<Option<ChordMatch>>,
    feedback: broadcast::Sender<TrainerFeedback>,
}

impl BroadcastChannelManager {
    pub fn new() -> Self {
        let (notes, _) = broadcast::channel(NOTE_CHANNEL_CAPACITY);
        let (chords, _) = broadcast::channel(CHORD_CHANNEL_CAPACITY);
        let (feedback, _) = broadcast::channel(FEEDBACK_CHANNEL_CAPACITY);
        Self {
            notes,
            chords,
            feedback,
        }
    }

    // ========================================================================
    // NOTE CHANNEL
    // ========================================================================

    /// Sender handed to the analysis thread
    pub fn note_sender(&self) -> broadcast::Sender<NoteEvent> {
        self.notes.clone()
    }

    pub fn subscribe_notes(&self) -> broadcast::Receiver<NoteEvent> {
        self.notes.subscribe()
    }

    // ========================================================================
    // CHORD CHANNEL
    // ========================================================================

    pub fn chord_sender(&self) -> broadcast::Sender<Option<ChordMatch>> {
        self.chords.clone()
    }

    pub fn subscribe_chords(&self) -> broadcast::Receiver<Option<ChordMatch>> {
        self.chords.subscribe()
    }

    // ========================================================================
    // FEEDBACK CHANNEL
    // ========================================================================

    /// Publish trainer feedback; returns the number of receivers reached
    pub fn publish_feedback(&self, feedback: TrainerFeedback) -> usize {
        self.feedback.send(feedback).unwrap_or(0)
    }

    pub fn subscribe_feedback(&self) -> broadcast::Receiver<TrainerFeedback> {
        self.feedback.subscribe()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::note_mapper::PitchClass;
    use crate::analysis::stabilizer::NoteEventKind;

    #[test]
    fn test_note_subscribers_receive_copies() {
        let manager = BroadcastChannelManager::new();
        let mut rx1 = manager.subscribe_notes();
        let mut rx2 = manager.subscribe_notes();

        let event = NoteEvent {
            pitch_class: PitchClass::E,
            octave: 2,
            frequency_hz: 82.41,
            cents: 0.0,
            timestamp_ms: 0.0,
            kind: NoteEventKind::Attack,
        };
        manager.note_sender().send(event.clone()).unwrap();

        assert_eq!(rx1.try_recv().unwrap(), event);
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[test]
    fn test_feedback_without_subscribers_is_dropped() {
        let manager = BroadcastChannelManager::new();
        let delivered = manager.publish_feedback(TrainerFeedback::MissedBeat {
            lost_streak: 1,
            timestamp_ms: 0.0,
        });
        assert_eq!(delivered, 0);

        let mut rx = manager.subscribe_feedback();
        assert_eq!(
            manager.publish_feedback(TrainerFeedback::MissedBeat {
                lost_streak: 2,
                timestamp_ms: 1.0,
            }),
            1
        );
        assert!(matches!(
            rx.try_recv(),
            Ok(TrainerFeedback::MissedBeat { lost_streak: 2, .. })
        ));
    }

    #[test]
    fn test_chord_channel_carries_none() {
        let manager = BroadcastChannelManager::new();
        let mut rx = manager.subscribe_chords();
        manager.chord_sender().send(None).unwrap();
        assert_eq!(rx.try_recv().unwrap(), None);
    }
}
