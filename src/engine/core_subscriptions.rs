use std::time::Duration;

use futures::Stream;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;

use crate::analysis::chord::{match_chord, ChordMatch};
use crate::analysis::stabilizer::{DetectedPitchClassSet, NoteEvent};
use crate::error::CollaboratorError;
use crate::harmony::{request_analysis, HarmonicAnalyzer, HarmonicContext};
use crate::telemetry::{self, MetricEvent};
use crate::trainer::{TrainerFeedback, TrainerSnapshot};

use super::EngineHandle;

impl EngineHandle {
    // ========================================================================
    // STATE SNAPSHOTS
    // ========================================================================

    /// Latest trainer snapshot published by the session task
    pub fn trainer_snapshot(&self) -> TrainerSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn detected_pitch_classes(&self) -> DetectedPitchClassSet {
        self.detected
            .read()
            .map(|set| set.clone())
            .unwrap_or_else(|err| err.into_inner().clone())
    }

    pub fn current_chord(&self) -> Option<ChordMatch> {
        match_chord(&self.detected_pitch_classes())
    }

    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe_notes(&self) -> broadcast::Receiver<NoteEvent> {
        self.broadcasts.subscribe_notes()
    }

    pub fn subscribe_chords(&self) -> broadcast::Receiver<Option<ChordMatch>> {
        self.broadcasts.subscribe_chords()
    }

    pub fn subscribe_feedback(&self) -> broadcast::Receiver<TrainerFeedback> {
        self.broadcasts.subscribe_feedback()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<TrainerSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<MetricEvent> {
        telemetry::hub().subscribe()
    }

    // ========================================================================
    // ASYNC STREAM ADAPTERS
    // ========================================================================
    //
    // Lagged broadcast receivers skip the lost messages and keep going.

    pub fn note_stream(&self) -> impl Stream<Item = NoteEvent> + Send {
        BroadcastStream::new(self.subscribe_notes()).filter_map(|item| item.ok())
    }

    pub fn chord_stream(&self) -> impl Stream<Item = Option<ChordMatch>> + Send {
        BroadcastStream::new(self.subscribe_chords()).filter_map(|item| item.ok())
    }

    pub fn feedback_stream(&self) -> impl Stream<Item = TrainerFeedback> + Send {
        BroadcastStream::new(self.subscribe_feedback()).filter_map(|item| item.ok())
    }

    /// Yields the current snapshot first, then every change
    pub fn snapshot_stream(&self) -> impl Stream<Item = TrainerSnapshot> + Send {
        WatchStream::new(self.subscribe_snapshots())
    }

    // ========================================================================
    // HARMONIC ANALYSIS
    // ========================================================================

    /// Ask `analyzer` about the pitch classes detected so far.
    ///
    /// Failures leave detector and trainer state untouched; the call may
    /// simply be repeated.
    pub async fn request_harmonic_analysis(
        &self,
        analyzer: &dyn HarmonicAnalyzer,
        timeout: Duration,
    ) -> Result<HarmonicContext, CollaboratorError> {
        let detected = self.detected_pitch_classes();
        request_analysis(analyzer, &detected, timeout).await
    }
}
