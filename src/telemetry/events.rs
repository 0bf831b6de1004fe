//! Core telemetry event types describing diagnostics data exposed to the
//! CLI and to engine subscribers.

use serde::{Deserialize, Serialize};

use crate::analysis::note_mapper::PitchClass;
use crate::analysis::stabilizer::NoteEventKind;
use crate::trainer::{PhaseKind, TrainerFeedback};

/// Diagnostic error codes surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    FixtureLoad,
    MalformedFrame,
    FrameDropped,
    BeatClock,
    Collaborator,
    Unknown,
}

/// Metric events covering the pitch pipeline, frame transfer and trainer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Rolling per-frame estimation time
    Latency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    BufferOccupancy {
        channel: String,
        percent: f32,
    },
    NoteDetected {
        pitch_class: PitchClass,
        octave: i32,
        frequency_hz: f32,
        kind: NoteEventKind,
    },
    /// Running frame counters from the analysis thread
    PipelineStats {
        frames_processed: u64,
        pitched_frames: u64,
        unpitched_frames: u64,
        out_of_range_frames: u64,
    },
    PhaseChanged {
        from: PhaseKind,
        to: PhaseKind,
    },
    Feedback {
        feedback: TrainerFeedback,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
