// Rhythm trainer - learn a repeated phrase, verify it, then train it at tempo
//
// The trainer is a pure state machine: `TrainerSession::apply` takes one
// event (note, beat tick, start, stop, reset) and returns the effects the
// caller must carry out (feedback to publish, beat clock commands). It owns
// no threads and no timers. The engine feeds it from a single-consumer
// queue so notes and ticks are applied strictly in arrival order.

pub mod pattern;
pub mod session;
pub mod timing;

use serde::{Deserialize, Serialize};

use crate::analysis::note_mapper::PitchClass;
use crate::audio::beat_clock::BeatTick;

pub use pattern::{ComplexityMode, LearnedPattern, RollingHistory};
pub use session::{HitStats, TrainerPhase, TrainerSession, TrainerSnapshot, TrainingState};
pub use timing::{HitPrecision, TimingEvaluation, TimingWindow};

/// Input to the trainer state machine
#[derive(Debug, Clone, PartialEq)]
pub enum TrainerEvent {
    /// Begin a new learning pass; `None` keeps the configured complexity
    Start { complexity: Option<ComplexityMode> },
    /// End the session and silence the beat clock
    Stop,
    /// Clear everything and return to idle
    Reset,
    /// A debounced note attack
    Note {
        pitch_class: PitchClass,
        timestamp_ms: f64,
    },
    /// A beat clock tick
    Tick(BeatTick),
}

/// Coarse phase name, used in snapshots and phase-change effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Idle,
    Learning,
    Locked,
    Training,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Idle => "idle",
            PhaseKind::Learning => "learning",
            PhaseKind::Locked => "locked",
            PhaseKind::Training => "training",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing feedback raised during training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainerFeedback {
    /// An accepted, on-cursor, in-window note
    Hit {
        precision: HitPrecision,
        offset_ms: f64,
        normalized_offset: f32,
        timestamp_ms: f64,
    },
    /// A hit that completed a cycle and crossed a level threshold
    LevelUp {
        bpm: f32,
        streak: u32,
        timestamp_ms: f64,
    },
    /// A beat passed without a hit while a streak was running
    MissedBeat { lost_streak: u32, timestamp_ms: f64 },
}

impl TrainerFeedback {
    pub fn timestamp_ms(&self) -> f64 {
        match self {
            TrainerFeedback::Hit { timestamp_ms, .. }
            | TrainerFeedback::LevelUp { timestamp_ms, .. }
            | TrainerFeedback::MissedBeat { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

/// Command for the beat clock collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClockCommand {
    Start { bpm: f32 },
    SetBpm { bpm: f32 },
    Stop,
}

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum TrainerEffect {
    PhaseChanged { from: PhaseKind, to: PhaseKind },
    PatternLearned(LearnedPattern),
    /// A verification cycle completed while locked
    Confirmation { count: u32, required: u32 },
    Feedback(TrainerFeedback),
    Clock(ClockCommand),
}
