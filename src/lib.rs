// Riff Trainer Core - pitch tracking and rhythm training engine
// Frame-by-frame pitch detection, chord recognition and a tempo-ramping trainer

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod harmony;
pub mod managers;
pub mod telemetry;
pub mod trainer;

// Re-exports for convenience
pub use analysis::chord::{match_chord, ChordMatch, ChordType};
pub use analysis::note_mapper::{note_from_frequency, Note, PitchClass};
pub use analysis::stabilizer::{DetectedPitchClassSet, NoteEvent, NoteEventKind};
pub use analysis::NotePipeline;
pub use config::AppConfig;
pub use engine::{CaptureHandle, EngineHandle};
pub use trainer::{ComplexityMode, PhaseKind, TrainerFeedback, TrainerSnapshot};
