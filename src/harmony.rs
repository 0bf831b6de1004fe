//! Harmonic-context collaborator interface.
//!
//! The core hands the detected pitch classes (ordered names such as
//! `["C", "E", "G"]`) to an analyzer and gets back a structured
//! suggestion of scales, modes and progressions. The exchange is a single
//! async request/response; failures are reported as [`CollaboratorError`]
//! and never touch detector or trainer state, so callers may simply retry.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::chord::match_chord;
use crate::analysis::note_mapper::PitchClass;
use crate::analysis::stabilizer::DetectedPitchClassSet;
use crate::error::{log_collaborator_error, CollaboratorError};

/// Default deadline for one analysis request
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Structured analysis returned by the collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonicContext {
    pub scales: Vec<String>,
    #[serde(default)]
    pub modes: Vec<String>,
    #[serde(default)]
    pub progressions: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// Trait for harmonic-context providers.
///
/// Implementations may call a hosted service or compute locally.
#[async_trait]
pub trait HarmonicAnalyzer: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Analyze an ordered, non-empty list of pitch-class names.
    async fn analyze(&self, pitch_classes: &[String]) -> Result<HarmonicContext, CollaboratorError>;
}

/// Send the current pitch-class set to `analyzer` with a deadline.
///
/// # Errors
/// - `EmptyPitchSet` when nothing has been detected yet
/// - `Timeout` when the analyzer does not answer within `timeout`
/// - whatever the analyzer itself reports
pub async fn request_analysis(
    analyzer: &dyn HarmonicAnalyzer,
    detected: &DetectedPitchClassSet,
    timeout: Duration,
) -> Result<HarmonicContext, CollaboratorError> {
    if detected.is_empty() {
        return Err(CollaboratorError::EmptyPitchSet);
    }
    let names = detected.to_names();
    log::info!(
        "[Harmony] Requesting analysis from {} for {:?}",
        analyzer.name(),
        names
    );

    let result = match tokio::time::timeout(timeout, analyzer.analyze(&names)).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    };

    if let Err(ref err) = result {
        log_collaborator_error(err, analyzer.name());
    }
    result
}

const MAJOR_SCALE: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Offline analyzer: lists the major keys (and their relative minors)
/// containing every detected pitch class, plus the current chord.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHarmonicAnalyzer;

impl LocalHarmonicAnalyzer {
    fn parse(pitch_classes: &[String]) -> Result<DetectedPitchClassSet, CollaboratorError> {
        pitch_classes
            .iter()
            .map(|name| {
                name.parse::<PitchClass>()
                    .map_err(|reason| CollaboratorError::RequestFailed { reason })
            })
            .collect()
    }

    fn containing_major_keys(set: &DetectedPitchClassSet) -> Vec<PitchClass> {
        PitchClass::ALL
            .iter()
            .copied()
            .filter(|&tonic| {
                set.iter().all(|pc| {
                    let interval = pc.interval_from(tonic) as i32;
                    MAJOR_SCALE.contains(&interval)
                })
            })
            .collect()
    }
}

#[async_trait]
impl HarmonicAnalyzer for LocalHarmonicAnalyzer {
    fn name(&self) -> &str {
        "local"
    }

    async fn analyze(&self, pitch_classes: &[String]) -> Result<HarmonicContext, CollaboratorError> {
        let set = Self::parse(pitch_classes)?;
        if set.is_empty() {
            return Err(CollaboratorError::EmptyPitchSet);
        }

        let keys = Self::containing_major_keys(&set);
        let scales = keys
            .iter()
            .flat_map(|&tonic| {
                [
                    format!("{} major", tonic),
                    format!("{} natural minor", tonic.transpose(9)),
                ]
            })
            .collect();
        let modes = keys
            .iter()
            .map(|&tonic| format!("{} dorian", tonic.transpose(2)))
            .collect();
        let progressions = keys
            .first()
            .map(|&tonic| {
                vec![format!(
                    "{} - {} - {}m - {}",
                    tonic,
                    tonic.transpose(7),
                    tonic.transpose(9),
                    tonic.transpose(5)
                )]
            })
            .unwrap_or_default();
        let summary = match match_chord(&set) {
            Some(chord) => format!("Chord {} ({})", chord.suffixed_name, chord.chord_type_name),
            None => format!("{} pitch classes, no chord", set.len()),
        };

        Ok(HarmonicContext {
            scales,
            modes,
            progressions,
            summary,
        })
    }
}
