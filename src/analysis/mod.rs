// Analysis module - frame-to-note pipeline and the analysis thread
//
// This module turns captured frames into debounced note events and feeds
// them to the rest of the system.
//
// Architecture:
// - NotePipeline: Autocorrelator -> range gate -> NoteStabilizer
// - AnalysisWorker: thread loop draining the frame pool's data queue
// - Output: NoteEvents and chord updates on broadcast channels, note
//   attacks forwarded to the trainer session queue

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::audio::buffer_pool::FrameConsumer;
use crate::audio::frame::AudioFrame;
use crate::config::{AppConfig, PitchDetectionConfig};
use crate::error::{log_audio_error, AudioError};
use crate::telemetry::{self, DiagnosticError};
use crate::trainer::TrainerEvent;

pub mod autocorrelator;
pub mod chord;
pub mod note_mapper;
pub mod stabilizer;

use autocorrelator::{within_range, Autocorrelator, PitchEstimate};
use chord::{match_chord, ChordMatch};
use stabilizer::{DetectedPitchClassSet, NoteEvent, NoteEventKind, NoteStabilizer};

/// Running frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub pitched_frames: u64,
    /// Silent or indeterminate frames
    pub unpitched_frames: u64,
    /// Estimates rejected by the plausible-range gate
    pub out_of_range_frames: u64,
}

/// Result of running one frame through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// Raw estimator output
    pub estimate: PitchEstimate,
    /// Estimate after the range gate
    pub gated_hz: Option<f32>,
    /// Emitted when the stabilizer saw a genuine change
    pub note: Option<NoteEvent>,
}

/// Autocorrelator, range gate and stabilizer wired together
pub struct NotePipeline {
    autocorrelator: Autocorrelator,
    stabilizer: NoteStabilizer,
    pitch_config: PitchDetectionConfig,
    stats: PipelineStats,
}

impl NotePipeline {
    /// # Errors
    /// `AudioError::MalformedFrame` when the configured frame size is unusable.
    pub fn new(
        config: &AppConfig,
        detected: Arc<RwLock<DetectedPitchClassSet>>,
    ) -> Result<Self, AudioError> {
        Ok(Self {
            autocorrelator: Autocorrelator::with_config(&config.pitch)?,
            stabilizer: NoteStabilizer::new(&config.stabilizer, detected),
            pitch_config: config.pitch.clone(),
            stats: PipelineStats::default(),
        })
    }

    /// Pipeline with a private pitch-class set
    pub fn standalone(config: &AppConfig) -> Result<Self, AudioError> {
        Self::new(config, Arc::new(RwLock::new(DetectedPitchClassSet::new())))
    }

    pub fn frame_size(&self) -> usize {
        self.autocorrelator.frame_size()
    }

    /// Estimate, gate and debounce one frame.
    ///
    /// # Errors
    /// Malformed frames (wrong length, zero sample rate) are rejected; the
    /// stabilizer is left untouched in that case.
    pub fn process(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        timestamp_ms: f64,
    ) -> Result<FrameOutcome, AudioError> {
        let estimate = self.autocorrelator.estimate(samples, sample_rate)?;
        Ok(self.advance(estimate, timestamp_ms))
    }

    /// Same as [`process`](Self::process) for an already validated frame.
    pub fn process_frame(
        &mut self,
        frame: &AudioFrame,
        timestamp_ms: f64,
    ) -> Result<FrameOutcome, AudioError> {
        let estimate = self.autocorrelator.estimate_frame(frame)?;
        Ok(self.advance(estimate, timestamp_ms))
    }

    fn advance(&mut self, estimate: PitchEstimate, timestamp_ms: f64) -> FrameOutcome {
        self.stats.frames_processed += 1;

        let gated_hz = match estimate.frequency_hz {
            Some(hz) if within_range(hz, &self.pitch_config) => {
                self.stats.pitched_frames += 1;
                Some(hz)
            }
            Some(_) => {
                self.stats.out_of_range_frames += 1;
                None
            }
            None => {
                self.stats.unpitched_frames += 1;
                None
            }
        };

        let note = self.stabilizer.process(gated_hz, timestamp_ms);
        FrameOutcome {
            estimate,
            gated_hz,
            note,
        }
    }

    /// Forget the held note so the next pitched frame is a fresh attack
    pub fn release_held_note(&mut self) {
        self.stabilizer.clear_last_note();
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn detected_handle(&self) -> Arc<RwLock<DetectedPitchClassSet>> {
        self.stabilizer.detected_handle()
    }

    pub fn detected_snapshot(&self) -> DetectedPitchClassSet {
        self.stabilizer.detected_snapshot()
    }

    /// Current chord for the accumulated pitch classes
    pub fn current_chord(&self) -> Option<ChordMatch> {
        match_chord(&self.detected_snapshot())
    }
}

/// Outputs the analysis thread publishes to
pub struct AnalysisOutputs {
    pub note_tx: broadcast::Sender<NoteEvent>,
    pub chord_tx: broadcast::Sender<Option<ChordMatch>>,
    /// Trainer session queue; only note attacks are forwarded
    pub session_tx: Option<mpsc::UnboundedSender<TrainerEvent>>,
    /// Bumped by the owner on a session reset; the worker releases its
    /// held note before the next frame when it changes
    pub reset_generation: Arc<AtomicU64>,
}

struct AnalysisWorker {
    consumer: FrameConsumer,
    pool_capacity: usize,
    pipeline: NotePipeline,
    outputs: AnalysisOutputs,
    running: Arc<AtomicBool>,
    log_every_n_frames: u64,
    known_pitch_classes: usize,
    seen_generation: u64,
}

impl AnalysisWorker {
    fn sync_reset(&mut self) {
        let generation = self.outputs.reset_generation.load(Ordering::SeqCst);
        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.pipeline.release_held_note();
            self.known_pitch_classes = 0;
            tracing::debug!("[AnalysisThread] Session reset, held note released");
        }
    }

    fn handle_frame(&mut self, samples: &[f32], sample_rate: u32, captured_at_ms: f64) {
        self.sync_reset();
        let started = Instant::now();
        let outcome = match self.pipeline.process(samples, sample_rate, captured_at_ms) {
            Ok(outcome) => outcome,
            Err(err) => {
                log_audio_error(&err, "analysis_thread");
                telemetry::hub().record_error(DiagnosticError::MalformedFrame, err.to_string());
                return;
            }
        };
        telemetry::hub().record_frame_latency(started.elapsed().as_secs_f32() * 1000.0);

        tracing::trace!(
            "[AnalysisThread] rms {:.4}, estimate {:?}, gated {:?}",
            outcome.estimate.rms,
            outcome.estimate.frequency_hz,
            outcome.gated_hz
        );

        if let Some(note) = outcome.note {
            self.publish_note(note);
        }
    }

    fn publish_note(&mut self, note: NoteEvent) {
        tracing::debug!(
            "[AnalysisThread] {:?} {}{} at {:.2} Hz ({:+.1} cents)",
            note.kind,
            note.pitch_class,
            note.octave,
            note.frequency_hz,
            note.cents
        );
        telemetry::hub().record_note(&note);

        if note.kind == NoteEventKind::Attack {
            if let Some(tx) = &self.outputs.session_tx {
                let event = TrainerEvent::Note {
                    pitch_class: note.pitch_class,
                    timestamp_ms: note.timestamp_ms,
                };
                if tx.send(event).is_err() {
                    tracing::warn!("[AnalysisThread] Session queue closed; dropping note");
                }
            }
        }
        let _ = self.outputs.note_tx.send(note);

        let detected = self.pipeline.detected_snapshot();
        if detected.len() != self.known_pitch_classes {
            let grew = detected.len() > self.known_pitch_classes;
            self.known_pitch_classes = detected.len();
            if grew {
                let chord = match_chord(&detected);
                if let Some(ref chord) = chord {
                    tracing::info!("[AnalysisThread] Chord: {}", chord.suffixed_name);
                }
                let _ = self.outputs.chord_tx.send(chord);
            }
        }
    }

    fn report_stats(&self) {
        let stats = self.pipeline.stats();
        telemetry::hub().record_pipeline_stats(
            stats.frames_processed,
            stats.pitched_frames,
            stats.unpitched_frames,
            stats.out_of_range_frames,
        );
        tracing::info!(
            "[AnalysisThread] {} frames ({} pitched, {} unpitched, {} out of range)",
            stats.frames_processed,
            stats.pitched_frames,
            stats.unpitched_frames,
            stats.out_of_range_frames
        );
    }

    fn run(mut self) {
        tracing::info!(
            "[AnalysisThread] Starting analysis loop (frame size {})",
            self.pipeline.frame_size()
        );

        loop {
            let frame = match self.consumer.pop_frame() {
                Some(frame) => frame,
                None => {
                    // Check for shutdown only when the queue is drained
                    if !self.running.load(Ordering::SeqCst) || self.consumer.is_closed() {
                        tracing::info!("[AnalysisThread] Shutdown requested and queue empty, exiting");
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
            };

            let occupancy =
                (self.consumer.pending() as f32 / self.pool_capacity.max(1) as f32) * 100.0;
            telemetry::hub().record_buffer_occupancy("analysis_queue", occupancy);

            self.handle_frame(&frame.samples, frame.sample_rate, frame.captured_at_ms);
            self.consumer.recycle(frame);

            let processed = self.pipeline.stats().frames_processed;
            if self.log_every_n_frames > 0 && processed > 0 && processed % self.log_every_n_frames == 0 {
                self.report_stats();
            }
        }

        self.report_stats();
    }
}

/// Spawn the analysis thread.
///
/// The thread runs until `running` is cleared (or the capture side is
/// dropped) and the data queue has been drained.
pub fn spawn_analysis_thread(
    consumer: FrameConsumer,
    pool_capacity: usize,
    pipeline: NotePipeline,
    outputs: AnalysisOutputs,
    running: Arc<AtomicBool>,
    log_every_n_frames: u64,
) -> Result<JoinHandle<()>, AudioError> {
    let known_pitch_classes = pipeline.detected_snapshot().len();
    let seen_generation = outputs.reset_generation.load(Ordering::SeqCst);
    let worker = AnalysisWorker {
        consumer,
        pool_capacity,
        pipeline,
        outputs,
        running,
        log_every_n_frames,
        known_pitch_classes,
        seen_generation,
    };

    thread::Builder::new()
        .name("riff-analysis".to_string())
        .spawn(move || worker.run())
        .map_err(|err| AudioError::StreamFailure {
            reason: format!("failed to spawn analysis thread: {}", err),
        })
}
