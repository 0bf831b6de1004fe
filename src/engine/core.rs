//! EngineHandle: orchestration layer shared by the CLI and tests.
//!
//! The handle owns a tokio runtime, the broadcast channels observed by the
//! presentation layer, the shared pitch-class set and the single session
//! task that applies every trainer event in arrival order. Capture pushes
//! frames through a [`CaptureHandle`]; an analysis thread turns them into
//! notes and forwards attacks into the same session queue the beat clock
//! ticks into.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, oneshot, watch};

use crate::analysis::note_mapper::PitchClass;
use crate::analysis::stabilizer::DetectedPitchClassSet;
use crate::analysis::{spawn_analysis_thread, AnalysisOutputs, NotePipeline};
use crate::audio::beat_clock::{
    BeatClock, IntervalBeatClock, ManualBeatClock, SessionClock, TickSink, TimeSource,
};
use crate::audio::buffer_pool::{FramePool, FrameProducer};
use crate::config::AppConfig;
use crate::error::{log_audio_error, AudioError};
use crate::managers::BroadcastChannelManager;
use crate::telemetry::{self, DiagnosticError};
use crate::trainer::{
    ClockCommand, ComplexityMode, TrainerEffect, TrainerEvent, TrainerSession, TrainerSnapshot,
};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// Log pipeline counters every N analysed frames (~20 s at 2048/44.1k)
const LOG_EVERY_N_FRAMES: u64 = 430;

/// Producer side of a listening session, handed to whoever captures audio.
///
/// Dropping the handle ends the session once queued frames are analysed.
pub struct CaptureHandle {
    producer: FrameProducer,
    time: Arc<dyn TimeSource>,
}

impl CaptureHandle {
    /// Samples per frame the analysis side expects
    pub fn frame_size(&self) -> usize {
        self.producer.frame_size()
    }

    /// Push one frame stamped with the engine clock
    pub fn push(&mut self, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
        let now = self.time.now_ms();
        self.push_at(samples, sample_rate, now)
    }

    /// Push one frame with an explicit capture timestamp
    pub fn push_at(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        captured_at_ms: f64,
    ) -> Result<(), AudioError> {
        let result = self
            .producer
            .push_frame(samples, sample_rate, captured_at_ms);
        if let Err(ref err) = result {
            let code = match err {
                AudioError::BufferPoolExhausted => DiagnosticError::FrameDropped,
                _ => DiagnosticError::MalformedFrame,
            };
            telemetry::hub().record_error(code, err.to_string());
        }
        result
    }
}

struct ListeningState {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Applies trainer events one at a time and carries out their effects
struct SessionWorker {
    session: TrainerSession,
    clock: Arc<dyn BeatClock>,
    broadcasts: BroadcastChannelManager,
    snapshot_tx: watch::Sender<TrainerSnapshot>,
}

impl SessionWorker {
    fn handle(&mut self, event: TrainerEvent) {
        for effect in self.session.apply(event) {
            self.apply_effect(effect);
        }
        self.snapshot_tx.send_replace(self.session.snapshot());
    }

    fn apply_effect(&self, effect: TrainerEffect) {
        match effect {
            TrainerEffect::PhaseChanged { from, to } => {
                telemetry::hub().record_phase_change(from, to);
            }
            TrainerEffect::PatternLearned(pattern) => {
                log::info!("[Engine] Pattern learned: {}", pattern);
            }
            TrainerEffect::Confirmation { count, required } => {
                log::debug!("[Engine] Pattern confirmed {}/{}", count, required);
            }
            TrainerEffect::Feedback(feedback) => {
                telemetry::hub().record_feedback(&feedback);
                self.broadcasts.publish_feedback(feedback);
            }
            TrainerEffect::Clock(command) => self.apply_clock(command),
        }
    }

    fn apply_clock(&self, command: ClockCommand) {
        let result = match command {
            ClockCommand::Start { bpm } => {
                // A clock left running by an earlier session restarts cleanly
                self.clock.stop().and_then(|_| self.clock.start(bpm))
            }
            ClockCommand::SetBpm { bpm } => self.clock.set_bpm(bpm),
            ClockCommand::Stop => self.clock.stop(),
        };
        if let Err(err) = result {
            log_audio_error(&err, "beat_clock");
            telemetry::hub().record_error(DiagnosticError::BeatClock, err.to_string());
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TrainerEvent>,
        mut flushes: mpsc::UnboundedReceiver<oneshot::Sender<TrainerSnapshot>>,
    ) {
        log::info!("[Engine] Session task started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                Some(reply) = flushes.recv() => {
                    while let Ok(event) = events.try_recv() {
                        self.handle(event);
                    }
                    let _ = reply.send(self.session.snapshot());
                }
            }
        }
        let _ = self.clock.stop();
        log::info!("[Engine] Session task finished");
    }
}

/// EngineHandle orchestrates listening, the trainer session and the channels.
pub struct EngineHandle {
    config: AppConfig,
    runtime: Runtime,
    time: Arc<dyn TimeSource>,
    clock: Arc<dyn BeatClock>,
    pub(crate) broadcasts: BroadcastChannelManager,
    detected: Arc<RwLock<DetectedPitchClassSet>>,
    reset_generation: Arc<AtomicU64>,
    session_tx: mpsc::UnboundedSender<TrainerEvent>,
    flush_tx: mpsc::UnboundedSender<oneshot::Sender<TrainerSnapshot>>,
    snapshot_rx: watch::Receiver<TrainerSnapshot>,
    session_task: tokio::task::JoinHandle<()>,
    listening: Mutex<Option<ListeningState>>,
}

impl EngineHandle {
    /// Engine with a tokio-interval beat clock.
    pub fn new(config: AppConfig) -> Result<Self, AudioError> {
        let beats_per_bar = config.trainer.beats_per_bar;
        Self::build(config, |runtime, time, sink| {
            Arc::new(IntervalBeatClock::new(runtime, time, beats_per_bar, sink))
        })
    }

    /// Engine whose beat clock only ticks when the returned clock's
    /// `fire` is called.
    pub fn with_manual_clock(config: AppConfig) -> Result<(Self, Arc<ManualBeatClock>), AudioError> {
        let beats_per_bar = config.trainer.beats_per_bar;
        let mut manual = None;
        let engine = Self::build(config, |_, _, sink| {
            let clock = Arc::new(ManualBeatClock::new(beats_per_bar, sink));
            manual = Some(Arc::clone(&clock));
            clock
        })?;
        let clock = manual.ok_or_else(|| AudioError::StreamFailure {
            reason: "manual beat clock was not created".to_string(),
        })?;
        Ok((engine, clock))
    }

    fn build<F>(config: AppConfig, make_clock: F) -> Result<Self, AudioError>
    where
        F: FnOnce(Handle, Arc<dyn TimeSource>, TickSink) -> Arc<dyn BeatClock>,
    {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("riff-engine")
            .enable_all()
            .build()
            .map_err(|err| AudioError::StreamFailure {
                reason: format!("failed to build engine runtime: {}", err),
            })?;

        let time: Arc<dyn TimeSource> = Arc::new(SessionClock::new());
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();

        let tick_tx = session_tx.clone();
        let sink: TickSink = Arc::new(move |tick| {
            let _ = tick_tx.send(TrainerEvent::Tick(tick));
        });
        let clock = make_clock(runtime.handle().clone(), Arc::clone(&time), sink);

        let session = TrainerSession::new(config.trainer.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let broadcasts = BroadcastChannelManager::new();

        let worker = SessionWorker {
            session,
            clock: Arc::clone(&clock),
            broadcasts: broadcasts.clone(),
            snapshot_tx,
        };
        let session_task = runtime.spawn(worker.run(session_rx, flush_rx));

        log::info!(
            "[Engine] Created (frame size {}, trainer start {} BPM)",
            config.pitch.frame_size,
            config.trainer.start_bpm
        );

        Ok(Self {
            config,
            runtime,
            time,
            clock,
            broadcasts,
            detected: Arc::new(RwLock::new(DetectedPitchClassSet::new())),
            reset_generation: Arc::new(AtomicU64::new(0)),
            session_tx,
            flush_tx,
            snapshot_rx,
            session_task,
            listening: Mutex::new(None),
        })
    }

    fn lock_listening(&self) -> Result<MutexGuard<'_, Option<ListeningState>>, AudioError> {
        self.listening.lock().map_err(|_| AudioError::LockPoisoned {
            component: "listening".to_string(),
        })
    }

    fn send(&self, event: TrainerEvent) -> Result<(), AudioError> {
        self.session_tx
            .send(event)
            .map_err(|_| AudioError::StreamFailure {
                reason: "session queue closed".to_string(),
            })
    }

    // ========================================================================
    // LISTENING
    // ========================================================================

    /// Start the analysis thread and return the capture side.
    ///
    /// # Errors
    /// `AlreadyRunning` if a listening session is active, or a pool/thread
    /// creation failure.
    pub fn start_listening(&self) -> Result<CaptureHandle, AudioError> {
        let mut listening = self.lock_listening()?;
        if let Some(state) = listening.as_ref() {
            if !state.thread.is_finished() {
                return Err(AudioError::AlreadyRunning);
            }
        }
        if let Some(stale) = listening.take() {
            let _ = stale.thread.join();
        }

        let pool_size = self.config.audio.buffer_pool_size;
        let (producer, consumer) = FramePool::new(pool_size, self.config.pitch.frame_size)?;
        let running = Arc::new(AtomicBool::new(true));
        let pipeline = NotePipeline::new(&self.config, Arc::clone(&self.detected))?;
        let outputs = AnalysisOutputs {
            note_tx: self.broadcasts.note_sender(),
            chord_tx: self.broadcasts.chord_sender(),
            session_tx: Some(self.session_tx.clone()),
            reset_generation: Arc::clone(&self.reset_generation),
        };

        let thread = spawn_analysis_thread(
            consumer,
            pool_size,
            pipeline,
            outputs,
            Arc::clone(&running),
            LOG_EVERY_N_FRAMES,
        )?;
        *listening = Some(ListeningState { running, thread });
        log::info!("[Engine] Listening started");

        Ok(CaptureHandle {
            producer,
            time: Arc::clone(&self.time),
        })
    }

    /// Stop listening; returns once every queued frame has been analysed.
    pub fn stop_listening(&self) -> Result<(), AudioError> {
        let state = self.lock_listening()?.take().ok_or(AudioError::NotRunning)?;
        state.running.store(false, Ordering::SeqCst);
        state.thread.join().map_err(|_| AudioError::StreamFailure {
            reason: "analysis thread panicked".to_string(),
        })?;
        log::info!("[Engine] Listening stopped");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening
            .lock()
            .map(|guard| {
                guard
                    .as_ref()
                    .map(|state| !state.thread.is_finished())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    // ========================================================================
    // TRAINER COMMANDS
    // ========================================================================

    /// Begin learning; `None` keeps the configured complexity.
    pub fn start_trainer(&self, complexity: Option<ComplexityMode>) -> Result<(), AudioError> {
        self.send(TrainerEvent::Start { complexity })
    }

    pub fn stop_trainer(&self) -> Result<(), AudioError> {
        self.send(TrainerEvent::Stop)
    }

    /// Reset the trainer and forget every detected pitch class.
    ///
    /// A note still held while listening is reported again as a fresh attack.
    pub fn reset_session(&self) -> Result<(), AudioError> {
        self.send(TrainerEvent::Reset)?;
        match self.detected.write() {
            Ok(mut set) => set.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        // Cleared set first: the analysis thread re-syncs against it
        self.reset_generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.broadcasts.chord_sender().send(None);
        log::info!("[Engine] Session reset");
        Ok(())
    }

    /// Inject a note attack directly, bypassing capture
    pub fn send_note(&self, pitch_class: PitchClass, timestamp_ms: f64) -> Result<(), AudioError> {
        self.send(TrainerEvent::Note {
            pitch_class,
            timestamp_ms,
        })
    }

    /// Wait until every event queued so far has been applied.
    ///
    /// Blocks the calling thread; do not call from inside the engine runtime.
    pub fn settle(&self) -> Result<TrainerSnapshot, AudioError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.flush_tx
            .send(reply_tx)
            .map_err(|_| AudioError::StreamFailure {
                reason: "session task stopped".to_string(),
            })?;
        self.runtime
            .block_on(reply_rx)
            .map_err(|_| AudioError::StreamFailure {
                reason: "session task dropped flush request".to_string(),
            })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Milliseconds on the engine clock (the clock capture and ticks share)
    pub fn now_ms(&self) -> f64 {
        self.time.now_ms()
    }

    pub fn beat_clock(&self) -> Arc<dyn BeatClock> {
        Arc::clone(&self.clock)
    }

    /// Runtime handle for callers that want to spawn onto the engine
    pub fn runtime_handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Drive a future to completion on the engine runtime.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Ok(mut listening) = self.listening.lock() {
            if let Some(state) = listening.take() {
                state.running.store(false, Ordering::SeqCst);
                let _ = state.thread.join();
            }
        }
        let _ = self.clock.stop();
        self.session_task.abort();
    }
}
