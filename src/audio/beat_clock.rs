//! Beat clock - the periodic scheduler the rhythm trainer configures
//!
//! The trainer only ever asks the clock to start, change tempo or stop;
//! the clock answers with a [`BeatTick`] per beat delivered to a sink
//! callback. Two implementations:
//! - [`IntervalBeatClock`]: tokio interval task, used by the engine
//! - [`ManualBeatClock`]: ticks fired by hand, for deterministic tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::AudioError;

/// One metronome beat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatTick {
    /// Monotonically increasing across tempo changes, reset on start
    pub beat_index: u64,
    /// 1-based position within the bar
    pub beat_in_bar: u32,
    /// Milliseconds since the session clock origin
    pub timestamp_ms: f64,
    /// Tempo the tick was scheduled at
    pub bpm: f32,
}

/// Callback receiving every tick
pub type TickSink = Arc<dyn Fn(BeatTick) + Send + Sync>;

/// Monotonic millisecond time source shared by capture and the beat clock
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Default time source: milliseconds since construction
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SessionClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Interface between the trainer and its metronome
pub trait BeatClock: Send + Sync {
    /// Start ticking at `bpm`; the first tick fires immediately
    fn start(&self, bpm: f32) -> Result<(), AudioError>;
    /// Change tempo; takes effect from the next beat
    fn set_bpm(&self, bpm: f32) -> Result<(), AudioError>;
    /// Stop ticking. Stopping an idle clock is a no-op.
    fn stop(&self) -> Result<(), AudioError>;
    fn bpm(&self) -> f32;
    fn is_running(&self) -> bool;
}

fn validate_bpm(bpm: f32) -> Result<(), AudioError> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(AudioError::BpmInvalid { bpm })
    }
}

fn beat_period(bpm: f32) -> Duration {
    Duration::from_secs_f64(60.0 / bpm as f64)
}

fn beat_in_bar(beat_index: u64, beats_per_bar: u32) -> u32 {
    let beats_per_bar = beats_per_bar.max(1) as u64;
    (beat_index % beats_per_bar) as u32 + 1
}

struct IntervalState {
    bpm: f32,
    task: Option<JoinHandle<()>>,
}

/// Tokio-interval metronome
pub struct IntervalBeatClock {
    runtime: Handle,
    sink: TickSink,
    time: Arc<dyn TimeSource>,
    beats_per_bar: u32,
    beat_index: Arc<AtomicU64>,
    state: Mutex<IntervalState>,
}

impl IntervalBeatClock {
    pub fn new(
        runtime: Handle,
        time: Arc<dyn TimeSource>,
        beats_per_bar: u32,
        sink: TickSink,
    ) -> Self {
        Self {
            runtime,
            sink,
            time,
            beats_per_bar,
            beat_index: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(IntervalState {
                bpm: 0.0,
                task: None,
            }),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, IntervalState>, AudioError> {
        self.state.lock().map_err(|_| AudioError::LockPoisoned {
            component: "beat_clock".to_string(),
        })
    }

    fn spawn_ticker(&self, bpm: f32, first_tick: tokio::time::Instant) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let time = Arc::clone(&self.time);
        let counter = Arc::clone(&self.beat_index);
        let beats_per_bar = self.beats_per_bar;
        let period = beat_period(bpm);

        self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let beat_index = counter.fetch_add(1, Ordering::SeqCst);
                sink(BeatTick {
                    beat_index,
                    beat_in_bar: beat_in_bar(beat_index, beats_per_bar),
                    timestamp_ms: time.now_ms(),
                    bpm,
                });
            }
        })
    }
}

impl BeatClock for IntervalBeatClock {
    fn start(&self, bpm: f32) -> Result<(), AudioError> {
        validate_bpm(bpm)?;
        let mut state = self.lock_state()?;
        if state.task.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        self.beat_index.store(0, Ordering::SeqCst);
        state.bpm = bpm;
        state.task = Some(self.spawn_ticker(bpm, tokio::time::Instant::now()));
        log::info!("[BeatClock] Started at {} BPM", bpm);
        Ok(())
    }

    fn set_bpm(&self, bpm: f32) -> Result<(), AudioError> {
        validate_bpm(bpm)?;
        let mut state = self.lock_state()?;
        state.bpm = bpm;

        if let Some(task) = state.task.take() {
            task.abort();
            let next_beat = tokio::time::Instant::now() + beat_period(bpm);
            state.task = Some(self.spawn_ticker(bpm, next_beat));
            log::info!("[BeatClock] Tempo changed to {} BPM", bpm);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let mut state = self.lock_state()?;
        if let Some(task) = state.task.take() {
            task.abort();
            log::info!("[BeatClock] Stopped");
        }
        Ok(())
    }

    fn bpm(&self) -> f32 {
        self.state.lock().map(|s| s.bpm).unwrap_or(0.0)
    }

    fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.task.is_some())
            .unwrap_or(false)
    }
}

impl Drop for IntervalBeatClock {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(task) = state.task.take() {
                task.abort();
            }
        }
    }
}

struct ManualState {
    running: bool,
    bpm: f32,
    next_index: u64,
}

/// Hand-driven clock. `fire` emits a tick only while running.
pub struct ManualBeatClock {
    sink: TickSink,
    beats_per_bar: u32,
    state: Mutex<ManualState>,
}

impl ManualBeatClock {
    pub fn new(beats_per_bar: u32, sink: TickSink) -> Self {
        Self {
            sink,
            beats_per_bar,
            state: Mutex::new(ManualState {
                running: false,
                bpm: 0.0,
                next_index: 0,
            }),
        }
    }

    /// Emit one tick stamped `timestamp_ms`; returns it, or `None` when stopped
    pub fn fire(&self, timestamp_ms: f64) -> Option<BeatTick> {
        let tick = {
            let mut state = self.state.lock().ok()?;
            if !state.running {
                return None;
            }
            let beat_index = state.next_index;
            state.next_index += 1;
            BeatTick {
                beat_index,
                beat_in_bar: beat_in_bar(beat_index, self.beats_per_bar),
                timestamp_ms,
                bpm: state.bpm,
            }
        };
        (self.sink)(tick);
        Some(tick)
    }
}

impl BeatClock for ManualBeatClock {
    fn start(&self, bpm: f32) -> Result<(), AudioError> {
        validate_bpm(bpm)?;
        let mut state = self.state.lock().map_err(|_| AudioError::LockPoisoned {
            component: "manual_beat_clock".to_string(),
        })?;
        if state.running {
            return Err(AudioError::AlreadyRunning);
        }
        state.running = true;
        state.bpm = bpm;
        state.next_index = 0;
        Ok(())
    }

    fn set_bpm(&self, bpm: f32) -> Result<(), AudioError> {
        validate_bpm(bpm)?;
        let mut state = self.state.lock().map_err(|_| AudioError::LockPoisoned {
            component: "manual_beat_clock".to_string(),
        })?;
        state.bpm = bpm;
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let mut state = self.state.lock().map_err(|_| AudioError::LockPoisoned {
            component: "manual_beat_clock".to_string(),
        })?;
        state.running = false;
        Ok(())
    }

    fn bpm(&self) -> f32 {
        self.state.lock().map(|s| s.bpm).unwrap_or(0.0)
    }

    fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.running).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_sink() -> (TickSink, Arc<Mutex<Vec<BeatTick>>>) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink_ticks = Arc::clone(&ticks);
        let sink: TickSink = Arc::new(move |tick| sink_ticks.lock().unwrap().push(tick));
        (sink, ticks)
    }

    #[test]
    fn test_beat_in_bar_wraps() {
        assert_eq!(beat_in_bar(0, 4), 1);
        assert_eq!(beat_in_bar(3, 4), 4);
        assert_eq!(beat_in_bar(4, 4), 1);
        assert_eq!(beat_in_bar(5, 0), 1);
    }

    #[test]
    fn test_invalid_bpm_rejected() {
        let (sink, _) = collecting_sink();
        let clock = ManualBeatClock::new(4, sink);
        assert_eq!(clock.start(0.0), Err(AudioError::BpmInvalid { bpm: 0.0 }));
        assert!(clock.set_bpm(-5.0).is_err());
        assert!(!clock.is_running());
    }

    #[test]
    fn test_manual_clock_fires_only_while_running() {
        let (sink, ticks) = collecting_sink();
        let clock = ManualBeatClock::new(4, sink);
        assert!(clock.fire(0.0).is_none());

        clock.start(120.0).unwrap();
        assert_eq!(clock.start(120.0), Err(AudioError::AlreadyRunning));
        for i in 0..5 {
            clock.fire(i as f64 * 500.0);
        }
        clock.stop().unwrap();
        assert!(clock.fire(3000.0).is_none());

        let ticks = ticks.lock().unwrap();
        assert_eq!(ticks.len(), 5);
        assert_eq!(ticks[4].beat_index, 4);
        assert_eq!(ticks[4].beat_in_bar, 1);
        assert_eq!(ticks[0].bpm, 120.0);
    }

    #[test]
    fn test_interval_clock_ticks_and_stops() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (sink, ticks) = collecting_sink();
        let clock = IntervalBeatClock::new(
            runtime.handle().clone(),
            Arc::new(SessionClock::new()),
            4,
            sink,
        );

        // 600 BPM: one tick every 100ms, first tick immediate
        clock.start(600.0).unwrap();
        assert!(clock.is_running());
        std::thread::sleep(Duration::from_millis(350));
        clock.stop().unwrap();
        assert!(!clock.is_running());

        let count = ticks.lock().unwrap().len();
        assert!(count >= 2, "expected at least 2 ticks, got {}", count);

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(ticks.lock().unwrap().len(), count);

        // Stopping twice is harmless
        clock.stop().unwrap();
    }

    #[test]
    fn test_interval_clock_set_bpm_keeps_beat_index() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (sink, ticks) = collecting_sink();
        let clock = IntervalBeatClock::new(
            runtime.handle().clone(),
            Arc::new(SessionClock::new()),
            4,
            sink,
        );

        clock.start(600.0).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        clock.set_bpm(1200.0).unwrap();
        assert_eq!(clock.bpm(), 1200.0);
        std::thread::sleep(Duration::from_millis(200));
        clock.stop().unwrap();

        let ticks = ticks.lock().unwrap();
        assert!(ticks.len() >= 3);
        for (i, tick) in ticks.iter().enumerate() {
            assert_eq!(tick.beat_index, i as u64);
        }
        assert_eq!(ticks.last().map(|t| t.bpm), Some(1200.0));
    }
}
