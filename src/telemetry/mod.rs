//! Diagnostics telemetry collector and helpers.
//!
//! The collector multiplexes estimation latency, note detections, pipeline
//! counters, trainer feedback and errors into a bounded history plus an
//! async broadcast stream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::analysis::stabilizer::NoteEvent;
use crate::trainer::{PhaseKind, TrainerFeedback};

pub mod events;

pub use events::{DiagnosticError, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Telemetry must keep working after a panicking publisher
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        let history_capacity = history_capacity.max(1);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = lock(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = lock(&self.history);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window over recent latency samples
struct LatencyTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl LatencyTracker {
    fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    fn observe(&mut self, value: f32) -> (f32, f32, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value.abs());

        let count = self.samples.len();
        let sum: f32 = self.samples.iter().copied().sum();
        let max = self
            .samples
            .iter()
            .copied()
            .fold(0.0_f32, |acc, next| acc.max(next));
        let avg = if count == 0 { 0.0 } else { sum / count as f32 };
        (avg, max, count)
    }
}

/// Top-level hub wrapping collector state plus derived gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    latency: Mutex<LatencyTracker>,
    buffer_gauges: Mutex<HashMap<&'static str, f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, latency_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            latency: Mutex::new(LatencyTracker::new(latency_window)),
            buffer_gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.collector.subscribe()
    }

    pub fn record_note(&self, event: &NoteEvent) {
        self.collector.publish(MetricEvent::NoteDetected {
            pitch_class: event.pitch_class,
            octave: event.octave,
            frequency_hz: event.frequency_hz,
            kind: event.kind,
        });
    }

    /// Record how long one frame took to estimate
    pub fn record_frame_latency(&self, elapsed_ms: f32) {
        let (avg, max, count) = lock(&self.latency).observe(elapsed_ms);
        self.collector.publish(MetricEvent::Latency {
            avg_ms: avg,
            max_ms: max,
            sample_count: count,
        });
    }

    pub fn record_pipeline_stats(
        &self,
        frames_processed: u64,
        pitched_frames: u64,
        unpitched_frames: u64,
        out_of_range_frames: u64,
    ) {
        self.collector.publish(MetricEvent::PipelineStats {
            frames_processed,
            pitched_frames,
            unpitched_frames,
            out_of_range_frames,
        });
    }

    pub fn record_buffer_occupancy(&self, channel: &'static str, percent: f32) {
        let normalized = percent.clamp(0.0, 100.0);
        let mut gauges = lock(&self.buffer_gauges);

        let should_emit = gauges
            .get(channel)
            .map(|last| (last - normalized).abs() >= 2.5)
            .unwrap_or(true);

        if should_emit {
            gauges.insert(channel, normalized);
            self.collector.publish(MetricEvent::BufferOccupancy {
                channel: channel.to_string(),
                percent: normalized,
            });
        }
    }

    pub fn record_phase_change(&self, from: PhaseKind, to: PhaseKind) {
        self.collector.publish(MetricEvent::PhaseChanged { from, to });
    }

    pub fn record_feedback(&self, feedback: &TrainerFeedback) {
        self.collector.publish(MetricEvent::Feedback {
            feedback: feedback.clone(),
        });
    }

    pub fn record_error(&self, code: DiagnosticError, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}
