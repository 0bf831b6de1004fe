//! Integration tests for EngineHandle
//!
//! These tests drive the public API end to end:
//! - Captured audio through the analysis thread into the trainer
//! - Tempo ramp and feedback delivery through the session task
//! - Beat clock lifecycle with the real interval clock
//! - Snapshot streams and reset semantics

use std::time::Duration;

use riff_trainer::analysis::note_mapper::PitchClass::{self, *};
use riff_trainer::audio::{BeatClock, ManualBeatClock};
use riff_trainer::config::AppConfig;
use riff_trainer::engine::{CaptureHandle, EngineHandle};
use riff_trainer::error::AudioError;
use riff_trainer::fixtures::sine_wave;
use riff_trainer::trainer::{ComplexityMode, PhaseKind, TrainerFeedback};

const SAMPLE_RATE: u32 = 44100;

fn simple_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.trainer.complexity = ComplexityMode::Simple;
    config
}

/// Push a frame, waiting for the analysis thread when the pool is full
fn push_blocking(capture: &mut CaptureHandle, frame: &[f32], timestamp_ms: f64) {
    loop {
        match capture.push_at(frame, SAMPLE_RATE, timestamp_ms) {
            Ok(()) => return,
            Err(AudioError::BufferPoolExhausted) => std::thread::sleep(Duration::from_millis(1)),
            Err(other) => panic!("unexpected capture error: {other:?}"),
        }
    }
}

fn play_cycle(engine: &EngineHandle, beat: &mut u64, clock: &ManualBeatClock) {
    for &pc in &[E, F, G] {
        let t = *beat as f64 * 1000.0;
        clock.fire(t).expect("clock should be running");
        engine.send_note(pc, t).unwrap();
        *beat += 1;
    }
}

fn learn_pattern(engine: &EngineHandle, notes: &[PitchClass], cycles: usize) {
    for i in 0..cycles {
        for (j, &pc) in notes.iter().enumerate() {
            engine.send_note(pc, (i * notes.len() + j) as f64).unwrap();
        }
    }
}

#[test]
fn test_captured_melody_trains_the_pattern() {
    let (engine, clock) = EngineHandle::with_manual_clock(simple_config()).unwrap();
    engine.start_trainer(None).unwrap();

    let mut capture = engine.start_listening().unwrap();
    let size = capture.frame_size();
    let tones = [
        sine_wave(329.63, SAMPLE_RATE, size, 0.5),
        sine_wave(349.23, SAMPLE_RATE, size, 0.5),
        sine_wave(392.00, SAMPLE_RATE, size, 0.5),
    ];

    let mut t = 0.0;
    for _ in 0..6 {
        for tone in &tones {
            // Two frames per note: the held frame must not count twice
            push_blocking(&mut capture, tone, t);
            push_blocking(&mut capture, tone, t + 46.0);
            t += 92.0;
        }
    }
    drop(capture);
    engine.stop_listening().unwrap();

    let snapshot = engine.settle().unwrap();
    assert_eq!(snapshot.phase, PhaseKind::Training);
    assert_eq!(snapshot.pattern, Some(vec![E, F, G]));
    assert!(clock.is_running());
    assert_eq!(engine.detected_pitch_classes().to_names(), vec!["E", "F", "G"]);
    assert!(engine.current_chord().is_none());
}

#[test]
fn test_tempo_ramp_through_engine() {
    let (engine, clock) = EngineHandle::with_manual_clock(simple_config()).unwrap();
    let mut feedback = engine.subscribe_feedback();
    engine.start_trainer(None).unwrap();
    learn_pattern(&engine, &[E, F, G], 6);
    engine.settle().unwrap();

    let mut beat = 0;
    for _ in 0..9 {
        play_cycle(&engine, &mut beat, &clock);
    }
    let snapshot = engine.settle().unwrap();
    assert_eq!(snapshot.bpm, 95.0);
    assert_eq!(snapshot.streak, 9);
    assert_eq!(clock.bpm(), 95.0);

    let mut level_ups = Vec::new();
    while let Ok(event) = feedback.try_recv() {
        if let TrainerFeedback::LevelUp { bpm, .. } = event {
            level_ups.push(bpm);
        }
    }
    assert_eq!(level_ups, vec![85.0, 90.0, 95.0]);
}

#[test]
fn test_missed_beat_reaches_subscribers() {
    let (engine, clock) = EngineHandle::with_manual_clock(simple_config()).unwrap();
    let mut feedback = engine.subscribe_feedback();
    engine.start_trainer(None).unwrap();
    learn_pattern(&engine, &[E, F, G], 6);
    engine.settle().unwrap();

    let mut beat = 0;
    play_cycle(&engine, &mut beat, &clock);
    clock.fire(beat as f64 * 1000.0);
    clock.fire((beat + 1) as f64 * 1000.0);
    let snapshot = engine.settle().unwrap();

    assert_eq!(snapshot.streak, 0);
    assert_eq!(snapshot.best_streak, 1);
    assert_eq!(snapshot.stats.missed, 1);
    let missed = std::iter::from_fn(|| feedback.try_recv().ok())
        .filter(|event| matches!(event, TrainerFeedback::MissedBeat { lost_streak: 1, .. }))
        .count();
    assert_eq!(missed, 1);
}

#[test]
fn test_interval_clock_follows_trainer() {
    let engine = EngineHandle::new(simple_config()).unwrap();
    let clock = engine.beat_clock();
    engine.start_trainer(None).unwrap();
    learn_pattern(&engine, &[C, D], 6);

    let snapshot = engine.settle().unwrap();
    assert_eq!(snapshot.phase, PhaseKind::Training);
    assert!(clock.is_running());
    assert_eq!(clock.bpm(), 80.0);

    // The first tick fires immediately; a note right after it is on the beat
    std::thread::sleep(Duration::from_millis(50));
    engine.send_note(C, engine.now_ms()).unwrap();
    let snapshot = engine.settle().unwrap();
    assert_eq!(snapshot.stats.total_hits(), 1);

    engine.reset_session().unwrap();
    let snapshot = engine.settle().unwrap();
    assert_eq!(snapshot.phase, PhaseKind::Idle);
    assert_eq!(snapshot.bpm, 80.0);
    assert!(!clock.is_running());
}

#[test]
fn test_snapshot_stream_starts_with_current_state() {
    use tokio_stream::StreamExt;

    let (engine, _clock) = EngineHandle::with_manual_clock(simple_config()).unwrap();
    engine.start_trainer(Some(ComplexityMode::Complex)).unwrap();
    engine.settle().unwrap();

    let stream = engine.snapshot_stream();
    let first = engine.block_on(async move {
        tokio::pin!(stream);
        tokio::time::timeout(Duration::from_secs(1), stream.next()).await
    });
    let snapshot = first.expect("stream timed out").expect("stream ended");
    assert_eq!(snapshot.phase, PhaseKind::Learning);
    assert_eq!(snapshot.complexity, ComplexityMode::Complex);

    engine.reset_session().unwrap();
    assert_eq!(engine.settle().unwrap().complexity, ComplexityMode::Simple);
}

#[test]
fn test_listening_lifecycle_errors() {
    let (engine, _clock) = EngineHandle::with_manual_clock(simple_config()).unwrap();
    assert!(matches!(engine.stop_listening(), Err(AudioError::NotRunning)));

    let capture = engine.start_listening().unwrap();
    assert!(matches!(engine.start_listening(), Err(AudioError::AlreadyRunning)));
    drop(capture);
    engine.stop_listening().unwrap();

    // A fresh session can start once the previous one ended
    let _capture = engine.start_listening().unwrap();
    engine.stop_listening().unwrap();
}
