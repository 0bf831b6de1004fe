// TrainerSession - the learn -> lock -> train state machine
//
// Phases are a tagged enum so per-phase data only exists while that phase
// is active: the rolling history only while learning, the verification
// counter only while locked, tempo and streak only while training.
//
// Stop and Reset are accepted in every phase and always end in Idle with
// the beat clock silenced.

use serde::{Deserialize, Serialize};

use super::pattern::{ComplexityMode, LearnedPattern, RollingHistory};
use super::timing::{HitPrecision, TimingWindow};
use super::{ClockCommand, PhaseKind, TrainerEffect, TrainerEvent, TrainerFeedback};
use crate::analysis::note_mapper::PitchClass;
use crate::audio::beat_clock::BeatTick;
use crate::config::TrainerConfig;

/// Per-phase state
#[derive(Debug, Clone, PartialEq)]
pub enum TrainerPhase {
    Idle,
    Learning {
        history: RollingHistory,
    },
    Locked {
        pattern: LearnedPattern,
        cursor: usize,
        confirmations: u32,
    },
    Training(TrainingState),
}

impl TrainerPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            TrainerPhase::Idle => PhaseKind::Idle,
            TrainerPhase::Learning { .. } => PhaseKind::Learning,
            TrainerPhase::Locked { .. } => PhaseKind::Locked,
            TrainerPhase::Training(_) => PhaseKind::Training,
        }
    }
}

/// Tempo-ramped performance state
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingState {
    pub pattern: LearnedPattern,
    pub cursor: usize,
    pub bpm: f32,
    pub streak: u32,
    /// Timestamp of the most recent tick; `None` until the first tick
    pub last_beat_ms: Option<f64>,
    /// Set by an accepted hit, cleared by every tick
    pub hit_this_beat: bool,
}

/// Accepted hits per precision band plus missed beats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitStats {
    pub perfect: u32,
    pub good: u32,
    pub fair: u32,
    pub missed: u32,
}

impl HitStats {
    fn record(&mut self, precision: HitPrecision) {
        match precision {
            HitPrecision::Perfect => self.perfect += 1,
            HitPrecision::Good => self.good += 1,
            HitPrecision::Early | HitPrecision::Late => self.fair += 1,
        }
    }

    pub fn total_hits(&self) -> u32 {
        self.perfect + self.good + self.fair
    }
}

/// Read-only view of the session for presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerSnapshot {
    pub phase: PhaseKind,
    pub complexity: ComplexityMode,
    pub bpm: f32,
    pub target_bpm: f32,
    pub streak: u32,
    pub best_streak: u32,
    pub cursor: usize,
    pub confirmations: u32,
    pub confirmations_required: u32,
    pub pattern: Option<Vec<PitchClass>>,
    pub history_len: usize,
    pub last_feedback: Option<TrainerFeedback>,
    pub stats: HitStats,
}

/// The rhythm trainer. Exactly one per engine.
pub struct TrainerSession {
    config: TrainerConfig,
    window: TimingWindow,
    complexity: ComplexityMode,
    phase: TrainerPhase,
    best_streak: u32,
    last_feedback: Option<TrainerFeedback>,
    stats: HitStats,
}

impl TrainerSession {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            window: TimingWindow::from_config(&config),
            complexity: config.complexity,
            config,
            phase: TrainerPhase::Idle,
            best_streak: 0,
            last_feedback: None,
            stats: HitStats::default(),
        }
    }

    pub fn phase(&self) -> &TrainerPhase {
        &self.phase
    }

    pub fn phase_kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    /// Tempo in effect; the configured start value outside training
    pub fn bpm(&self) -> f32 {
        match &self.phase {
            TrainerPhase::Training(state) => state.bpm,
            _ => self.config.start_bpm,
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Apply one event and return the effects to carry out, in order
    pub fn apply(&mut self, event: TrainerEvent) -> Vec<TrainerEffect> {
        let mut effects = Vec::new();
        match event {
            TrainerEvent::Start { complexity } => self.start(complexity, &mut effects),
            TrainerEvent::Stop | TrainerEvent::Reset => self.reset(&mut effects),
            TrainerEvent::Note {
                pitch_class,
                timestamp_ms,
            } => self.on_note(pitch_class, timestamp_ms, &mut effects),
            TrainerEvent::Tick(tick) => self.on_tick(&tick, &mut effects),
        }
        effects
    }

    pub fn snapshot(&self) -> TrainerSnapshot {
        let (streak, cursor, confirmations, pattern, history_len) = match &self.phase {
            TrainerPhase::Idle => (0, 0, 0, None, 0),
            TrainerPhase::Learning { history } => (0, 0, 0, None, history.len()),
            TrainerPhase::Locked {
                pattern,
                cursor,
                confirmations,
            } => (0, *cursor, *confirmations, Some(pattern.notes().to_vec()), 0),
            TrainerPhase::Training(state) => (
                state.streak,
                state.cursor,
                self.config.confirmations_required,
                Some(state.pattern.notes().to_vec()),
                0,
            ),
        };

        TrainerSnapshot {
            phase: self.phase.kind(),
            complexity: self.complexity,
            bpm: self.bpm(),
            target_bpm: self.config.target_bpm,
            streak,
            best_streak: self.best_streak,
            cursor,
            confirmations,
            confirmations_required: self.config.confirmations_required,
            pattern,
            history_len,
            last_feedback: self.last_feedback.clone(),
            stats: self.stats,
        }
    }

    fn start(&mut self, complexity: Option<ComplexityMode>, effects: &mut Vec<TrainerEffect>) {
        if let Some(mode) = complexity {
            self.complexity = mode;
        }
        if matches!(self.phase, TrainerPhase::Training(_)) {
            effects.push(TrainerEffect::Clock(ClockCommand::Stop));
        }
        self.clear_counters();
        let history = RollingHistory::new(self.config.history_capacity);
        self.transition(TrainerPhase::Learning { history }, effects);
        log::info!("[Trainer] Learning started (complexity {})", self.complexity);
    }

    fn reset(&mut self, effects: &mut Vec<TrainerEffect>) {
        // Silencing an idle clock is harmless; always send it
        effects.push(TrainerEffect::Clock(ClockCommand::Stop));
        self.clear_counters();
        self.complexity = self.config.complexity;
        self.transition(TrainerPhase::Idle, effects);
    }

    fn clear_counters(&mut self) {
        self.best_streak = 0;
        self.last_feedback = None;
        self.stats = HitStats::default();
    }

    fn transition(&mut self, next: TrainerPhase, effects: &mut Vec<TrainerEffect>) {
        let from = self.phase.kind();
        let to = next.kind();
        self.phase = next;
        if from != to {
            log::info!("[Trainer] Phase {} -> {}", from, to);
            effects.push(TrainerEffect::PhaseChanged { from, to });
        }
    }

    fn on_note(&mut self, note: PitchClass, timestamp_ms: f64, effects: &mut Vec<TrainerEffect>) {
        match &mut self.phase {
            TrainerPhase::Idle => {}
            TrainerPhase::Learning { history } => {
                history.push(note);
                if let Some(pattern) = history.find_repetition(self.complexity.length_range()) {
                    log::info!("[Trainer] Pattern detected: {}", pattern);
                    effects.push(TrainerEffect::PatternLearned(pattern.clone()));
                    // The detected repetition counts as the first confirmation
                    let locked = TrainerPhase::Locked {
                        pattern,
                        cursor: 0,
                        confirmations: 1,
                    };
                    self.transition(locked, effects);
                }
            }
            TrainerPhase::Locked {
                pattern,
                cursor,
                confirmations,
            } => {
                if pattern.get(*cursor) == Some(note) {
                    *cursor += 1;
                } else if pattern.get(*cursor + 1) == Some(note) {
                    // One skipped note is tolerated
                    *cursor += 2;
                } else {
                    return;
                }

                if *cursor < pattern.len() {
                    return;
                }

                *cursor = 0;
                *confirmations += 1;
                let required = self.config.confirmations_required;
                effects.push(TrainerEffect::Confirmation {
                    count: *confirmations,
                    required,
                });
                log::debug!("[Trainer] Confirmation {}/{}", confirmations, required);

                if *confirmations >= required {
                    let training = TrainingState {
                        pattern: pattern.clone(),
                        cursor: 0,
                        bpm: self.config.start_bpm,
                        streak: 0,
                        last_beat_ms: None,
                        hit_this_beat: false,
                    };
                    let bpm = training.bpm;
                    self.transition(TrainerPhase::Training(training), effects);
                    effects.push(TrainerEffect::Clock(ClockCommand::Start { bpm }));
                }
            }
            TrainerPhase::Training(state) => {
                let feedback = evaluate_hit(
                    state,
                    &self.window,
                    &self.config,
                    &mut self.stats,
                    note,
                    timestamp_ms,
                    effects,
                );
                if let Some(feedback) = feedback {
                    self.best_streak = self.best_streak.max(state.streak);
                    self.last_feedback = Some(feedback.clone());
                    effects.push(TrainerEffect::Feedback(feedback));
                }
            }
        }
    }

    fn on_tick(&mut self, tick: &BeatTick, effects: &mut Vec<TrainerEffect>) {
        let TrainerPhase::Training(state) = &mut self.phase else {
            return;
        };

        if !state.hit_this_beat && state.streak > 0 {
            let lost_streak = state.streak;
            state.streak = 0;
            self.stats.missed += 1;
            let feedback = TrainerFeedback::MissedBeat {
                lost_streak,
                timestamp_ms: tick.timestamp_ms,
            };
            log::debug!("[Trainer] Missed beat {} (lost streak {})", tick.beat_index, lost_streak);
            self.last_feedback = Some(feedback.clone());
            effects.push(TrainerEffect::Feedback(feedback));
        }

        state.hit_this_beat = false;
        state.last_beat_ms = Some(tick.timestamp_ms);
    }
}

/// Evaluate a note during training. Returns the feedback for an accepted
/// hit; anything else is ignored without touching state.
fn evaluate_hit(
    state: &mut TrainingState,
    window: &TimingWindow,
    config: &TrainerConfig,
    stats: &mut HitStats,
    note: PitchClass,
    timestamp_ms: f64,
    effects: &mut Vec<TrainerEffect>,
) -> Option<TrainerFeedback> {
    let last_beat_ms = state.last_beat_ms?;
    if state.hit_this_beat || state.pattern.get(state.cursor) != Some(note) {
        return None;
    }
    let evaluation = window.evaluate(timestamp_ms - last_beat_ms, state.bpm)?;

    state.hit_this_beat = true;
    stats.record(evaluation.precision);
    state.cursor += 1;

    let hit = TrainerFeedback::Hit {
        precision: evaluation.precision,
        offset_ms: evaluation.offset_ms,
        normalized_offset: evaluation.normalized_offset,
        timestamp_ms,
    };

    if state.cursor < state.pattern.len() {
        return Some(hit);
    }

    state.cursor = 0;
    state.streak += 1;

    if config.level_up_every == 0 || state.streak % config.level_up_every != 0 {
        return Some(hit);
    }

    let next_bpm = (state.bpm + config.bpm_increment).min(config.target_bpm);
    if next_bpm != state.bpm {
        state.bpm = next_bpm;
        effects.push(TrainerEffect::Clock(ClockCommand::SetBpm { bpm: next_bpm }));
    }
    log::info!("[Trainer] Level up: streak {} at {} BPM", state.streak, state.bpm);

    Some(TrainerFeedback::LevelUp {
        bpm: state.bpm,
        streak: state.streak,
        timestamp_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use PitchClass::*;

    fn simple_session() -> TrainerSession {
        let config = TrainerConfig {
            complexity: ComplexityMode::Simple,
            ..TrainerConfig::default()
        };
        TrainerSession::new(config)
    }

    fn note(session: &mut TrainerSession, pc: PitchClass, t: f64) -> Vec<TrainerEffect> {
        session.apply(TrainerEvent::Note {
            pitch_class: pc,
            timestamp_ms: t,
        })
    }

    fn tick(session: &mut TrainerSession, index: u64, t: f64) -> Vec<TrainerEffect> {
        session.apply(TrainerEvent::Tick(BeatTick {
            beat_index: index,
            beat_in_bar: (index % 4) as u32 + 1,
            timestamp_ms: t,
            bpm: session.bpm(),
        }))
    }

    fn feed(session: &mut TrainerSession, notes: &[PitchClass]) {
        for (i, &pc) in notes.iter().enumerate() {
            note(session, pc, i as f64);
        }
    }

    /// Start, learn [E F G] and confirm it until training begins
    fn trained_session() -> TrainerSession {
        let mut session = simple_session();
        session.apply(TrainerEvent::Start { complexity: None });
        let cycle = [E, F, G];
        for _ in 0..6 {
            feed(&mut session, &cycle);
        }
        assert_eq!(session.phase_kind(), PhaseKind::Training);
        session
    }

    /// Play one full cycle on the beat, one note per tick
    fn play_cycle(session: &mut TrainerSession, beat: &mut u64) -> Vec<TrainerEffect> {
        let mut effects = Vec::new();
        for &pc in &[E, F, G] {
            let t = *beat as f64 * 1000.0;
            effects.extend(tick(session, *beat, t));
            effects.extend(note(session, pc, t));
            *beat += 1;
        }
        effects
    }

    #[test]
    fn test_idle_ignores_notes() {
        let mut session = simple_session();
        assert!(note(&mut session, C, 0.0).is_empty());
        assert_eq!(session.phase_kind(), PhaseKind::Idle);
        assert_eq!(session.bpm(), 80.0);
    }

    #[test]
    fn test_learning_detects_pattern_and_locks() {
        let mut session = simple_session();
        session.apply(TrainerEvent::Start { complexity: None });
        feed(&mut session, &[E, F, G, E, F]);
        assert_eq!(session.phase_kind(), PhaseKind::Learning);

        let effects = note(&mut session, G, 5.0);
        assert!(effects.contains(&TrainerEffect::PatternLearned(
            LearnedPattern::new(vec![E, F, G]).unwrap()
        )));
        assert!(effects.contains(&TrainerEffect::PhaseChanged {
            from: PhaseKind::Learning,
            to: PhaseKind::Locked
        }));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.pattern, Some(vec![E, F, G]));
        assert_eq!(snapshot.confirmations, 1);
        assert_eq!(snapshot.cursor, 0);
    }

    #[test]
    fn test_reference_sequence_reaches_training() {
        let mut session = simple_session();
        session.apply(TrainerEvent::Start { complexity: None });
        // Lock after two cycles, then 4 more verified cycles
        let mut all_effects = Vec::new();
        for _ in 0..6 {
            for &pc in &[E, F, G] {
                all_effects.extend(note(&mut session, pc, 0.0));
            }
        }
        assert_eq!(session.phase_kind(), PhaseKind::Training);
        assert!(all_effects.contains(&TrainerEffect::Clock(ClockCommand::Start { bpm: 80.0 })));
        let confirmations = all_effects
            .iter()
            .filter(|e| matches!(e, TrainerEffect::Confirmation { .. }))
            .count();
        assert_eq!(confirmations, 4);
    }

    #[test]
    fn test_locked_stays_locked_until_enough_confirmations() {
        let mut session = simple_session();
        session.apply(TrainerEvent::Start { complexity: None });
        feed(&mut session, &[E, F, G, E, F, G, E, F, G, E, F, G]);
        assert_eq!(session.phase_kind(), PhaseKind::Locked);
        assert_eq!(session.snapshot().confirmations, 3);
    }

    #[test]
    fn test_locked_ignores_wrong_notes_without_losing_progress() {
        let mut session = simple_session();
        session.apply(TrainerEvent::Start { complexity: None });
        feed(&mut session, &[E, F, G, E, F, G]);
        note(&mut session, E, 0.0);
        note(&mut session, C, 0.0);
        assert_eq!(session.snapshot().cursor, 1);
    }

    #[test]
    fn test_locked_skip_ahead_tolerates_one_missed_note() {
        let mut session = simple_session();
        session.apply(TrainerEvent::Start { complexity: None });
        feed(&mut session, &[E, F, G, E, F, G]);
        // F skipped: G matches cursor + 1
        note(&mut session, E, 0.0);
        note(&mut session, G, 0.0);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.cursor, 0);
        assert_eq!(snapshot.confirmations, 2);
    }

    #[test]
    fn test_locked_skip_ahead_can_over_advance_on_repeated_notes() {
        // Known edge case: with [A A B], playing A then B skips the second
        // A and still completes a full cycle
        let mut session = simple_session();
        session.apply(TrainerEvent::Start { complexity: None });
        feed(&mut session, &[A, A, B, A, A, B]);
        assert_eq!(session.snapshot().pattern, Some(vec![A, A, B]));

        note(&mut session, A, 0.0);
        note(&mut session, B, 0.0);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.confirmations, 2);
        assert_eq!(snapshot.cursor, 0);
    }

    #[test]
    fn test_training_hit_on_beat_is_perfect() {
        let mut session = trained_session();
        tick(&mut session, 0, 1000.0);
        let effects = note(&mut session, E, 1000.0);
        match &effects[..] {
            [TrainerEffect::Feedback(TrainerFeedback::Hit { precision, .. })] => {
                assert_eq!(*precision, HitPrecision::Perfect);
            }
            other => panic!("unexpected effects {:?}", other),
        }
        assert_eq!(session.snapshot().cursor, 1);
        assert_eq!(session.snapshot().stats.perfect, 1);
    }

    #[test]
    fn test_training_ignores_notes_before_first_tick() {
        let mut session = trained_session();
        assert!(note(&mut session, E, 10.0).is_empty());
        assert_eq!(session.snapshot().cursor, 0);
    }

    #[test]
    fn test_training_ignores_off_cursor_and_double_hits() {
        let mut session = trained_session();
        tick(&mut session, 0, 0.0);
        assert!(note(&mut session, F, 0.0).is_empty());
        assert_eq!(note(&mut session, E, 0.0).len(), 1);
        // Hit flag already set for this beat
        assert!(note(&mut session, F, 10.0).is_empty());
        assert_eq!(session.snapshot().cursor, 1);
    }

    #[test]
    fn test_training_mistimed_note_is_ignored_not_missed() {
        let mut session = trained_session();
        // 80 BPM: period 750ms, tolerance 300ms, half period 375ms
        tick(&mut session, 0, 0.0);
        assert!(note(&mut session, E, 350.0).is_empty());
        let snapshot = session.snapshot();
        assert_eq!(snapshot.cursor, 0);
        assert_eq!(snapshot.stats, HitStats::default());
    }

    #[test]
    fn test_full_cycle_increments_streak() {
        let mut session = trained_session();
        let mut beat = 0;
        play_cycle(&mut session, &mut beat);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.streak, 1);
        assert_eq!(snapshot.best_streak, 1);
        assert_eq!(snapshot.cursor, 0);
    }

    #[test]
    fn test_tempo_ramp_reaches_95_after_nine_cycles() {
        let mut session = trained_session();
        let mut beat = 0;
        let mut level_ups = 0;
        for _ in 0..9 {
            for effect in play_cycle(&mut session, &mut beat) {
                if let TrainerEffect::Feedback(TrainerFeedback::LevelUp { .. }) = effect {
                    level_ups += 1;
                }
            }
        }
        assert_eq!(level_ups, 3);
        assert_eq!(session.bpm(), 95.0);
        assert_eq!(session.snapshot().streak, 9);
    }

    #[test]
    fn test_tempo_never_exceeds_target() {
        let mut session = trained_session();
        let mut beat = 0;
        let mut set_bpm_commands = 0;
        for _ in 0..120 {
            for effect in play_cycle(&mut session, &mut beat) {
                if let TrainerEffect::Clock(ClockCommand::SetBpm { bpm }) = effect {
                    assert!(bpm <= 140.0);
                    set_bpm_commands += 1;
                }
            }
            assert!(session.bpm() <= 140.0);
        }
        assert_eq!(session.bpm(), 140.0);
        // 80 -> 140 in steps of 5; capped level ups send no command
        assert_eq!(set_bpm_commands, 12);
    }

    #[test]
    fn test_missed_beat_resets_streak() {
        let mut session = trained_session();
        let mut beat = 0;
        play_cycle(&mut session, &mut beat);
        assert_eq!(session.snapshot().streak, 1);

        // A beat with no hit, then the following tick detects the miss
        tick(&mut session, beat, beat as f64 * 1000.0);
        beat += 1;
        let effects = tick(&mut session, beat, beat as f64 * 1000.0);
        assert!(effects.iter().any(|e| matches!(
            e,
            TrainerEffect::Feedback(TrainerFeedback::MissedBeat { lost_streak: 1, .. })
        )));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.streak, 0);
        assert_eq!(snapshot.best_streak, 1);
        assert_eq!(snapshot.stats.missed, 1);
    }

    #[test]
    fn test_no_miss_without_running_streak() {
        let mut session = trained_session();
        for beat in 0..4 {
            assert!(tick(&mut session, beat, beat as f64 * 1000.0).is_empty());
        }
    }

    #[test]
    fn test_reset_from_every_phase_returns_to_idle() {
        let make_learning = || {
            let mut s = simple_session();
            s.apply(TrainerEvent::Start { complexity: None });
            feed(&mut s, &[C, D]);
            s
        };
        let make_locked = || {
            let mut s = simple_session();
            s.apply(TrainerEvent::Start { complexity: None });
            feed(&mut s, &[C, D, C, D]);
            s
        };
        let make_training = || {
            let mut s = trained_session();
            let mut beat = 0;
            for _ in 0..3 {
                play_cycle(&mut s, &mut beat);
            }
            assert_eq!(s.bpm(), 85.0);
            s
        };

        for mut session in [make_learning(), make_locked(), make_training()] {
            let effects = session.apply(TrainerEvent::Reset);
            assert!(effects.contains(&TrainerEffect::Clock(ClockCommand::Stop)));

            let snapshot = session.snapshot();
            assert_eq!(snapshot.phase, PhaseKind::Idle);
            assert_eq!(snapshot.pattern, None);
            assert_eq!(snapshot.streak, 0);
            assert_eq!(snapshot.best_streak, 0);
            assert_eq!(snapshot.cursor, 0);
            assert_eq!(snapshot.bpm, 80.0);
            assert_eq!(snapshot.last_feedback, None);
        }
    }

    #[test]
    fn test_stop_is_safe_in_idle() {
        let mut session = simple_session();
        let effects = session.apply(TrainerEvent::Stop);
        assert_eq!(effects, vec![TrainerEffect::Clock(ClockCommand::Stop)]);
        assert_eq!(session.phase_kind(), PhaseKind::Idle);
    }

    #[test]
    fn test_tick_after_stop_is_ignored() {
        let mut session = trained_session();
        session.apply(TrainerEvent::Stop);
        assert!(tick(&mut session, 0, 0.0).is_empty());
    }

    #[test]
    fn test_restart_while_training_stops_clock_and_relearns() {
        let mut session = trained_session();
        let effects = session.apply(TrainerEvent::Start {
            complexity: Some(ComplexityMode::Complex),
        });
        assert_eq!(effects[0], TrainerEffect::Clock(ClockCommand::Stop));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, PhaseKind::Learning);
        assert_eq!(snapshot.complexity, ComplexityMode::Complex);
        assert_eq!(snapshot.pattern, None);
    }
}
