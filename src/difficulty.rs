//! Adaptive difficulty for the math and phonics mini-games.
//!
//! Keeps a short rolling window of attempts and nudges the difficulty tier one
//! step at a time based on the recent success rate.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    clock::Clock,
    storage::{self, Storage},
};

pub const STORAGE_KEY: &str = "adaptive-difficulty-state";

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

const PERFORMANCE_WINDOW: usize = 10;
const MIN_ATTEMPTS_FOR_ADJUSTMENT: usize = 3;
const INCREASE_THRESHOLD: f64 = 0.85;
const DECREASE_THRESHOLD: f64 = 0.50;
const HINT_THRESHOLD: f64 = 0.40;
const ATTEMPT_RETENTION_DAYS: i64 = 7;
const TREND_THRESHOLD: f64 = 0.5;
/// Share of exact-difficulty picks, in tenths.
const EXACT_MATCH_TENTHS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub is_correct: bool,
    pub difficulty: u8,
    pub problem_id: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdaptiveDifficultyState {
    pub current_difficulty: u8,
    pub recent_attempts: Vec<AttemptRecord>,
    pub show_hints: bool,
    pub streak_count: u32,
    pub longest_streak: u32,
}

impl Default for AdaptiveDifficultyState {
    fn default() -> Self {
        Self {
            current_difficulty: MIN_DIFFICULTY,
            recent_attempts: Vec::new(),
            show_hints: false,
            streak_count: 0,
            longest_streak: 0,
        }
    }
}

impl AdaptiveDifficultyState {
    /// Success rate over the last [`PERFORMANCE_WINDOW`] attempts.
    fn recent_success_rate(&self) -> f64 {
        let start = self.recent_attempts.len().saturating_sub(PERFORMANCE_WINDOW);
        success_rate(&self.recent_attempts[start..])
    }
}

fn success_rate(attempts: &[AttemptRecord]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    attempts.iter().filter(|a| a.is_correct).count() as f64 / attempts.len() as f64
}

fn mean_difficulty(attempts: &[AttemptRecord]) -> f64 {
    attempts.iter().map(|a| a.difficulty as f64).sum::<f64>() / attempts.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_attempts: usize,
    pub correct_attempts: usize,
    pub success_rate: f64,
    pub average_attempts: f64,
    pub current_difficulty: u8,
    pub trend: DifficultyTrend,
    pub streak_count: u32,
    pub longest_streak: u32,
    pub recommendation: &'static str,
}

fn recommendation(total: usize, rate: f64) -> &'static str {
    if total == 0 {
        "Solve a few problems to get a recommendation."
    } else if rate >= 0.85 {
        "Ready for harder problems!"
    } else if rate >= 0.70 {
        "Doing great, keep practicing at this level."
    } else if rate >= 0.50 {
        "Making progress, keep going."
    } else {
        "Let's practice with some hints."
    }
}

pub struct AdaptiveDifficultyController<S, C> {
    storage: S,
    clock: C,
    key: String,
    state: Mutex<AdaptiveDifficultyState>,
}

impl<S: Storage, C: Clock> AdaptiveDifficultyController<S, C> {
    pub fn new(storage: S, clock: C) -> Self {
        Self::with_key(storage, clock, STORAGE_KEY.to_owned())
    }

    /// A controller whose state is kept apart from every other subject.
    pub fn for_subject(storage: S, clock: C, subject: &str) -> Self {
        Self::with_key(storage, clock, format!("{STORAGE_KEY}:{subject}"))
    }

    fn with_key(storage: S, clock: C, key: String) -> Self {
        let mut state: AdaptiveDifficultyState = storage::load_or_default(&storage, &key);
        let cutoff = clock.now() - Duration::days(ATTEMPT_RETENTION_DAYS);
        state.recent_attempts.retain(|a| a.timestamp >= cutoff);
        state.current_difficulty = state
            .current_difficulty
            .clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

        Self {
            storage,
            clock,
            key,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AdaptiveDifficultyState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> AdaptiveDifficultyState {
        self.lock().clone()
    }

    pub fn current_difficulty(&self) -> u8 {
        self.lock().current_difficulty
    }

    pub fn show_hints(&self) -> bool {
        self.lock().show_hints
    }

    pub fn record_attempt(
        &self,
        problem_id: &str,
        is_correct: bool,
        attempts_taken: u32,
        difficulty: u8,
    ) -> AdaptiveDifficultyState {
        let mut state = self.lock();
        state.recent_attempts.push(AttemptRecord {
            timestamp: self.clock.now(),
            is_correct,
            difficulty,
            problem_id: problem_id.to_owned(),
            attempts: attempts_taken,
        });
        let overflow = state
            .recent_attempts
            .len()
            .saturating_sub(PERFORMANCE_WINDOW * 2);
        state.recent_attempts.drain(..overflow);

        if is_correct {
            state.streak_count += 1;
            state.longest_streak = state.longest_streak.max(state.streak_count);
        } else {
            state.streak_count = 0;
        }

        if state.recent_attempts.len() >= MIN_ATTEMPTS_FOR_ADJUSTMENT {
            let rate = state.recent_success_rate();
            let previous = state.current_difficulty;
            if rate >= INCREASE_THRESHOLD {
                state.current_difficulty = (previous + 1).min(MAX_DIFFICULTY);
            } else if rate < DECREASE_THRESHOLD {
                state.current_difficulty = previous.saturating_sub(1).max(MIN_DIFFICULTY);
            }
            state.show_hints = rate < HINT_THRESHOLD;

            if state.current_difficulty != previous {
                debug!(
                    key = %self.key,
                    rate,
                    from = previous,
                    to = state.current_difficulty,
                    "adjusted difficulty"
                );
            }
        }

        storage::save_or_log(&self.storage, &self.key, &*state);
        state.clone()
    }

    /// Manual override, clamped to the valid tiers.
    pub fn set_difficulty(&self, level: u8) {
        let mut state = self.lock();
        state.current_difficulty = level.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        storage::save_or_log(&self.storage, &self.key, &*state);
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        *state = AdaptiveDifficultyState::default();
        info!(key = %self.key, "reset adaptive difficulty");
        storage::save_or_log(&self.storage, &self.key, &*state);
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let state = self.lock();
        let attempts = &state.recent_attempts;
        let total = attempts.len();
        let correct = attempts.iter().filter(|a| a.is_correct).count();
        let rate = success_rate(attempts);

        let average_attempts = if total > 0 {
            attempts.iter().map(|a| a.attempts as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };

        let (first, second) = attempts.split_at(total / 2);
        let trend = if first.is_empty() {
            DifficultyTrend::Stable
        } else {
            let delta = mean_difficulty(second) - mean_difficulty(first);
            if delta > TREND_THRESHOLD {
                DifficultyTrend::Increasing
            } else if delta < -TREND_THRESHOLD {
                DifficultyTrend::Decreasing
            } else {
                DifficultyTrend::Stable
            }
        };

        PerformanceSummary {
            total_attempts: total,
            correct_attempts: correct,
            success_rate: rate,
            average_attempts,
            current_difficulty: state.current_difficulty,
            trend,
            streak_count: state.streak_count,
            longest_streak: state.longest_streak,
            recommendation: recommendation(total, rate),
        }
    }
}

/// Anything with a difficulty tier.
pub trait Graded {
    fn difficulty(&self) -> u8;
}

/// Samples `count` problems: about 70% at `target`, the rest one tier away,
/// topped up from anything left, in random order.
pub fn filter_problems_by_difficulty<'a, P: Graded>(
    problems: &'a [P],
    target: u8,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<&'a P> {
    let distance = |p: &P| p.difficulty().abs_diff(target);

    let mut exact: Vec<usize> = (0..problems.len())
        .filter(|&i| distance(&problems[i]) == 0)
        .collect();
    exact.shuffle(rng);
    let exact_target = (count * EXACT_MATCH_TENTHS).div_ceil(10).min(count);
    let mut selected: Vec<usize> = exact.into_iter().take(exact_target).collect();

    let mut nearby: Vec<usize> = (0..problems.len())
        .filter(|&i| distance(&problems[i]) == 1)
        .collect();
    nearby.shuffle(rng);
    let missing = count - selected.len();
    selected.extend(nearby.into_iter().take(missing));

    if selected.len() < count {
        let mut rest: Vec<usize> = (0..problems.len())
            .filter(|i| !selected.contains(i))
            .collect();
        rest.shuffle(rng);
        let missing = count - selected.len();
        selected.extend(rest.into_iter().take(missing));
    }

    selected.shuffle(rng);
    selected.into_iter().map(|i| &problems[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, storage::MemoryStorage};
    use chrono::TimeZone;
    use rand::{SeedableRng, rngs::StdRng};
    use std::sync::Arc;

    type Controller = AdaptiveDifficultyController<Arc<MemoryStorage>, Arc<ManualClock>>;

    fn setup() -> (Controller, Arc<MemoryStorage>, Arc<ManualClock>) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 6, 15, 0, 0).unwrap(),
        ));
        (
            AdaptiveDifficultyController::new(storage.clone(), clock.clone()),
            storage,
            clock,
        )
    }

    #[test]
    fn needs_three_attempts_before_adjusting() {
        let (ctl, _, _) = setup();
        ctl.record_attempt("p1", true, 1, 1);
        ctl.record_attempt("p2", true, 1, 1);
        assert_eq!(ctl.current_difficulty(), 1);

        let state = ctl.record_attempt("p3", true, 1, 1);
        assert_eq!(state.current_difficulty, 2);
        let state = ctl.record_attempt("p4", true, 1, 2);
        assert_eq!(state.current_difficulty, 3);
    }

    #[test]
    fn difficulty_caps_and_floors() {
        let (ctl, _, _) = setup();
        ctl.set_difficulty(5);
        for i in 0..4 {
            ctl.record_attempt(&format!("p{i}"), true, 1, 5);
        }
        assert_eq!(ctl.current_difficulty(), MAX_DIFFICULTY);

        ctl.reset();
        for i in 0..4 {
            ctl.record_attempt(&format!("q{i}"), false, 3, 1);
        }
        assert_eq!(ctl.current_difficulty(), MIN_DIFFICULTY);
    }

    #[test]
    fn failing_lowers_difficulty_and_shows_hints() {
        let (ctl, _, _) = setup();
        ctl.set_difficulty(3);
        ctl.record_attempt("a", false, 2, 3);
        ctl.record_attempt("b", false, 2, 3);
        assert!(!ctl.show_hints());

        let state = ctl.record_attempt("c", false, 2, 3);
        assert_eq!(state.current_difficulty, 2);
        assert!(state.show_hints);
    }

    #[test]
    fn middling_rate_holds_steady() {
        let (ctl, _, _) = setup();
        ctl.set_difficulty(2);
        for (i, correct) in [true, false, true, true, false].into_iter().enumerate() {
            ctl.record_attempt(&i.to_string(), correct, 1, 2);
        }
        // 3 of 5 correct
        assert_eq!(ctl.current_difficulty(), 2);
        assert!(!ctl.show_hints());
    }

    #[test]
    fn streaks_track_longest_run() {
        let (ctl, _, _) = setup();
        for correct in [true, true, true, false, true] {
            ctl.record_attempt("p", correct, 1, 1);
        }
        let state = ctl.state();
        assert_eq!(state.streak_count, 1);
        assert_eq!(state.longest_streak, 3);
    }

    #[test]
    fn window_is_bounded() {
        let (ctl, _, _) = setup();
        for i in 0..25 {
            ctl.record_attempt(&i.to_string(), i % 2 == 0, 1, 1);
        }
        let state = ctl.state();
        assert_eq!(state.recent_attempts.len(), PERFORMANCE_WINDOW * 2);
        assert_eq!(state.recent_attempts[0].problem_id, "5");
    }

    #[test]
    fn stale_attempts_dropped_on_load() {
        let (ctl, storage, clock) = setup();
        ctl.record_attempt("old", true, 1, 1);
        clock.advance(Duration::days(6));
        ctl.record_attempt("recent", true, 1, 1);
        clock.advance(Duration::days(2));

        let reloaded = AdaptiveDifficultyController::new(storage, clock);
        let ids: Vec<_> = reloaded
            .state()
            .recent_attempts
            .into_iter()
            .map(|a| a.problem_id)
            .collect();
        assert_eq!(ids, vec!["recent"]);
    }

    #[test]
    fn subjects_are_isolated() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let math = AdaptiveDifficultyController::for_subject(storage.clone(), clock.clone(), "math");
        math.set_difficulty(4);

        let phonics =
            AdaptiveDifficultyController::for_subject(storage.clone(), clock.clone(), "phonics");
        assert_eq!(phonics.current_difficulty(), 1);
        let math_again = AdaptiveDifficultyController::for_subject(storage, clock, "math");
        assert_eq!(math_again.current_difficulty(), 4);
    }

    #[test]
    fn summary_reports_trend_and_recommendation() {
        let (ctl, _, _) = setup();
        for (difficulty, attempts) in [(1, 1), (1, 3), (3, 1), (3, 3)] {
            ctl.record_attempt("p", true, attempts, difficulty);
        }
        let summary = ctl.performance_summary();
        assert_eq!(summary.total_attempts, 4);
        assert_eq!(summary.correct_attempts, 4);
        assert_eq!(summary.average_attempts, 2.0);
        assert_eq!(summary.trend, DifficultyTrend::Increasing);
        assert_eq!(summary.recommendation, "Ready for harder problems!");

        ctl.reset();
        let empty = ctl.performance_summary();
        assert_eq!(empty.trend, DifficultyTrend::Stable);
        assert_eq!(empty.success_rate, 0.0);
    }

    #[test]
    fn recommendation_bands() {
        assert_eq!(recommendation(10, 0.7), "Doing great, keep practicing at this level.");
        assert_eq!(recommendation(10, 0.5), "Making progress, keep going.");
        assert_eq!(recommendation(10, 0.49), "Let's practice with some hints.");
    }

    #[derive(Debug, PartialEq)]
    struct Problem(u8, u32);

    impl Graded for Problem {
        fn difficulty(&self) -> u8 {
            self.0
        }
    }

    #[test]
    fn filter_prefers_target_then_neighbours() {
        let problems: Vec<Problem> = (0..40).map(|i| Problem((i % 5) as u8 + 1, i)).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let picked = filter_problems_by_difficulty(&problems, 3, 10, &mut rng);
        assert_eq!(picked.len(), 10);
        assert_eq!(picked.iter().filter(|p| p.0 == 3).count(), 7);
        assert!(picked.iter().all(|p| p.0.abs_diff(3) <= 1));
    }

    #[test]
    fn filter_backfills_from_anything() {
        let problems = vec![Problem(1, 0), Problem(5, 1), Problem(5, 2)];
        let mut rng = StdRng::seed_from_u64(9);
        let picked = filter_problems_by_difficulty(&problems, 1, 3, &mut rng);
        assert_eq!(picked.len(), 3);

        let mut ids: Vec<u32> = picked.iter().map(|p| p.1).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2]);

        assert!(filter_problems_by_difficulty(&problems, 1, 0, &mut rng).is_empty());
    }
}
