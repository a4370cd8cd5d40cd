//! Daily practice goals and day streaks.

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    clock::Clock,
    storage::{self, Storage},
};

pub const STORAGE_KEY: &str = "daily-goals";

pub const DEFAULT_DAILY_GOAL_MINUTES: u32 = 15;
pub const MIN_DAILY_GOAL_MINUTES: u32 = 5;
pub const MAX_DAILY_GOAL_MINUTES: u32 = 60;

const MIN_TRACKED_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyGoalState {
    pub daily_goal_minutes: u32,
    pub today_minutes: f64,
    pub today_date: NaiveDate,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completed_date: Option<NaiveDate>,
}

impl Default for DailyGoalState {
    fn default() -> Self {
        Self {
            daily_goal_minutes: DEFAULT_DAILY_GOAL_MINUTES,
            today_minutes: 0.0,
            today_date: NaiveDate::MIN,
            current_streak: 0,
            longest_streak: 0,
            last_completed_date: None,
        }
    }
}

impl DailyGoalState {
    fn is_goal_complete(&self) -> bool {
        self.today_minutes >= self.daily_goal_minutes as f64
    }

    /// Completed yesterday or today, so the streak is still alive.
    fn streak_alive(&self, today: NaiveDate) -> bool {
        self.last_completed_date
            .is_some_and(|d| d == today || Some(d) == today.pred_opt())
    }

    fn roll_over(&mut self, today: NaiveDate) {
        if self.today_date == today {
            return;
        }
        debug!(from = %self.today_date, to = %today, "new day");
        self.today_minutes = 0.0;
        self.today_date = today;
        if !self.streak_alive(today) {
            self.current_streak = 0;
        }
    }

    fn add_minutes(&mut self, minutes: f64, today: NaiveDate) {
        let was_complete = self.is_goal_complete();
        self.today_minutes += minutes;
        if was_complete || !self.is_goal_complete() {
            return;
        }

        self.current_streak = match self.last_completed_date {
            Some(d) if d == today => self.current_streak,
            Some(d) if Some(d) == today.pred_opt() => self.current_streak + 1,
            _ => 1,
        };
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_completed_date = Some(today);
        info!(streak = self.current_streak, "daily goal reached");
    }
}

pub struct DailyGoalTracker<S, C> {
    storage: S,
    clock: C,
    lock: Mutex<()>,
}

impl<S: Storage, C: Clock> DailyGoalTracker<S, C> {
    pub fn new(storage: S, clock: C) -> Self {
        Self {
            storage,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Runs `f` on the rolled-over state and writes the result back.
    fn update<R>(&self, f: impl FnOnce(&mut DailyGoalState, NaiveDate) -> R) -> R {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let today = self.clock.today();
        let mut state: DailyGoalState = storage::load_or_default(&self.storage, STORAGE_KEY);
        state.roll_over(today);
        let result = f(&mut state, today);
        storage::save_or_log(&self.storage, STORAGE_KEY, &state);
        result
    }

    pub fn state(&self) -> DailyGoalState {
        self.update(|state, _| state.clone())
    }

    pub fn check_and_reset_day(&self) {
        self.update(|_, _| ());
    }

    /// Sets the goal, clamped to 5–60 minutes.
    pub fn set_daily_goal(&self, minutes: u32) -> u32 {
        self.update(|state, _| {
            state.daily_goal_minutes = minutes.clamp(MIN_DAILY_GOAL_MINUTES, MAX_DAILY_GOAL_MINUTES);
            state.daily_goal_minutes
        })
    }

    pub fn add_minutes(&self, minutes: f64) -> DailyGoalState {
        self.update(|state, today| {
            if minutes.is_finite() && minutes > 0.0 {
                state.add_minutes(minutes, today);
            }
            state.clone()
        })
    }

    /// Forwards an activity's elapsed time. Anything under thirty seconds is
    /// dropped and the rest is counted in half-minute steps. Returns the
    /// minutes recorded.
    pub fn track_activity(&self, elapsed_seconds: f64) -> f64 {
        if elapsed_seconds.is_nan() || elapsed_seconds < MIN_TRACKED_SECONDS {
            return 0.0;
        }
        let minutes = (elapsed_seconds / 30.0).floor() / 2.0;
        self.add_minutes(minutes);
        minutes
    }

    /// Percent of today's goal done, capped at 100.
    pub fn today_progress(&self) -> f64 {
        self.update(|state, _| {
            (state.today_minutes / state.daily_goal_minutes as f64 * 100.0).clamp(0.0, 100.0)
        })
    }

    pub fn is_goal_complete(&self) -> bool {
        self.update(|state, _| state.is_goal_complete())
    }

    pub fn minutes_remaining(&self) -> f64 {
        self.update(|state, _| (state.daily_goal_minutes as f64 - state.today_minutes).max(0.0))
    }
}

/// Measures how long one activity took.
pub struct ActivityTimer<'a, C> {
    clock: &'a C,
    started_at: DateTime<Utc>,
}

impl<'a, C: Clock> ActivityTimer<'a, C> {
    pub fn start(clock: &'a C) -> Self {
        Self {
            clock,
            started_at: clock.now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let elapsed = self.clock.now() - self.started_at;
        (elapsed.num_milliseconds().max(0) as f64) / 1000.0
    }

    /// Stops the timer and hands the elapsed time to `tracker`.
    pub fn finish<S: Storage, T: Clock>(self, tracker: &DailyGoalTracker<S, T>) -> f64 {
        tracker.track_activity(self.elapsed_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, storage::MemoryStorage};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn setup() -> (
        DailyGoalTracker<Arc<MemoryStorage>, Arc<ManualClock>>,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 10, 17, 0, 0).unwrap(),
        ));
        (
            DailyGoalTracker::new(Arc::new(MemoryStorage::new()), clock.clone()),
            clock,
        )
    }

    #[test]
    fn half_the_default_goal() {
        let (tracker, _) = setup();
        tracker.add_minutes(7.5);
        assert_eq!(tracker.today_progress(), 50.0);
        assert_eq!(tracker.minutes_remaining(), 7.5);
        assert!(!tracker.is_goal_complete());
    }

    #[test]
    fn goal_is_clamped() {
        let (tracker, _) = setup();
        assert_eq!(tracker.set_daily_goal(2), 5);
        assert_eq!(tracker.set_daily_goal(100), 60);
        assert_eq!(tracker.state().daily_goal_minutes, 60);
    }

    #[test]
    fn progress_never_exceeds_hundred() {
        let (tracker, _) = setup();
        tracker.add_minutes(500.0);
        assert_eq!(tracker.today_progress(), 100.0);
        assert_eq!(tracker.minutes_remaining(), 0.0);
    }

    #[test]
    fn consecutive_days_build_a_streak() {
        let (tracker, clock) = setup();
        for day in 1..=3 {
            tracker.add_minutes(10.0);
            let state = tracker.add_minutes(10.0);
            assert_eq!(state.current_streak, day);
            // Extra minutes on the same day do not count again.
            assert_eq!(tracker.add_minutes(5.0).current_streak, day);
            clock.advance(Duration::days(1));
        }
        assert_eq!(tracker.state().longest_streak, 3);
    }

    #[test]
    fn skipped_day_resets_streak() {
        let (tracker, clock) = setup();
        tracker.add_minutes(15.0);
        clock.advance(Duration::days(1));
        tracker.add_minutes(15.0);
        assert_eq!(tracker.state().current_streak, 2);

        clock.advance(Duration::days(2));
        assert_eq!(tracker.state().current_streak, 0);
        assert_eq!(tracker.state().today_minutes, 0.0);
        assert_eq!(tracker.add_minutes(15.0).current_streak, 1);
        assert_eq!(tracker.state().longest_streak, 2);
    }

    #[test]
    fn raising_the_goal_after_completion_holds_the_streak() {
        let (tracker, _) = setup();
        tracker.add_minutes(15.0);
        tracker.set_daily_goal(30);
        let state = tracker.add_minutes(15.0);
        assert_eq!(state.current_streak, 1);
    }

    #[test]
    fn short_activities_are_ignored() {
        let (tracker, _) = setup();
        assert_eq!(tracker.track_activity(20.0), 0.0);
        assert_eq!(tracker.state().today_minutes, 0.0);

        assert_eq!(tracker.track_activity(30.0), 0.5);
        assert_eq!(tracker.state().today_minutes, 0.5);

        assert_eq!(tracker.track_activity(100.0), 1.5);
        assert_eq!(tracker.state().today_minutes, 2.0);
    }

    #[test]
    fn timer_feeds_tracker() {
        let (tracker, clock) = setup();
        let timer = ActivityTimer::start(&*clock);
        clock.advance(Duration::seconds(95));
        assert_eq!(timer.elapsed_seconds(), 95.0);
        assert_eq!(timer.finish(&tracker), 1.5);
    }

    #[test]
    fn serialized_shape() {
        let state = DailyGoalState {
            today_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            ..DailyGoalState::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["dailyGoalMinutes"], 15);
        assert_eq!(json["todayDate"], "2024-01-10");
        assert!(json["lastCompletedDate"].is_null());
    }
}
