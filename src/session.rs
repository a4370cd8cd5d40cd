//! Guided session planning.
//!
//! Beginners get a fixed "auto" sequence of activities built from a word list;
//! everyone else gets the free "menu". Plans are persisted whole so a session
//! survives a reload.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{self, Storage};

pub const STORAGE_KEY: &str = "current-session";

const WARM_UP_WORDS: usize = 2;
const PRACTICE_WORDS: usize = 3;
const CHALLENGE_WORDS: usize = 2;
const COOL_DOWN_WORDS: usize = 2;
const SENTENCE_MIN_UNIT: u32 = 2;

const GUIDED_MAX_COMPLETED_UNITS: u32 = 2;
const GUIDED_MAX_REVIEWS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Auto,
    Menu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Tap,
    Segment,
    Slider,
    Sentence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStep {
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
}

impl SessionStep {
    fn word(activity_type: ActivityType, word: &str, difficulty: u8) -> Self {
        Self {
            activity_type,
            word: Some(word.to_owned()),
            sentence: None,
            difficulty: Some(difficulty),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub mode: SessionMode,
    pub current_unit: u32,
    pub total_steps: usize,
    pub current_step: usize,
    pub steps: Vec<SessionStep>,
}

/// Builds the guided sequence: warm-up taps, segmenting practice, slider
/// challenges, a sentence from unit 2 on, and cool-down taps. Zones are cut
/// short when `words` runs out.
pub fn create_auto_flow_session<W: AsRef<str>>(current_unit: u32, words: &[W]) -> SessionPlan {
    let zone = |start: usize, len: usize| {
        words
            .iter()
            .skip(start)
            .take(len)
            .map(AsRef::<str>::as_ref)
            .collect::<Vec<&str>>()
    };

    let practice_start = WARM_UP_WORDS;
    let challenge_start = practice_start + PRACTICE_WORDS;
    let cool_down_start = challenge_start + CHALLENGE_WORDS;

    let mut steps = Vec::new();
    steps.extend(
        zone(0, WARM_UP_WORDS)
            .into_iter()
            .map(|w| SessionStep::word(ActivityType::Tap, w, 1)),
    );
    steps.extend(
        zone(practice_start, PRACTICE_WORDS)
            .into_iter()
            .map(|w| SessionStep::word(ActivityType::Segment, w, 1)),
    );
    steps.extend(
        zone(challenge_start, CHALLENGE_WORDS)
            .into_iter()
            .map(|w| SessionStep::word(ActivityType::Slider, w, 2)),
    );
    if current_unit >= SENTENCE_MIN_UNIT {
        steps.push(SessionStep {
            activity_type: ActivityType::Sentence,
            word: None,
            sentence: None,
            difficulty: Some(1),
        });
    }
    steps.extend(
        zone(cool_down_start, COOL_DOWN_WORDS)
            .into_iter()
            .map(|w| SessionStep::word(ActivityType::Tap, w, 1)),
    );

    debug!(current_unit, steps = steps.len(), "built auto-flow session");
    SessionPlan {
        mode: SessionMode::Auto,
        current_unit,
        total_steps: steps.len(),
        current_step: 0,
        steps,
    }
}

pub fn create_menu_session(current_unit: u32) -> SessionPlan {
    SessionPlan {
        mode: SessionMode::Menu,
        current_unit,
        total_steps: 0,
        current_step: 0,
        steps: Vec::new(),
    }
}

/// Guided sessions until the child has finished two units and twenty reviews.
pub fn recommended_mode(completed_units: u32, total_reviews: u32) -> SessionMode {
    if completed_units < GUIDED_MAX_COMPLETED_UNITS || total_reviews < GUIDED_MAX_REVIEWS {
        SessionMode::Auto
    } else {
        SessionMode::Menu
    }
}

impl SessionPlan {
    pub fn next_step(&self) -> Option<&SessionStep> {
        match self.mode {
            SessionMode::Auto => self.steps.get(self.current_step),
            SessionMode::Menu => None,
        }
    }

    /// Moves past the current step. Returns the step that is now current.
    pub fn advance_step(&mut self) -> Option<&SessionStep> {
        if self.mode == SessionMode::Auto && self.current_step < self.total_steps {
            self.current_step += 1;
        }
        self.next_step()
    }

    /// Percentage of steps done, `0..=100`.
    pub fn progress(&self) -> f64 {
        match self.mode {
            SessionMode::Auto if self.total_steps > 0 => {
                self.current_step.min(self.total_steps) as f64 / self.total_steps as f64 * 100.0
            }
            _ => 0.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.mode == SessionMode::Auto && self.current_step >= self.total_steps
    }
}

/// Persists the in-flight session.
pub struct SessionStore<S> {
    storage: S,
    lock: Mutex<()>,
}

impl<S: Storage> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    pub fn save(&self, plan: &SessionPlan) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        storage::save_or_log(&self.storage, STORAGE_KEY, plan);
    }

    pub fn load(&self) -> Option<SessionPlan> {
        storage::load_or_default(&self.storage, STORAGE_KEY)
    }

    pub fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        info!("clearing current session");
        storage::remove_or_log(&self.storage, STORAGE_KEY);
    }

    /// Loads, advances and saves the stored session in one step.
    pub fn advance(&self) -> Option<SessionPlan> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut plan =
            storage::load_or_default::<Option<SessionPlan>, _>(&self.storage, STORAGE_KEY)?;
        plan.advance_step();
        storage::save_or_log(&self.storage, STORAGE_KEY, &plan);
        Some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const NINE: [&str; 9] = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];

    fn kinds(plan: &SessionPlan) -> Vec<ActivityType> {
        plan.steps.iter().map(|s| s.activity_type).collect()
    }

    #[test]
    fn unit_one_has_no_sentence() {
        use ActivityType::*;
        let plan = create_auto_flow_session(1, &NINE);
        assert_eq!(plan.steps.len(), 9);
        assert_eq!(plan.total_steps, 9);
        assert_eq!(
            kinds(&plan),
            vec![Tap, Tap, Segment, Segment, Segment, Slider, Slider, Tap, Tap]
        );
        assert_eq!(plan.steps[5].difficulty, Some(2));
        assert_eq!(plan.steps[8].word.as_deref(), Some("i"));
    }

    #[test]
    fn sentence_slots_before_cool_down() {
        let plan = create_auto_flow_session(2, &NINE);
        assert_eq!(plan.steps.len(), 10);
        assert_eq!(plan.steps[7].activity_type, ActivityType::Sentence);
        assert_eq!(plan.steps[7].word, None);
        assert_eq!(plan.steps[9].activity_type, ActivityType::Tap);
    }

    #[test]
    fn short_word_lists_are_not_padded() {
        let plan = create_auto_flow_session(3, &["a", "b", "c"]);
        assert_eq!(
            kinds(&plan),
            vec![
                ActivityType::Tap,
                ActivityType::Tap,
                ActivityType::Segment,
                ActivityType::Sentence
            ]
        );

        let empty = create_auto_flow_session::<&str>(1, &[]);
        assert!(empty.steps.is_empty());
        assert!(empty.is_complete());
    }

    #[test]
    fn stepping_through_a_session() {
        let mut plan = create_auto_flow_session(1, &["a", "b", "c"]);
        assert_eq!(plan.next_step().and_then(|s| s.word.as_deref()), Some("a"));
        assert_eq!(plan.progress(), 0.0);

        plan.advance_step();
        plan.advance_step();
        assert!((plan.progress() - 200.0 / 3.0).abs() < 1e-9);
        assert!(!plan.is_complete());

        assert!(plan.advance_step().is_none());
        assert!(plan.is_complete());
        assert_eq!(plan.progress(), 100.0);

        plan.advance_step();
        assert_eq!(plan.current_step, 3);
    }

    #[test]
    fn menu_sessions_never_finish() {
        let mut plan = create_menu_session(4);
        assert!(plan.next_step().is_none());
        plan.advance_step();
        assert_eq!(plan.progress(), 0.0);
        assert!(!plan.is_complete());
    }

    #[test]
    fn mode_policy() {
        assert_eq!(recommended_mode(0, 100), SessionMode::Auto);
        assert_eq!(recommended_mode(5, 19), SessionMode::Auto);
        assert_eq!(recommended_mode(2, 20), SessionMode::Menu);
    }

    #[test]
    fn store_round_trip() {
        let store = SessionStore::new(MemoryStorage::new());
        assert!(store.load().is_none());

        let plan = create_auto_flow_session(2, &NINE);
        store.save(&plan);
        assert_eq!(store.load(), Some(plan));

        let advanced = store.advance().unwrap();
        assert_eq!(advanced.current_step, 1);
        assert_eq!(store.load().unwrap().current_step, 1);

        store.clear();
        assert!(store.load().is_none());
        assert!(store.advance().is_none());
    }

    #[test]
    fn serialized_shape() {
        let plan = create_auto_flow_session(1, &["cat"]);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["mode"], "auto");
        assert_eq!(json["totalSteps"], 1);
        assert_eq!(json["steps"][0]["activityType"], "tap");
        assert_eq!(json["steps"][0]["word"], "cat");
        assert!(json["steps"][0].get("sentence").is_none());
    }
}
