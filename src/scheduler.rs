//! Spaced-repetition scheduling for blending practice.
//!
//! A simplified SM-2: intervals grow by an ease factor on fluent, independent
//! reads and collapse to zero on anything else. Intervals top out at a week
//! rather than months since the learners are small children.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Mutex,
};

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    clock::Clock,
    storage::{self, Storage},
};

pub const STORAGE_KEY: &str = "word-review-schedule";

pub const MAX_INTERVAL_DAYS: u32 = 7;
pub const INITIAL_EASE_FACTOR: f64 = 1.3;
pub const MIN_EASE_FACTOR: f64 = 0.5;
pub const MAX_EASE_FACTOR: f64 = 3.0;

const SUCCESS_THRESHOLD: f64 = 0.7;
const EXCELLENT_THRESHOLD: f64 = 0.9;
const EXCELLENT_EASE_BONUS: f64 = 0.15;
const EASE_BONUS: f64 = 0.05;
const FAILURE_EASE_PENALTY: f64 = 0.2;

const MASTERY_SUCCESS_COUNT: u32 = 10;
const MASTERY_SMOOTHNESS: f64 = 0.8;
const REVIEW_BUCKET_SUCCESS_COUNT: u32 = 5;

/// Session shares in tenths: 60% review, 30% in progress.
const REVIEW_TENTHS: usize = 6;
const PROGRESS_TENTHS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordReviewData {
    pub word: String,
    pub unit_id: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_due_at: DateTime<Utc>,
    pub interval: u32,
    pub ease_factor: f64,
    pub review_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub last_smoothness_score: Option<f64>,
    pub avg_smoothness_score: f64,
    pub blending_mastered: bool,
}

impl WordReviewData {
    /// A word nobody has practiced yet, due immediately.
    pub fn new(word: &str, unit_id: u32, now: DateTime<Utc>) -> Self {
        Self {
            word: word.to_owned(),
            unit_id,
            last_reviewed_at: None,
            next_due_at: now,
            interval: 0,
            ease_factor: INITIAL_EASE_FACTOR,
            review_count: 0,
            success_count: 0,
            failure_count: 0,
            last_smoothness_score: None,
            avg_smoothness_score: 0.0,
            blending_mastered: false,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due_at <= now
    }

    fn bucket(&self) -> Bucket {
        if self.review_count == 0 {
            Bucket::New
        } else if self.blending_mastered || self.success_count >= REVIEW_BUCKET_SUCCESS_COUNT {
            Bucket::Review
        } else {
            Bucket::InProgress
        }
    }

    fn apply(&mut self, smoothness: f64, was_independent: bool, now: DateTime<Utc>) {
        let success = smoothness >= SUCCESS_THRESHOLD && was_independent;

        self.review_count += 1;
        if success {
            self.success_count += 1;
            self.interval = if self.interval == 0 {
                1
            } else {
                ((self.interval as f64 * self.ease_factor).round() as u32).min(MAX_INTERVAL_DAYS)
            };
            let bonus = if smoothness >= EXCELLENT_THRESHOLD {
                EXCELLENT_EASE_BONUS
            } else {
                EASE_BONUS
            };
            self.ease_factor = (self.ease_factor + bonus).min(MAX_EASE_FACTOR);
        } else {
            self.failure_count += 1;
            self.interval = 0;
            self.ease_factor = (self.ease_factor - FAILURE_EASE_PENALTY).max(MIN_EASE_FACTOR);
        }

        let n = self.review_count as f64;
        self.avg_smoothness_score = (self.avg_smoothness_score * (n - 1.0) + smoothness) / n;
        self.last_smoothness_score = Some(smoothness);
        self.last_reviewed_at = Some(now);
        self.next_due_at = now + Duration::days(self.interval as i64);

        // Recomputed every time, so mastery can in principle be lost again.
        self.blending_mastered = self.success_count >= MASTERY_SUCCESS_COUNT
            && self.avg_smoothness_score >= MASTERY_SMOOTHNESS;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    New,
    InProgress,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordStats {
    pub word: String,
    pub review_count: u32,
    pub success_rate: f64,
    pub avg_smoothness: f64,
    pub mastered: bool,
    pub interval: u32,
    pub ease_factor: f64,
    /// Whole days until the word is due again; zero when already due.
    pub days_until_due: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendingStats {
    pub total_words: usize,
    pub mastered_words: usize,
    pub in_progress_words: usize,
    pub due_words: usize,
    pub total_reviews: u32,
    /// Mean smoothness weighted by how often each word was reviewed.
    pub average_smoothness: f64,
}

type ReviewMap = BTreeMap<String, WordReviewData>;

pub struct WordReviewScheduler<S, C> {
    storage: S,
    clock: C,
    lock: Mutex<()>,
}

impl<S: Storage, C: Clock> WordReviewScheduler<S, C> {
    pub fn new(storage: S, clock: C) -> Self {
        Self {
            storage,
            clock,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> ReviewMap {
        storage::load_or_default(&self.storage, STORAGE_KEY)
    }

    /// The stored record for `word`, or a fresh one. Fresh records are not
    /// persisted until they are reviewed.
    pub fn get_word_review(&self, word: &str, unit_id: u32) -> WordReviewData {
        self.load()
            .remove(word)
            .unwrap_or_else(|| WordReviewData::new(word, unit_id, self.clock.now()))
    }

    /// Records one practice of `word`. `smoothness` is clamped into `[0, 1]`.
    pub fn record_review(
        &self,
        word: &str,
        unit_id: u32,
        smoothness: f64,
        was_independent: bool,
    ) -> WordReviewData {
        let smoothness = if smoothness.is_finite() {
            smoothness.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        let mut reviews = self.load();
        let review = reviews
            .entry(word.to_owned())
            .or_insert_with(|| WordReviewData::new(word, unit_id, now));
        review.apply(smoothness, was_independent, now);
        let updated = review.clone();

        debug!(
            word,
            smoothness,
            interval = updated.interval,
            ease = updated.ease_factor,
            mastered = updated.blending_mastered,
            "recorded review"
        );
        storage::save_or_log(&self.storage, STORAGE_KEY, &reviews);
        updated
    }

    /// Every reviewed word whose due time has passed, most overdue first.
    pub fn get_due_words(&self, max_unit_id: Option<u32>) -> Vec<WordReviewData> {
        let now = self.clock.now();
        let mut due: Vec<_> = self
            .load()
            .into_values()
            .filter(|r| r.is_due(now))
            .filter(|r| max_unit_id.is_none_or(|max| r.unit_id <= max))
            .collect();
        due.sort_by_key(|r| r.next_due_at);
        due
    }

    /// Picks `count` words for a session, mixing review, in-progress and new
    /// words roughly 60/30/10 and topping up from whatever is left.
    pub fn get_session_words<W: AsRef<str>>(
        &self,
        available_words: &[W],
        current_unit_id: u32,
        count: usize,
        rng: &mut impl Rng,
    ) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let reviews = self.load();
        let now = self.clock.now();

        let mut seen = HashSet::new();
        let candidates: Vec<WordReviewData> = available_words
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|w| seen.insert(*w))
            .map(|w| {
                reviews
                    .get(w)
                    .cloned()
                    .unwrap_or_else(|| WordReviewData::new(w, current_unit_id, now))
            })
            .collect();

        let of = |bucket: Bucket| candidates.iter().filter(move |r| r.bucket() == bucket);
        let mut review: Vec<_> = of(Bucket::Review).collect();
        review.sort_by_key(|r| r.next_due_at);
        let progress: Vec<_> = of(Bucket::InProgress).collect();
        let fresh: Vec<_> = of(Bucket::New).collect();

        let target_review = (count * REVIEW_TENTHS).div_ceil(10);
        let target_progress = (count * PROGRESS_TENTHS).div_ceil(10);
        let target_new = count.saturating_sub(target_review + target_progress).max(1);

        let mut selected: Vec<String> = review
            .iter()
            .take(target_review)
            .chain(progress.iter().take(target_progress))
            .chain(fresh.iter().take(target_new))
            .map(|r| r.word.clone())
            .collect();
        selected.truncate(count);

        if selected.len() < count {
            let chosen: HashSet<String> = selected.iter().cloned().collect();
            let backfill: Vec<String> = candidates
                .iter()
                .filter(|r| !chosen.contains(&r.word))
                .take(count - selected.len())
                .map(|r| r.word.clone())
                .collect();
            selected.extend(backfill);
        }

        selected.shuffle(rng);
        selected
    }

    /// `None` until the word has been reviewed at least once.
    pub fn get_word_stats(&self, word: &str) -> Option<WordStats> {
        let review = self.load().remove(word)?;
        if review.review_count == 0 {
            return None;
        }
        let seconds_left = (review.next_due_at - self.clock.now()).num_seconds();
        let days_until_due = if seconds_left <= 0 {
            0
        } else {
            (seconds_left + 86_399) / 86_400
        };

        Some(WordStats {
            success_rate: review.success_count as f64 / review.review_count as f64,
            avg_smoothness: review.avg_smoothness_score,
            mastered: review.blending_mastered,
            review_count: review.review_count,
            interval: review.interval,
            ease_factor: review.ease_factor,
            days_until_due,
            word: review.word,
        })
    }

    pub fn get_overall_blending_stats(&self, max_unit_id: Option<u32>) -> BlendingStats {
        let now = self.clock.now();
        let reviews: Vec<_> = self
            .load()
            .into_values()
            .filter(|r| max_unit_id.is_none_or(|max| r.unit_id <= max))
            .collect();

        let mastered_words = reviews.iter().filter(|r| r.blending_mastered).count();
        let total_reviews: u32 = reviews.iter().map(|r| r.review_count).sum();
        let weighted: f64 = reviews
            .iter()
            .map(|r| r.avg_smoothness_score * r.review_count as f64)
            .sum();

        BlendingStats {
            total_words: reviews.len(),
            mastered_words,
            in_progress_words: reviews.len() - mastered_words,
            due_words: reviews.iter().filter(|r| r.is_due(now)).count(),
            total_reviews,
            average_smoothness: if total_reviews > 0 {
                weighted / total_reviews as f64
            } else {
                0.0
            },
        }
    }

    pub fn reset_all_reviews(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        info!("clearing word review schedule");
        storage::remove_or_log(&self.storage, STORAGE_KEY);
    }
}
