//! Learning progression engine for early-literacy practice: spaced review of
//! blending words, adaptive difficulty for mini-games, guided session plans
//! and daily practice goals.
//!
//! Every component keeps its state as one JSON document in a [`Storage`]
//! backend and reads time from a [`Clock`], so both can be swapped out.

pub mod clock;
pub mod config;
pub mod difficulty;
pub mod goals;
pub mod logging;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod ui;

pub use clock::{Clock, ManualClock, SystemClock};
pub use difficulty::{AdaptiveDifficultyController, filter_problems_by_difficulty};
pub use goals::{ActivityTimer, DailyGoalTracker};
pub use scheduler::WordReviewScheduler;
pub use session::{SessionPlan, SessionStore, create_auto_flow_session, recommended_mode};
pub use storage::{FileStorage, MemoryStorage, ProfileStorage, Storage, StorageError};
