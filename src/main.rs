use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};

use phonicspath::{
    AdaptiveDifficultyController, DailyGoalTracker, FileStorage, ProfileStorage, SessionStore,
    Storage, SystemClock, WordReviewScheduler, config::Config, create_auto_flow_session, logging,
    recommended_mode,
    session::{SessionMode, create_menu_session},
    ui,
};

/// Words handed to a guided session: two warm-up, three practice, two
/// challenge and two cool-down.
const GUIDED_SESSION_WORDS: usize = 9;

#[derive(Parser)]
#[command(version, about = "Track a young reader's phonics and math practice")]
struct Cli {
    /// Directory holding the progress files
    #[arg(long, global = true, env = "PHONICSPATH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Child profile to read and write
    #[arg(long, global = true, env = "PHONICSPATH_PROFILE")]
    profile: Option<String>,

    /// tracing filter, e.g. `debug` or `phonicspath=info`
    #[arg(long, global = true, env = "PHONICSPATH_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one read of a word
    Review {
        word: String,
        unit: u32,
        /// How fluently the word was read, 0.0 to 1.0
        smoothness: f64,
        /// The child needed help
        #[arg(long)]
        assisted: bool,
    },
    /// List words that are due for review
    Due {
        #[arg(long)]
        max_unit: Option<u32>,
    },
    /// Pick words for a practice session from a pool
    Words {
        #[arg(long)]
        unit: u32,
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(required = true)]
        pool: Vec<String>,
    },
    /// Show stats for one word, or for everything
    Stats {
        word: Option<String>,
        #[arg(long)]
        max_unit: Option<u32>,
    },
    /// Forget every word review
    ResetReviews,
    /// Record a mini-game attempt
    Attempt {
        problem_id: String,
        #[arg(long)]
        correct: bool,
        #[arg(long, default_value_t = 1)]
        tries: u32,
        /// Difficulty the problem was shown at; defaults to the current one
        #[arg(long)]
        difficulty: Option<u8>,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Show or change the adaptive difficulty
    Difficulty {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        set: Option<u8>,
        #[arg(long, conflicts_with = "set")]
        reset: bool,
    },
    /// Guided session planning
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Daily practice goal
    Goal {
        #[command(subcommand)]
        action: Option<GoalAction>,
    },
    /// Count an activity's elapsed seconds toward today's goal
    Track { seconds: f64 },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Start a new session for a unit
    Start {
        #[arg(long)]
        unit: u32,
        /// Units finished so far; decides between guided and free play
        #[arg(long, default_value_t = 0)]
        completed_units: u32,
        pool: Vec<String>,
    },
    /// Show the current session
    Show,
    /// Mark the current step done
    Next,
    /// Throw the current session away
    Clear,
}

#[derive(Subcommand)]
enum GoalAction {
    /// Set the daily goal in minutes (5 to 60)
    Set { minutes: u32 },
    /// Add practice minutes
    Add { minutes: f64 },
}

fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let files = FileStorage::open(&config.data_dir)
        .with_context(|| format!("opening {}", config.data_dir.display()))?;
    let storage: Arc<dyn Storage> = match &config.profile {
        Some(profile) => Arc::new(ProfileStorage::new(files, profile)),
        None => Arc::new(files),
    };
    Ok(storage)
}

fn difficulty_controller(
    storage: Arc<dyn Storage>,
    subject: Option<&str>,
) -> AdaptiveDifficultyController<Arc<dyn Storage>, SystemClock> {
    match subject {
        Some(subject) => AdaptiveDifficultyController::for_subject(storage, SystemClock, subject),
        None => AdaptiveDifficultyController::new(storage, SystemClock),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.data_dir, cli.profile, cli.log_level)?;
    logging::init_tracing(&config.log_level);

    let storage = open_storage(&config)?;
    let mut stdout = std::io::stdout();
    let scheduler = WordReviewScheduler::new(storage.clone(), SystemClock);
    let goals = DailyGoalTracker::new(storage.clone(), SystemClock);

    match cli.command {
        Command::Review {
            word,
            unit,
            smoothness,
            assisted,
        } => {
            let review = scheduler.record_review(&word, unit, smoothness, !assisted);
            ui::print_review(&mut stdout, &review)?;
        }
        Command::Due { max_unit } => {
            ui::print_due_words(&mut stdout, &scheduler.get_due_words(max_unit))?;
        }
        Command::Words { unit, count, pool } => {
            let words = scheduler.get_session_words(&pool, unit, count, &mut rand::rng());
            ui::print_word_list(&mut stdout, "Practice words", &words)?;
        }
        Command::Stats {
            word: Some(word), ..
        } => {
            ui::print_word_stats(&mut stdout, &word, scheduler.get_word_stats(&word).as_ref())?;
        }
        Command::Stats {
            word: None,
            max_unit,
        } => {
            ui::print_blending_stats(&mut stdout, &scheduler.get_overall_blending_stats(max_unit))?;
        }
        Command::ResetReviews => scheduler.reset_all_reviews(),
        Command::Attempt {
            problem_id,
            correct,
            tries,
            difficulty,
            subject,
        } => {
            let controller = difficulty_controller(storage, subject.as_deref());
            let difficulty = difficulty.unwrap_or_else(|| controller.current_difficulty());
            let state = controller.record_attempt(&problem_id, correct, tries, difficulty);
            ui::print_difficulty(&mut stdout, &state)?;
        }
        Command::Difficulty {
            subject,
            set,
            reset,
        } => {
            let controller = difficulty_controller(storage, subject.as_deref());
            if reset {
                controller.reset();
            } else if let Some(level) = set {
                controller.set_difficulty(level);
            }
            ui::print_difficulty(&mut stdout, &controller.state())?;
            ui::print_summary(&mut stdout, &controller.performance_summary())?;
        }
        Command::Session { action } => {
            let store = SessionStore::new(storage);
            match action {
                SessionAction::Start {
                    unit,
                    completed_units,
                    pool,
                } => {
                    let total_reviews = scheduler.get_overall_blending_stats(None).total_reviews;
                    let plan = match recommended_mode(completed_units, total_reviews) {
                        SessionMode::Auto => {
                            let words = scheduler.get_session_words(
                                &pool,
                                unit,
                                GUIDED_SESSION_WORDS,
                                &mut rand::rng(),
                            );
                            create_auto_flow_session(unit, &words)
                        }
                        SessionMode::Menu => create_menu_session(unit),
                    };
                    store.save(&plan);
                    ui::print_plan(&mut stdout, &plan)?;
                }
                SessionAction::Show => match store.load() {
                    Some(plan) => ui::print_plan(&mut stdout, &plan)?,
                    None => println!("No session in progress."),
                },
                SessionAction::Next => match store.advance() {
                    Some(plan) => ui::print_plan(&mut stdout, &plan)?,
                    None => println!("No session in progress."),
                },
                SessionAction::Clear => store.clear(),
            }
        }
        Command::Goal { action } => {
            match action {
                Some(GoalAction::Set { minutes }) => {
                    goals.set_daily_goal(minutes);
                }
                Some(GoalAction::Add { minutes }) => {
                    goals.add_minutes(minutes);
                }
                None => {}
            }
            ui::print_goal(
                &mut stdout,
                &goals.state(),
                goals.today_progress(),
                goals.minutes_remaining(),
            )?;
        }
        Command::Track { seconds } => {
            let minutes = goals.track_activity(seconds);
            if minutes == 0.0 {
                println!("Under 30 seconds, not counted.");
            }
            ui::print_goal(
                &mut stdout,
                &goals.state(),
                goals.today_progress(),
                goals.minutes_remaining(),
            )?;
        }
    }

    Ok(())
}
