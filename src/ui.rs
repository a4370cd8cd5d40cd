use std::io::Write;

use crossterm::{
    execute,
    style::{Print, Stylize},
};

use crate::{
    difficulty::{AdaptiveDifficultyState, DifficultyTrend, PerformanceSummary},
    goals::DailyGoalState,
    scheduler::{BlendingStats, WordReviewData, WordStats},
    session::{ActivityType, SessionMode, SessionPlan},
};

const BAR_WIDTH: usize = 20;

/// `[#####-----]` style bar for a percentage.
pub fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn label(out: &mut impl Write, name: &str, value: impl std::fmt::Display) -> anyhow::Result<()> {
    execute!(
        out,
        Print(format!("{name:>16}: ").dark_grey()),
        Print(format!("{value}\r\n"))
    )?;
    Ok(())
}

fn heading(out: &mut impl Write, text: &str) -> anyhow::Result<()> {
    execute!(out, Print(format!("{text}\r\n").yellow().bold()))?;
    Ok(())
}

pub fn print_review(out: &mut impl Write, review: &WordReviewData) -> anyhow::Result<()> {
    heading(out, &review.word)?;
    label(out, "unit", review.unit_id)?;
    label(
        out,
        "reviews",
        format!(
            "{} ({} ok, {} missed)",
            review.review_count, review.success_count, review.failure_count
        ),
    )?;
    label(out, "interval", format!("{} day(s)", review.interval))?;
    label(out, "ease", format!("{:.2}", review.ease_factor))?;
    label(out, "smoothness", format!("{:.2}", review.avg_smoothness_score))?;
    label(out, "next due", review.next_due_at.format("%Y-%m-%d %H:%M"))?;
    if review.blending_mastered {
        execute!(out, Print("mastered!\r\n".green().bold()))?;
    }
    Ok(())
}

pub fn print_word_stats(out: &mut impl Write, word: &str, stats: Option<&WordStats>) -> anyhow::Result<()> {
    let Some(stats) = stats else {
        execute!(out, Print(format!("{word}: not practiced yet\r\n").dark_grey()))?;
        return Ok(());
    };
    heading(out, &stats.word)?;
    label(out, "reviews", stats.review_count)?;
    label(out, "success rate", format!("{:.0}%", stats.success_rate * 100.0))?;
    label(out, "smoothness", format!("{:.2}", stats.avg_smoothness))?;
    label(out, "mastered", stats.mastered)?;
    label(out, "due in", format!("{} day(s)", stats.days_until_due))?;
    Ok(())
}

pub fn print_due_words(out: &mut impl Write, due: &[WordReviewData]) -> anyhow::Result<()> {
    if due.is_empty() {
        execute!(out, Print("Nothing due right now.\r\n".green()))?;
        return Ok(());
    }
    heading(out, &format!("{} word(s) due", due.len()))?;
    for review in due {
        execute!(
            out,
            Print(format!("{:<12}", review.word).bold()),
            Print(format!(
                " unit {:<3} due {}\r\n",
                review.unit_id,
                review.next_due_at.format("%Y-%m-%d %H:%M")
            ))
        )?;
    }
    Ok(())
}

pub fn print_word_list(out: &mut impl Write, title: &str, words: &[String]) -> anyhow::Result<()> {
    heading(out, title)?;
    execute!(out, Print(format!("{}\r\n", words.join(" "))))?;
    Ok(())
}

pub fn print_blending_stats(out: &mut impl Write, stats: &BlendingStats) -> anyhow::Result<()> {
    heading(out, "Blending")?;
    label(out, "words", stats.total_words)?;
    label(out, "mastered", stats.mastered_words)?;
    label(out, "in progress", stats.in_progress_words)?;
    label(out, "due", stats.due_words)?;
    label(out, "smoothness", format!("{:.2}", stats.average_smoothness))?;
    Ok(())
}

pub fn print_difficulty(out: &mut impl Write, state: &AdaptiveDifficultyState) -> anyhow::Result<()> {
    label(out, "difficulty", format!("{}/5", state.current_difficulty))?;
    label(out, "hints", if state.show_hints { "on" } else { "off" })?;
    label(
        out,
        "streak",
        format!("{} (best {})", state.streak_count, state.longest_streak),
    )?;
    Ok(())
}

pub fn print_summary(out: &mut impl Write, summary: &PerformanceSummary) -> anyhow::Result<()> {
    heading(out, "Performance")?;
    label(
        out,
        "attempts",
        format!("{} ({} correct)", summary.total_attempts, summary.correct_attempts),
    )?;
    label(out, "success rate", format!("{:.0}%", summary.success_rate * 100.0))?;
    label(out, "tries/problem", format!("{:.1}", summary.average_attempts))?;
    label(out, "difficulty", format!("{}/5", summary.current_difficulty))?;
    let trend = match summary.trend {
        DifficultyTrend::Increasing => "increasing".green(),
        DifficultyTrend::Decreasing => "decreasing".red(),
        DifficultyTrend::Stable => "stable".white(),
    };
    label(out, "trend", trend)?;
    execute!(out, Print(format!("{}\r\n", summary.recommendation).cyan()))?;
    Ok(())
}

fn activity_name(activity: ActivityType) -> &'static str {
    match activity {
        ActivityType::Tap => "tap",
        ActivityType::Segment => "segment",
        ActivityType::Slider => "slider",
        ActivityType::Sentence => "sentence",
    }
}

pub fn print_plan(out: &mut impl Write, plan: &SessionPlan) -> anyhow::Result<()> {
    match plan.mode {
        SessionMode::Menu => {
            heading(out, &format!("Unit {}: free play", plan.current_unit))?;
            return Ok(());
        }
        SessionMode::Auto => heading(out, &format!("Unit {}: guided session", plan.current_unit))?,
    }
    for (i, step) in plan.steps.iter().enumerate() {
        let marker = if i < plan.current_step {
            "x".green()
        } else if i == plan.current_step {
            ">".yellow()
        } else {
            " ".white()
        };
        let target = step
            .word
            .as_deref()
            .or(step.sentence.as_deref())
            .unwrap_or("-");
        execute!(
            out,
            Print(marker),
            Print(format!(
                " {:>2}. {:<9} {}\r\n",
                i + 1,
                activity_name(step.activity_type),
                target
            ))
        )?;
    }
    label(
        out,
        "progress",
        format!("{} {:.0}%", progress_bar(plan.progress(), BAR_WIDTH), plan.progress()),
    )?;
    if plan.is_complete() {
        execute!(out, Print("Session complete!\r\n".green().bold()))?;
    }
    Ok(())
}

pub fn print_goal(
    out: &mut impl Write,
    state: &DailyGoalState,
    progress: f64,
    remaining: f64,
) -> anyhow::Result<()> {
    heading(out, "Today")?;
    label(
        out,
        "minutes",
        format!("{:.1} / {}", state.today_minutes, state.daily_goal_minutes),
    )?;
    label(out, "progress", format!("{} {progress:.0}%", progress_bar(progress, BAR_WIDTH)))?;
    if remaining > 0.0 {
        label(out, "remaining", format!("{remaining:.1} min"))?;
    } else {
        execute!(out, Print("Goal reached!\r\n".green().bold()))?;
    }
    label(
        out,
        "streak",
        format!("{} day(s) (best {})", state.current_streak, state.longest_streak),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::create_auto_flow_session;

    #[test]
    fn bars() {
        assert_eq!(progress_bar(0.0, 4), "[----]");
        assert_eq!(progress_bar(50.0, 4), "[##--]");
        assert_eq!(progress_bar(250.0, 4), "[####]");
    }

    #[test]
    fn plan_lists_every_step() {
        let plan = create_auto_flow_session(1, &["cat", "dog", "sun"]);
        let mut out = Vec::new();
        print_plan(&mut out, &plan).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("guided session"));
        assert!(text.contains("segment"));
        assert!(text.contains("sun"));
    }
}
