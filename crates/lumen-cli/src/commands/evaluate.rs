//! Evaluate command for running one learner's day through the engine.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use lumen_core::{DayEvaluation, StreakTransition, UserId};

use crate::commands::util::{describe_reward, resolve_date};
use crate::service::Service;

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// Learner ID.
    pub user: String,

    /// Day to evaluate. Defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &EvaluateArgs,
    service: &mut Service,
    today: NaiveDate,
) -> Result<()> {
    let user_id = UserId::new(args.user.as_str()).context("invalid learner id")?;
    let date = resolve_date(args.date.as_deref(), today, today)?;
    let evaluation = service.evaluate_day(&user_id, date)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&evaluation)?)?;
        return Ok(());
    }
    write_text(writer, &user_id, date, &evaluation)
}

fn write_text<W: Write>(
    writer: &mut W,
    user_id: &UserId,
    date: NaiveDate,
    evaluation: &DayEvaluation,
) -> Result<()> {
    let summary = &evaluation.summary;
    let verdict = if evaluation.qualifies {
        "qualified"
    } else {
        "not qualified"
    };
    writeln!(
        writer,
        "{user_id} on {date}: {verdict} ({} lessons, {} questions, {} xp, {} min)",
        summary.lessons_completed,
        summary.questions_answered,
        summary.xp_earned,
        evaluation.time_spent_minutes
    )?;

    let streak = &evaluation.progress.streak;
    let line = match evaluation.transition {
        StreakTransition::Started => format!("started at {}", streak.current_streak),
        StreakTransition::Extended => format!("extended to {}", streak.current_streak),
        StreakTransition::Restarted { previous_streak } => {
            format!("restarted at {} (lost {previous_streak})", streak.current_streak)
        }
        StreakTransition::Maintained => format!("already counted at {}", streak.current_streak),
        StreakTransition::Broken { previous_streak } => format!("broken (was {previous_streak})"),
        StreakTransition::Unchanged => format!("unchanged at {}", streak.current_streak),
    };
    writeln!(writer, "Streak: {line} (longest {})", streak.longest_streak)?;

    if let Some(reached) = &evaluation.milestone {
        let milestone = &reached.milestone;
        if reached.granted {
            writeln!(
                writer,
                "Milestone: {} ({})",
                milestone.name,
                describe_reward(milestone.reward_type, milestone.reward_amount)
            )?;
        } else {
            writeln!(writer, "Milestone: {} (already granted)", milestone.name)?;
        }
    }
    if let Some(change) = evaluation.level_change.filter(|change| change.leveled_up) {
        writeln!(writer, "Level up: {} -> {}", change.old_level, change.new_level)?;
    }
    Ok(())
}
