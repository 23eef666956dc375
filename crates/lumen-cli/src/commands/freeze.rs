//! Freeze command for spending a streak freeze.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use lumen_core::{Tier, UserId};

use crate::commands::util::resolve_date;
use crate::service::{FreezeOutcome, Service};

#[derive(Debug, Args)]
pub struct FreezeArgs {
    /// Learner ID.
    pub user: String,

    /// Subscription tier (free or pro).
    #[arg(long, default_value_t = Tier::Free)]
    pub tier: Tier,

    /// Day to protect. Defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &FreezeArgs,
    service: &mut Service,
    today: NaiveDate,
) -> Result<()> {
    let user_id = UserId::new(args.user.as_str()).context("invalid learner id")?;
    let date = resolve_date(args.date.as_deref(), today, today)?;
    let outcome = service.request_freeze(&user_id, args.tier, date)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&outcome)?)?;
        return Ok(());
    }

    match outcome {
        FreezeOutcome::Applied {
            streak,
            freezes_remaining,
        } => {
            writeln!(
                writer,
                "Streak of {} protected for {user_id} on {date}",
                streak.current_streak
            )?;
            writeln!(writer, "Freezes remaining: {freezes_remaining}")?;
        }
        FreezeOutcome::Denied { reason } => {
            writeln!(writer, "Freeze denied for {user_id}: {reason}")?;
        }
    }
    Ok(())
}
