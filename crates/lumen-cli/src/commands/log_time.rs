//! Log-time command for adding study minutes.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Args;
use lumen_core::UserId;

use crate::commands::util::resolve_date;
use crate::service::Service;

#[derive(Debug, Args)]
pub struct LogTimeArgs {
    /// Learner ID.
    pub user: String,

    /// Minutes studied.
    pub minutes: u32,

    /// Day to credit (YYYY-MM-DD, today, yesterday, "N days ago"). Defaults to today.
    #[arg(long)]
    pub date: Option<String>,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &LogTimeArgs,
    service: &mut Service,
    today: NaiveDate,
) -> Result<()> {
    if args.minutes == 0 {
        bail!("minutes must be positive");
    }
    let user_id = UserId::new(args.user.as_str()).context("invalid learner id")?;
    let date = resolve_date(args.date.as_deref(), today, today)?;

    let total = service.log_time(&user_id, date, args.minutes)?;
    writeln!(
        writer,
        "Logged {} minutes for {user_id} on {date} (total {total})",
        args.minutes
    )?;
    Ok(())
}
