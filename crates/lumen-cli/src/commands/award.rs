//! Award command for granting XP directly.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use lumen_core::UserId;

use crate::service::Service;

#[derive(Debug, Args)]
pub struct AwardArgs {
    /// Learner ID.
    pub user: String,

    /// XP to add. Must be positive.
    #[arg(allow_negative_numbers = true)]
    pub xp: i64,
}

pub fn run<W: Write>(writer: &mut W, args: &AwardArgs, service: &mut Service) -> Result<()> {
    let user_id = UserId::new(args.user.as_str()).context("invalid learner id")?;
    let applied = service.award_xp(&user_id, args.xp)?;

    writeln!(
        writer,
        "Awarded {} xp to {user_id} (total {}, level {})",
        args.xp, applied.new_total, applied.new_level
    )?;
    if applied.leveled_up {
        writeln!(writer, "Level up: {} -> {}", applied.old_level, applied.new_level)?;
    }
    Ok(())
}
