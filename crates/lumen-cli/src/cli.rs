//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::award::AwardArgs;
use crate::commands::evaluate::EvaluateArgs;
use crate::commands::freeze::FreezeArgs;
use crate::commands::log_time::LogTimeArgs;
use crate::commands::progress::ProgressArgs;
use crate::commands::record::RecordArgs;
use crate::commands::sweep::SweepArgs;

/// Daily learning streaks, milestones and levels.
///
/// Records learner activity, decides which days count, and keeps streaks,
/// streak freezes, milestone rewards and XP levels up to date.
#[derive(Debug, Parser)]
#[command(name = "lumen", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record one activity event and award its XP.
    Record(RecordArgs),

    /// Add study minutes to a learner's day.
    LogTime(LogTimeArgs),

    /// Evaluate one learner's day and update their streak.
    Evaluate(EvaluateArgs),

    /// Evaluate a day for every known learner (defaults to yesterday).
    Sweep(SweepArgs),

    /// Spend a streak freeze.
    Freeze(FreezeArgs),

    /// Award XP directly.
    Award(AwardArgs),

    /// Show a learner's streak, level and next milestone.
    Progress(ProgressArgs),

    /// Show the database location and known learners.
    Status,
}
