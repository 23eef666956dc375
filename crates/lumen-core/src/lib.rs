//! Core domain logic for daily learning engagement.
//!
//! This crate contains the pure decision logic for:
//! - Activity: summarizing a learner's day and deciding whether it counts
//! - Streaks: extending, holding, breaking and restarting streaks
//! - Freezes: gating and spending streak freezes
//! - Milestones: mapping streak lengths to one-time rewards
//! - Progression: mapping cumulative XP to levels
//!
//! Nothing here performs I/O. Persistence and per-learner serialization of
//! updates live with the callers.

pub mod activity;
pub mod calendar;
pub mod engine;
pub mod freeze;
pub mod milestone;
pub mod progression;
pub mod streak;
pub mod types;

pub use activity::{
    ActivityEvent, ActivityKind, DailyActivitySummary, QualificationPolicy, UnknownActivityKind,
    summarize,
};
pub use calendar::ReferenceCalendar;
pub use engine::{
    DayEvaluation, Engine, EngineConfig, MilestoneReached, ProgressReport, UserProgress,
};
pub use freeze::{FreezeDenial, FreezeEligibility, FreezePolicy};
pub use milestone::{Milestone, MilestoneTable, MilestoneTableError, NextMilestone};
pub use progression::{ProgressionError, ProgressionState, XpApplication, apply_xp, level_for};
pub use streak::{StreakAdvance, StreakState, StreakStatus, StreakTransition, advance};
pub use types::{RewardType, Tier, UserId, ValidationError};
