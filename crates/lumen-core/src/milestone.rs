//! Streak milestones and their rewards.
//!
//! The table is immutable configuration handed to the engine at
//! construction. Rewards fire only on an exact threshold match reached by
//! extending a streak; past the last tabulated threshold the table
//! extrapolates a preview every 100 days but never grants it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RewardType;

/// Spacing of the extrapolated milestones past the end of the table.
const EXTRAPOLATION_STEP: u32 = 100;

/// Preview XP per streak day for an extrapolated milestone.
const EXTRAPOLATED_XP_PER_DAY: u32 = 10;

/// A static milestone table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub streak_threshold: u32,
    pub reward_type: RewardType,
    pub reward_amount: u32,
    pub name: String,
}

impl Milestone {
    pub fn new(
        streak_threshold: u32,
        reward_type: RewardType,
        reward_amount: u32,
        name: impl Into<String>,
    ) -> Self {
        Self {
            streak_threshold,
            reward_type,
            reward_amount,
            name: name.into(),
        }
    }
}

/// Errors building a milestone table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MilestoneTableError {
    #[error("milestone table is empty")]
    Empty,
    #[error("milestone {name:?} has a zero streak threshold")]
    ZeroThreshold { name: String },
    #[error("milestone {name:?} has a zero reward amount")]
    ZeroReward { name: String },
    #[error("milestone at threshold {threshold} has an empty name")]
    EmptyName { threshold: u32 },
    #[error("milestone name {name:?} appears more than once")]
    DuplicateName { name: String },
    #[error("milestone thresholds must strictly increase: {previous} then {next}")]
    NotIncreasing { previous: u32, next: u32 },
}

/// The next milestone ahead of a streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextMilestone {
    pub streak_threshold: u32,
    pub name: String,
    pub reward_type: RewardType,
    pub reward_amount: u32,
    pub days_remaining: u32,
    /// True when the entry comes from the every-100-days rule rather than
    /// the table.
    pub extrapolated: bool,
}

/// Ordered, validated milestone table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Milestone>", into = "Vec<Milestone>")]
pub struct MilestoneTable {
    entries: Vec<Milestone>,
}

impl MilestoneTable {
    /// Validates thresholds (positive, strictly increasing), rewards
    /// (positive) and names (non-empty, unique).
    pub fn new(entries: Vec<Milestone>) -> Result<Self, MilestoneTableError> {
        if entries.is_empty() {
            return Err(MilestoneTableError::Empty);
        }

        let mut names = HashSet::new();
        let mut previous: Option<u32> = None;
        for entry in &entries {
            if entry.name.trim().is_empty() {
                return Err(MilestoneTableError::EmptyName {
                    threshold: entry.streak_threshold,
                });
            }
            if entry.streak_threshold == 0 {
                return Err(MilestoneTableError::ZeroThreshold {
                    name: entry.name.clone(),
                });
            }
            if entry.reward_amount == 0 {
                return Err(MilestoneTableError::ZeroReward {
                    name: entry.name.clone(),
                });
            }
            if !names.insert(entry.name.as_str()) {
                return Err(MilestoneTableError::DuplicateName {
                    name: entry.name.clone(),
                });
            }
            if let Some(previous) = previous.filter(|p| entry.streak_threshold <= *p) {
                return Err(MilestoneTableError::NotIncreasing {
                    previous,
                    next: entry.streak_threshold,
                });
            }
            previous = Some(entry.streak_threshold);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[Milestone] {
        &self.entries
    }

    /// The milestone whose threshold is exactly `streak_length`.
    pub fn check(&self, streak_length: u32) -> Option<&Milestone> {
        self.entries
            .binary_search_by_key(&streak_length, |m| m.streak_threshold)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// The next milestone strictly ahead of `streak_length`.
    ///
    /// This is a preview and grants nothing.
    pub fn next_milestone(&self, streak_length: u32) -> NextMilestone {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|m| m.streak_threshold > streak_length)
        {
            return NextMilestone {
                streak_threshold: entry.streak_threshold,
                name: entry.name.clone(),
                reward_type: entry.reward_type,
                reward_amount: entry.reward_amount,
                days_remaining: entry.streak_threshold - streak_length,
                extrapolated: false,
            };
        }

        let boundary = (streak_length / EXTRAPOLATION_STEP)
            .saturating_add(1)
            .saturating_mul(EXTRAPOLATION_STEP);
        NextMilestone {
            streak_threshold: boundary,
            name: format!("{boundary}-Day Legend"),
            reward_type: RewardType::Xp,
            reward_amount: boundary.saturating_mul(EXTRAPOLATED_XP_PER_DAY),
            days_remaining: boundary.saturating_sub(streak_length),
            extrapolated: true,
        }
    }
}

impl Default for MilestoneTable {
    fn default() -> Self {
        Self {
            entries: vec![
                Milestone::new(7, RewardType::Xp, 100, "Week Warrior"),
                Milestone::new(14, RewardType::Freeze, 1, "Fortnight Focus"),
                Milestone::new(30, RewardType::Xp, 500, "Monthly Master"),
                Milestone::new(50, RewardType::Badge, 1, "Half Century"),
                Milestone::new(100, RewardType::Xp, 1_000, "Century Club"),
                Milestone::new(365, RewardType::Xp, 5_000, "Year of Learning"),
            ],
        }
    }
}

impl TryFrom<Vec<Milestone>> for MilestoneTable {
    type Error = MilestoneTableError;

    fn try_from(entries: Vec<Milestone>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<MilestoneTable> for Vec<Milestone> {
    fn from(table: MilestoneTable) -> Self {
        table.entries
    }
}
