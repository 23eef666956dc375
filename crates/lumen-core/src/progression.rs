//! Experience points and levels.
//!
//! Level 1 is an onboarding band covering 0-99 XP. From level 2 onward each
//! level spans 100 XP.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// XP width of one progression band.
pub const LEVEL_BAND_XP: u64 = 100;

/// Errors from applying XP.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionError {
    /// XP deltas must be strictly positive.
    #[error("invalid_amount: xp delta must be positive, got {delta}")]
    InvalidAmount { delta: i64 },
}

/// Level for a cumulative XP total.
pub fn level_for(total_xp: u64) -> u32 {
    if total_xp < LEVEL_BAND_XP {
        return 1;
    }
    let level = (total_xp - LEVEL_BAND_XP) / LEVEL_BAND_XP + 2;
    u32::try_from(level).unwrap_or(u32::MAX)
}

/// Denominator for the progress bar of `level`.
///
/// This is not the absolute XP threshold of the next level.
pub fn xp_for_next_level(level: u32) -> u64 {
    if level <= 1 {
        LEVEL_BAND_XP
    } else {
        u64::from(level) * LEVEL_BAND_XP
    }
}

/// XP earned since entering `level`.
pub fn progress_within_level(total_xp: u64, level: u32) -> u64 {
    if level <= 1 {
        total_xp
    } else {
        total_xp.saturating_sub(u64::from(level - 1) * LEVEL_BAND_XP)
    }
}

/// Result of adding XP to a running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct XpApplication {
    pub new_total: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub leveled_up: bool,
}

/// Add `delta` XP to `previous_total`. Zero and negative deltas are rejected.
pub fn apply_xp(previous_total: u64, delta: i64) -> Result<XpApplication, ProgressionError> {
    let amount = u64::try_from(delta)
        .ok()
        .filter(|amount| *amount > 0)
        .ok_or(ProgressionError::InvalidAmount { delta })?;

    let new_total = previous_total.saturating_add(amount);
    let old_level = level_for(previous_total);
    let new_level = level_for(new_total);
    Ok(XpApplication {
        new_total,
        old_level,
        new_level,
        leveled_up: new_level > old_level,
    })
}

/// Per-learner progression. The level is always derived from `total_xp`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub total_xp: u64,
}

impl ProgressionState {
    pub const fn new(total_xp: u64) -> Self {
        Self { total_xp }
    }

    pub fn level(&self) -> u32 {
        level_for(self.total_xp)
    }

    pub fn progress_within_level(&self) -> u64 {
        progress_within_level(self.total_xp, self.level())
    }

    pub fn xp_for_next_level(&self) -> u64 {
        xp_for_next_level(self.level())
    }

    /// Progress through the current level as a whole percentage, capped at 100.
    pub fn progress_percent(&self) -> u8 {
        let percent = self.progress_within_level() * 100 / self.xp_for_next_level().max(1);
        u8::try_from(percent.min(100)).unwrap_or(100)
    }

    /// Returns the updated state alongside the level transition.
    pub fn apply(&self, delta: i64) -> Result<(Self, XpApplication), ProgressionError> {
        let applied = apply_xp(self.total_xp, delta)?;
        if applied.leveled_up {
            tracing::debug!(
                old_level = applied.old_level,
                new_level = applied.new_level,
                "level up"
            );
        }
        Ok((Self::new(applied.new_total), applied))
    }
}
