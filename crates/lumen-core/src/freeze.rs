//! Streak freezes.
//!
//! A freeze stands in for one qualifying day. It never extends a streak; it
//! only moves `last_activity_date` forward so the next evaluation does not
//! break it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::streak::StreakState;
use crate::types::Tier;

/// Freeze entitlements and gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreezePolicy {
    /// Lifetime freezes for the free tier.
    pub free_quota: u32,
    /// Lifetime freezes for the pro tier.
    pub pro_quota: u32,
    /// Shortest streak worth protecting.
    pub min_streak: u32,
    /// Days that must pass between two freezes.
    pub cooldown_days: u32,
}

impl Default for FreezePolicy {
    fn default() -> Self {
        Self {
            free_quota: 2,
            pro_quota: 5,
            min_streak: 7,
            cooldown_days: 7,
        }
    }
}

/// Why a freeze was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FreezeDenial {
    #[error("streak_too_short: streak is {current_streak} days, {required} required")]
    StreakTooShort { current_streak: u32, required: u32 },
    #[error("no_freezes_remaining: all {quota} freezes used")]
    NoFreezesRemaining { quota: u32 },
    #[error("cooldown_active: next freeze available in {days_remaining} days")]
    CooldownActive { days_remaining: u32 },
}

impl FreezeDenial {
    /// Stable machine-readable reason code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StreakTooShort { .. } => "streak_too_short",
            Self::NoFreezesRemaining { .. } => "no_freezes_remaining",
            Self::CooldownActive { .. } => "cooldown_active",
        }
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreezeEligibility {
    pub allowed: bool,
    pub reason: Option<FreezeDenial>,
    pub freezes_remaining: u32,
}

impl FreezePolicy {
    /// Lifetime quota for a tier, including freezes earned from milestones.
    pub const fn quota(&self, tier: Tier, state: &StreakState) -> u32 {
        let base = match tier {
            Tier::Free => self.free_quota,
            Tier::Pro => self.pro_quota,
        };
        base.saturating_add(state.bonus_freezes)
    }

    pub const fn freezes_remaining(&self, tier: Tier, state: &StreakState) -> u32 {
        self.quota(tier, state).saturating_sub(state.freeze_count)
    }

    /// Checks minimum streak, then quota, then cooldown; the first failure
    /// is reported.
    pub fn can_freeze(&self, state: &StreakState, tier: Tier, today: NaiveDate) -> FreezeEligibility {
        let freezes_remaining = self.freezes_remaining(tier, state);
        let reason = self.denial(state, tier, today);
        FreezeEligibility {
            allowed: reason.is_none(),
            reason,
            freezes_remaining,
        }
    }

    fn denial(&self, state: &StreakState, tier: Tier, today: NaiveDate) -> Option<FreezeDenial> {
        if state.current_streak < self.min_streak {
            return Some(FreezeDenial::StreakTooShort {
                current_streak: state.current_streak,
                required: self.min_streak,
            });
        }

        if self.freezes_remaining(tier, state) == 0 {
            return Some(FreezeDenial::NoFreezesRemaining {
                quota: self.quota(tier, state),
            });
        }

        let last = state.last_freeze_date?;
        let elapsed = (today - last).num_days();
        let cooldown = i64::from(self.cooldown_days);
        if elapsed < cooldown {
            let days_remaining = u32::try_from(cooldown - elapsed).unwrap_or(self.cooldown_days);
            return Some(FreezeDenial::CooldownActive { days_remaining });
        }

        None
    }

    /// Consume a freeze for `today`. Callers check eligibility first.
    ///
    /// The last counted day never moves backwards, so a freeze dated before
    /// it holds nothing new.
    pub fn apply(&self, state: &StreakState, today: NaiveDate) -> StreakState {
        StreakState {
            freeze_count: state.freeze_count.saturating_add(1),
            last_freeze_date: Some(today),
            last_activity_date: state.last_activity_date.max(Some(today)),
            ..*state
        }
    }

    /// Check eligibility and apply in one step. A denial leaves `state`
    /// untouched.
    pub fn try_freeze(
        &self,
        state: &StreakState,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<StreakState, FreezeDenial> {
        match self.denial(state, tier, today) {
            Some(denial) => {
                tracing::debug!(reason = denial.code(), %tier, "freeze denied");
                Err(denial)
            }
            None => Ok(self.apply(state, today)),
        }
    }
}
