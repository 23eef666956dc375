//! The composed daily engagement engine.
//!
//! [`Engine`] wires the evaluator, streak tracker, milestone table, freeze
//! policy and progression ledger together over immutable configuration.
//! Every operation is a pure function of its inputs: callers load a
//! [`UserProgress`], hand it in, and persist what comes back. Serializing
//! those read-modify-write cycles per learner is the caller's job.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityEvent, DailyActivitySummary, QualificationPolicy, summarize};
use crate::calendar::ReferenceCalendar;
use crate::freeze::{FreezeDenial, FreezeEligibility, FreezePolicy};
use crate::milestone::{Milestone, MilestoneTable, NextMilestone};
use crate::progression::{ProgressionError, ProgressionState, XpApplication};
use crate::streak::{StreakState, StreakStatus, StreakTransition, advance};
use crate::types::{RewardType, Tier};

/// Engine configuration. Built once and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub calendar: ReferenceCalendar,
    pub qualification: QualificationPolicy,
    pub freeze: FreezePolicy,
    pub milestones: MilestoneTable,
}

/// Everything the engine knows about one learner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub streak: StreakState,
    pub progression: ProgressionState,
    /// Names of milestones whose reward has already been granted.
    #[serde(default)]
    pub granted_milestones: BTreeSet<String>,
}

/// A milestone reached by extending a streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneReached {
    pub milestone: Milestone,
    /// False when this learner was already granted the milestone; the
    /// reward was not applied again.
    pub granted: bool,
}

/// Result of evaluating one day for one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayEvaluation {
    pub summary: DailyActivitySummary,
    pub time_spent_minutes: u32,
    pub qualifies: bool,
    pub transition: StreakTransition,
    pub milestone: Option<MilestoneReached>,
    /// Level change caused by an XP milestone reward.
    pub level_change: Option<XpApplication>,
    pub progress: UserProgress,
}

impl DayEvaluation {
    pub const fn extended(&self) -> bool {
        self.transition.extended()
    }

    pub const fn broken(&self) -> bool {
        self.transition.broken()
    }

    pub const fn maintained(&self) -> bool {
        self.transition.maintained()
    }

    /// The milestone whose reward this evaluation granted, if any.
    pub fn granted_milestone(&self) -> Option<&Milestone> {
        self.milestone
            .as_ref()
            .filter(|reached| reached.granted)
            .map(|reached| &reached.milestone)
    }
}

/// Read-only snapshot for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub status: StreakStatus,
    pub total_xp: u64,
    pub level: u32,
    pub progress_within_level: u64,
    pub xp_for_next_level: u64,
    pub progress_percent: u8,
    pub freezes_remaining: u32,
    pub next_milestone: NextMilestone,
}

/// The daily engagement and progression engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn calendar(&self) -> &ReferenceCalendar {
        &self.config.calendar
    }

    /// Evaluate `target_date` for one learner.
    ///
    /// Chains summarize → qualify → advance and, when the streak extended
    /// onto a milestone that has not been granted yet, applies its reward.
    /// Re-running the same day returns a maintained transition and the same
    /// progress.
    pub fn evaluate_day(
        &self,
        previous: &UserProgress,
        events: &[ActivityEvent],
        time_spent_minutes: u32,
        target_date: NaiveDate,
    ) -> DayEvaluation {
        let summary = summarize(events, target_date, &self.config.calendar);
        let qualifies = self
            .config
            .qualification
            .qualifies(&summary, time_spent_minutes);
        let advanced = advance(&previous.streak, qualifies.then_some(target_date), target_date);

        let mut progress = UserProgress {
            streak: advanced.state,
            ..previous.clone()
        };

        let mut milestone = None;
        let mut level_change = None;
        if advanced.extended() {
            if let Some(reached) = self.config.milestones.check(progress.streak.current_streak) {
                let granted = progress.granted_milestones.insert(reached.name.clone());
                if granted {
                    level_change = Self::apply_reward(&mut progress, reached);
                    tracing::info!(
                        milestone = %reached.name,
                        reward_type = %reached.reward_type,
                        reward_amount = reached.reward_amount,
                        "milestone reward granted"
                    );
                } else {
                    tracing::debug!(milestone = %reached.name, "milestone already granted");
                }
                milestone = Some(MilestoneReached {
                    milestone: reached.clone(),
                    granted,
                });
            }
        }

        DayEvaluation {
            summary,
            time_spent_minutes,
            qualifies,
            transition: advanced.transition,
            milestone,
            level_change,
            progress,
        }
    }

    fn apply_reward(progress: &mut UserProgress, milestone: &Milestone) -> Option<XpApplication> {
        match milestone.reward_type {
            RewardType::Xp => {
                // Table validation guarantees a positive amount.
                match progress.progression.apply(i64::from(milestone.reward_amount)) {
                    Ok((next, applied)) => {
                        progress.progression = next;
                        Some(applied)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, milestone = %milestone.name, "skipping xp reward");
                        None
                    }
                }
            }
            RewardType::Freeze => {
                progress.streak.bonus_freezes = progress
                    .streak
                    .bonus_freezes
                    .saturating_add(milestone.reward_amount);
                None
            }
            RewardType::Badge => None,
        }
    }

    /// Add activity XP. Rejected deltas leave `previous` untouched.
    pub fn award_xp(
        &self,
        previous: &UserProgress,
        delta: i64,
    ) -> Result<(UserProgress, XpApplication), ProgressionError> {
        let (progression, applied) = previous.progression.apply(delta)?;
        Ok((
            UserProgress {
                progression,
                ..previous.clone()
            },
            applied,
        ))
    }

    pub fn can_freeze(&self, progress: &UserProgress, tier: Tier, today: NaiveDate) -> FreezeEligibility {
        self.config.freeze.can_freeze(&progress.streak, tier, today)
    }

    /// Spend a freeze on `today` if the learner is eligible.
    pub fn request_freeze(
        &self,
        previous: &UserProgress,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<UserProgress, FreezeDenial> {
        let streak = self.config.freeze.try_freeze(&previous.streak, tier, today)?;
        Ok(UserProgress {
            streak,
            ..previous.clone()
        })
    }

    /// Dashboard view as of `today`. Never mutates.
    pub fn query_progress(&self, progress: &UserProgress, tier: Tier, today: NaiveDate) -> ProgressReport {
        let streak = &progress.streak;
        let progression = &progress.progression;
        ProgressReport {
            current_streak: streak.current_streak,
            longest_streak: streak.longest_streak,
            status: streak.status_on(today),
            total_xp: progression.total_xp,
            level: progression.level(),
            progress_within_level: progression.progress_within_level(),
            xp_for_next_level: progression.xp_for_next_level(),
            progress_percent: progression.progress_percent(),
            freezes_remaining: self.config.freeze.freezes_remaining(tier, streak),
            next_milestone: self.config.milestones.next_milestone(streak.current_streak),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::activity::ActivityKind;

    fn d(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap() + TimeDelta::days(offset)
    }

    fn at(offset: i64, hour: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&d(offset).and_hms_opt(hour, 0, 0).unwrap())
    }

    fn lesson(offset: i64) -> ActivityEvent {
        ActivityEvent {
            kind: ActivityKind::LessonComplete,
            xp_amount: 10,
            timestamp: at(offset, 9),
        }
    }

    fn with_streak(current: u32, last: NaiveDate) -> UserProgress {
        UserProgress {
            streak: StreakState {
                current_streak: current,
                longest_streak: current,
                last_activity_date: Some(last),
                ..StreakState::default()
            },
            ..UserProgress::default()
        }
    }

    #[test]
    fn qualifying_day_extends_streak() {
        let engine = Engine::default();
        let result = engine.evaluate_day(&with_streak(2, d(0)), &[lesson(1)], 0, d(1));

        assert!(result.qualifies);
        assert!(result.extended());
        assert_eq!(result.progress.streak.current_streak, 3);
        assert_eq!(result.summary.lessons_completed, 1);
        assert!(result.milestone.is_none());
    }

    #[test]
    fn minutes_alone_can_qualify() {
        let engine = Engine::default();
        let result = engine.evaluate_day(&with_streak(2, d(0)), &[], 5, d(1));
        assert!(result.qualifies);
        assert_eq!(result.progress.streak.current_streak, 3);
    }

    #[test]
    fn non_qualifying_day_past_grace_breaks() {
        let engine = Engine::default();
        let wrong_answer = ActivityEvent {
            kind: ActivityKind::QuestionIncorrect,
            xp_amount: 0,
            timestamp: at(2, 9),
        };
        let result = engine.evaluate_day(&with_streak(5, d(0)), &[wrong_answer], 1, d(2));

        assert!(!result.qualifies);
        assert!(result.broken());
        assert_eq!(result.progress.streak.current_streak, 0);
        assert_eq!(result.progress.streak.longest_streak, 5);
    }

    #[test]
    fn seventh_day_grants_week_warrior_once() {
        let engine = Engine::default();
        let first = engine.evaluate_day(&with_streak(6, d(0)), &[lesson(1)], 0, d(1));

        let reached = first.milestone.as_ref().expect("milestone reached");
        assert!(reached.granted);
        assert_eq!(reached.milestone.name, "Week Warrior");
        assert_eq!(first.progress.progression.total_xp, 100);
        assert_eq!(
            first.level_change,
            Some(XpApplication {
                new_total: 100,
                old_level: 1,
                new_level: 2,
                leveled_up: true,
            })
        );
        assert!(first.progress.granted_milestones.contains("Week Warrior"));

        // Same day again: maintained, no second grant.
        let again = engine.evaluate_day(&first.progress, &[lesson(1)], 0, d(1));
        assert!(again.maintained());
        assert!(again.milestone.is_none());
        assert_eq!(again.progress, first.progress);
    }

    #[test]
    fn milestone_not_regranted_after_restart() {
        let engine = Engine::default();
        let mut progress = with_streak(6, d(0));
        progress.granted_milestones.insert("Week Warrior".to_string());
        progress.progression = ProgressionState::new(340);

        let result = engine.evaluate_day(&progress, &[lesson(1)], 0, d(1));
        let reached = result.milestone.expect("milestone reached");
        assert!(!reached.granted);
        assert_eq!(result.progress.progression.total_xp, 340);
        assert!(result.level_change.is_none());
    }

    #[test]
    fn maintained_day_never_fires_milestone() {
        let engine = Engine::default();
        let result = engine.evaluate_day(&with_streak(7, d(1)), &[lesson(1)], 0, d(1));
        assert!(result.maintained());
        assert!(result.milestone.is_none());
    }

    #[test]
    fn freeze_reward_adds_bonus_freeze() {
        let engine = Engine::default();
        let result = engine.evaluate_day(&with_streak(13, d(0)), &[lesson(1)], 0, d(1));

        assert_eq!(
            result.granted_milestone().map(|m| m.name.as_str()),
            Some("Fortnight Focus")
        );
        assert_eq!(result.progress.streak.bonus_freezes, 1);
        assert_eq!(result.progress.progression.total_xp, 0);
    }

    #[test]
    fn badge_reward_changes_no_counters() {
        let engine = Engine::default();
        let result = engine.evaluate_day(&with_streak(49, d(0)), &[lesson(1)], 0, d(1));

        assert_eq!(
            result.granted_milestone().map(|m| m.name.as_str()),
            Some("Half Century")
        );
        assert_eq!(result.progress.progression.total_xp, 0);
        assert_eq!(result.progress.streak.bonus_freezes, 0);
    }

    #[test]
    fn custom_table_is_honored() {
        let config = EngineConfig {
            milestones: MilestoneTable::new(vec![Milestone::new(
                2,
                RewardType::Xp,
                25,
                "Double",
            )])
            .unwrap(),
            ..EngineConfig::default()
        };
        let engine = Engine::new(config);
        let result = engine.evaluate_day(&with_streak(1, d(0)), &[lesson(1)], 0, d(1));

        assert_eq!(result.granted_milestone().map(|m| m.reward_amount), Some(25));
        assert_eq!(result.progress.progression.total_xp, 25);
    }

    #[test]
    fn award_xp_rejects_invalid_amount() {
        let engine = Engine::default();
        let progress = UserProgress::default();

        assert_eq!(
            engine.award_xp(&progress, 0),
            Err(ProgressionError::InvalidAmount { delta: 0 })
        );

        let (next, applied) = engine.award_xp(&progress, 120).unwrap();
        assert_eq!(next.progression.total_xp, 120);
        assert!(applied.leveled_up);
    }

    #[test]
    fn request_freeze_end_to_end() {
        let engine = Engine::default();

        let mut exhausted = with_streak(10, d(-1));
        exhausted.streak.freeze_count = 2;
        assert_eq!(
            engine.request_freeze(&exhausted, Tier::Free, d(0)),
            Err(FreezeDenial::NoFreezesRemaining { quota: 2 })
        );

        let mut cooling = with_streak(10, d(-1));
        cooling.streak.last_freeze_date = Some(d(-3));
        assert_eq!(
            engine.request_freeze(&cooling, Tier::Free, d(0)),
            Err(FreezeDenial::CooldownActive { days_remaining: 4 })
        );

        let frozen = engine
            .request_freeze(&with_streak(10, d(-1)), Tier::Free, d(0))
            .unwrap();
        assert_eq!(frozen.streak.freeze_count, 1);
        assert_eq!(frozen.streak.last_activity_date, Some(d(0)));
    }

    #[test]
    fn query_progress_composes_views() {
        let engine = Engine::default();
        let mut progress = with_streak(5, d(-1));
        progress.progression = ProgressionState::new(150);

        let report = engine.query_progress(&progress, Tier::Pro, d(0));

        assert_eq!(report.current_streak, 5);
        assert_eq!(report.status, StreakStatus::AtRisk);
        assert_eq!(report.level, 2);
        assert_eq!(report.progress_within_level, 50);
        assert_eq!(report.xp_for_next_level, 200);
        assert_eq!(report.freezes_remaining, 5);
        assert_eq!(report.next_milestone.name, "Week Warrior");
        assert_eq!(report.next_milestone.days_remaining, 2);
    }

    #[test]
    fn config_deserializes_partial_overrides() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"calendar": {"utc_offset_minutes": 60}, "freeze": {"pro_quota": 8}}"#,
        )
        .unwrap();

        assert_eq!(config.calendar.utc_offset_minutes(), 60);
        assert_eq!(config.freeze.pro_quota, 8);
        assert_eq!(config.freeze.free_quota, 2);
        assert_eq!(config.milestones, MilestoneTable::default());
    }
}
