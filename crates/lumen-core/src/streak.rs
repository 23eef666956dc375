//! The streak state machine.
//!
//! Given yesterday's state and today's qualification signal, [`advance`]
//! decides whether the streak extends, holds, breaks or restarts. Dates are
//! compared as calendar dates in the reference calendar, never as instants.

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

/// Per-learner streak state.
///
/// Invariant: `longest_streak >= current_streak`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    /// Consecutive qualifying days ending today or yesterday.
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Last qualifying day, or the last frozen day.
    pub last_activity_date: Option<NaiveDate>,
    /// Lifetime freezes consumed.
    pub freeze_count: u32,
    pub last_freeze_date: Option<NaiveDate>,
    /// Freezes earned from milestones, on top of the tier quota.
    #[serde(default)]
    pub bonus_freezes: u32,
}

/// How one evaluation moved the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum StreakTransition {
    /// First qualifying day with no live streak to lose.
    Started,
    /// Qualifying day directly after the last one.
    Extended,
    /// Qualifying day after a gap: the old streak broke and a new one
    /// started at 1.
    Restarted { previous_streak: u32 },
    /// The day was already counted; nothing changed.
    Maintained,
    /// No qualifying activity and the grace day has passed.
    Broken { previous_streak: u32 },
    /// No qualifying activity, but the streak is still within its grace day
    /// (or there was no streak to break).
    Unchanged,
}

impl StreakTransition {
    /// Whether the streak grew today. Only this signal may trigger rewards.
    pub const fn extended(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Extended | Self::Restarted { .. }
        )
    }

    /// Whether a live streak was lost. A restart is both broken and extended.
    pub const fn broken(&self) -> bool {
        matches!(self, Self::Restarted { .. } | Self::Broken { .. })
    }

    pub const fn maintained(&self) -> bool {
        matches!(self, Self::Maintained)
    }
}

/// Result of [`advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakAdvance {
    pub state: StreakState,
    pub transition: StreakTransition,
}

impl StreakAdvance {
    pub const fn extended(&self) -> bool {
        self.transition.extended()
    }

    pub const fn broken(&self) -> bool {
        self.transition.broken()
    }

    pub const fn maintained(&self) -> bool {
        self.transition.maintained()
    }
}

/// Compute the next streak state.
///
/// `qualifying_date` is `Some(today)` when today's activity qualified. A
/// qualifying date other than `today` is stale and treated as absent.
///
/// When the state already records `today` or a later day, the call is a
/// no-op. Callers settle skipped days first (see
/// [`StreakState::first_unsettled_day`]) so a later day is only ever recorded
/// after the days before it were counted.
pub fn advance(
    previous: &StreakState,
    qualifying_date: Option<NaiveDate>,
    today: NaiveDate,
) -> StreakAdvance {
    let qualified = qualifying_date == Some(today);
    if qualifying_date.is_some() && !qualified {
        tracing::debug!(
            ?qualifying_date,
            %today,
            "ignoring qualifying date that is not the evaluated day"
        );
    }

    let mut state = *previous;
    let yesterday = today - TimeDelta::days(1);

    let transition = match (qualified, previous.last_activity_date) {
        (true, Some(last)) if last >= today => StreakTransition::Maintained,
        (true, Some(last)) if last == yesterday => {
            state.current_streak = state.current_streak.saturating_add(1);
            StreakTransition::Extended
        }
        (true, _) => {
            state.current_streak = 1;
            if previous.current_streak > 0 {
                StreakTransition::Restarted {
                    previous_streak: previous.current_streak,
                }
            } else {
                StreakTransition::Started
            }
        }
        (false, Some(last)) if last < yesterday && previous.current_streak > 0 => {
            state.current_streak = 0;
            StreakTransition::Broken {
                previous_streak: previous.current_streak,
            }
        }
        (false, _) => StreakTransition::Unchanged,
    };

    if qualified && !transition.maintained() {
        state.last_activity_date = Some(today);
    }
    state.longest_streak = state.longest_streak.max(state.current_streak);

    tracing::debug!(
        ?transition,
        current_streak = state.current_streak,
        longest_streak = state.longest_streak,
        %today,
        "advanced streak"
    );

    StreakAdvance { state, transition }
}

/// Read-only view of where a streak stands on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakStatus {
    /// No live streak.
    Inactive,
    /// Today already counts.
    ActiveToday,
    /// Yesterday counted, today does not yet. Still unbroken.
    AtRisk,
    /// The grace day has passed; the next evaluation will break the streak.
    Lapsed,
}

impl StreakState {
    /// Status as of `today`, without mutating anything.
    pub fn status_on(&self, today: NaiveDate) -> StreakStatus {
        if self.current_streak == 0 {
            return StreakStatus::Inactive;
        }
        match self.last_activity_date {
            Some(last) if last >= today => StreakStatus::ActiveToday,
            Some(last) if last == today - TimeDelta::days(1) => StreakStatus::AtRisk,
            _ => StreakStatus::Lapsed,
        }
    }

    /// First day that must be evaluated before `today` can be.
    ///
    /// A live streak settles every day after its last counted day, since
    /// evaluating `today` across that gap would restart a streak that stored
    /// activity may still extend. Without a live streak only yesterday is
    /// settled. `None` when the last counted day is yesterday or later.
    pub fn first_unsettled_day(&self, today: NaiveDate) -> Option<NaiveDate> {
        let yesterday = today - TimeDelta::days(1);
        match self.last_activity_date {
            Some(last) if last >= yesterday => None,
            Some(last) if self.current_streak > 0 => Some(last + TimeDelta::days(1)),
            _ => Some(yesterday),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap() + TimeDelta::days(offset)
    }

    fn state(current: u32, last: NaiveDate) -> StreakState {
        StreakState {
            current_streak: current,
            longest_streak: current,
            last_activity_date: Some(last),
            ..StreakState::default()
        }
    }

    #[test]
    fn consecutive_day_extends() {
        let result = advance(&state(5, d(0)), Some(d(1)), d(1));

        assert_eq!(result.state.current_streak, 6);
        assert_eq!(result.state.longest_streak, 6);
        assert_eq!(result.state.last_activity_date, Some(d(1)));
        assert!(result.extended());
        assert!(!result.broken());
        assert!(!result.maintained());
    }

    #[test]
    fn gap_breaks_and_restarts() {
        let result = advance(&state(5, d(0)), Some(d(3)), d(3));

        assert_eq!(result.state.current_streak, 1);
        assert_eq!(result.state.longest_streak, 5);
        assert_eq!(result.state.last_activity_date, Some(d(3)));
        assert!(result.broken());
        assert!(result.extended());
        assert_eq!(
            result.transition,
            StreakTransition::Restarted { previous_streak: 5 }
        );
    }

    #[test]
    fn absence_past_grace_day_breaks() {
        let result = advance(&state(5, d(0)), None, d(2));

        assert_eq!(result.state.current_streak, 0);
        assert_eq!(result.state.longest_streak, 5);
        assert_eq!(result.state.last_activity_date, Some(d(0)));
        assert!(result.broken());
        assert!(!result.extended());
    }

    #[test]
    fn absence_on_grace_day_leaves_streak_alone() {
        let previous = state(5, d(0));
        let result = advance(&previous, None, d(1));

        assert_eq!(result.state, previous);
        assert_eq!(result.transition, StreakTransition::Unchanged);
        assert!(!result.broken());
    }

    #[test]
    fn absence_without_streak_is_not_a_break() {
        let previous = StreakState {
            longest_streak: 9,
            last_activity_date: Some(d(-10)),
            ..StreakState::default()
        };
        let result = advance(&previous, None, d(0));
        assert_eq!(result.transition, StreakTransition::Unchanged);
        assert_eq!(result.state, previous);
    }

    #[test]
    fn same_day_reevaluation_is_idempotent() {
        let first = advance(&state(5, d(0)), Some(d(1)), d(1));
        let second = advance(&first.state, Some(d(1)), d(1));

        assert!(second.maintained());
        assert!(!second.extended());
        assert_eq!(second.state, first.state);
    }

    #[test]
    fn first_ever_activity_starts_streak() {
        let result = advance(&StreakState::default(), Some(d(0)), d(0));

        assert_eq!(result.state.current_streak, 1);
        assert_eq!(result.state.longest_streak, 1);
        assert_eq!(result.transition, StreakTransition::Started);
        assert!(result.extended());
        assert!(!result.broken());
    }

    #[test]
    fn later_recorded_day_makes_evaluation_a_noop() {
        // On-demand call already counted d(1); the nightly pass then
        // finalizes d(0).
        let previous = state(6, d(1));

        let qualifying = advance(&previous, Some(d(0)), d(0));
        assert!(qualifying.maintained());
        assert_eq!(qualifying.state, previous);

        let absent = advance(&previous, None, d(0));
        assert_eq!(absent.transition, StreakTransition::Unchanged);
        assert_eq!(absent.state, previous);
    }

    #[test]
    fn stale_qualifying_date_counts_as_absent() {
        let previous = state(5, d(0));
        let result = advance(&previous, Some(d(1)), d(3));

        assert_eq!(result.state.current_streak, 0);
        assert!(result.broken());
        assert!(!result.extended());
    }

    #[test]
    fn frozen_day_bridges_to_next_activity() {
        // A freeze on d(1) moves last_activity_date forward without
        // extending; activity on d(2) then extends normally.
        let mut frozen = state(8, d(0));
        frozen.last_activity_date = Some(d(1));

        let result = advance(&frozen, Some(d(2)), d(2));
        assert_eq!(result.state.current_streak, 9);
        assert_eq!(result.transition, StreakTransition::Extended);
    }

    #[test]
    fn watermark_never_drops_below_current() {
        let mut current = StreakState::default();
        let mut longest_seen = 0;
        // Pattern of qualifying (true) and missed (false) days.
        let pattern = [
            true, true, true, false, false, true, true, true, true, false, true, false, false,
            false, true, true,
        ];

        for (offset, qualified) in pattern.iter().enumerate() {
            let today = d(i64::try_from(offset).unwrap());
            let result = advance(&current, qualified.then_some(today), today);
            assert!(result.state.longest_streak >= result.state.current_streak);
            assert!(result.state.longest_streak >= longest_seen);
            longest_seen = result.state.longest_streak;
            current = result.state;
        }

        assert_eq!(current.longest_streak, 4);
        assert_eq!(current.current_streak, 2);
    }

    #[test]
    fn status_reflects_grace_day() {
        assert_eq!(StreakState::default().status_on(d(0)), StreakStatus::Inactive);
        assert_eq!(state(3, d(0)).status_on(d(0)), StreakStatus::ActiveToday);
        assert_eq!(state(3, d(0)).status_on(d(1)), StreakStatus::AtRisk);
        assert_eq!(state(3, d(0)).status_on(d(2)), StreakStatus::Lapsed);
    }

    #[test]
    fn unsettled_day_follows_last_counted_day() {
        assert_eq!(state(3, d(0)).first_unsettled_day(d(0)), None);
        assert_eq!(state(3, d(0)).first_unsettled_day(d(1)), None);
        assert_eq!(state(3, d(0)).first_unsettled_day(d(2)), Some(d(1)));
        assert_eq!(state(3, d(0)).first_unsettled_day(d(5)), Some(d(1)));
        assert_eq!(state(0, d(0)).first_unsettled_day(d(1)), None);
        assert_eq!(state(0, d(0)).first_unsettled_day(d(5)), Some(d(4)));
        assert_eq!(StreakState::default().first_unsettled_day(d(5)), Some(d(4)));
    }
}
