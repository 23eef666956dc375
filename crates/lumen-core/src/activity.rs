//! Daily activity evaluation.
//!
//! Reduces the raw activity events of one learner into a per-day summary and
//! decides whether the day counts toward the streak.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::ReferenceCalendar;

/// Canonical activity kinds. This is the single source of truth for the
/// strings stored alongside events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    LessonComplete,
    QuestionCorrect,
    QuestionIncorrect,
    QuizComplete,
    StreakBonus,
}

impl ActivityKind {
    pub const ALL: [Self; 5] = [
        Self::LessonComplete,
        Self::QuestionCorrect,
        Self::QuestionIncorrect,
        Self::QuizComplete,
        Self::StreakBonus,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LessonComplete => "lesson_complete",
            Self::QuestionCorrect => "question_correct",
            Self::QuestionIncorrect => "question_incorrect",
            Self::QuizComplete => "quiz_complete",
            Self::StreakBonus => "streak_bonus",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = UnknownActivityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownActivityKind(s.to_string()))
    }
}

impl Serialize for ActivityKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown activity kind strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownActivityKind(String);

impl fmt::Display for UnknownActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown activity kind: {}", self.0)
    }
}

impl std::error::Error for UnknownActivityKind {}

/// A single raw activity signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub xp_amount: u32,
    pub timestamp: DateTime<Utc>,
}

/// What a learner did on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivitySummary {
    pub date: NaiveDate,
    /// Number of events that fell on `date`.
    pub activities_completed: u32,
    pub xp_earned: u64,
    pub lessons_completed: u32,
    pub questions_answered: u32,
}

impl DailyActivitySummary {
    /// A summary with no activity.
    pub const fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            activities_completed: 0,
            xp_earned: 0,
            lessons_completed: 0,
            questions_answered: 0,
        }
    }
}

/// Summarize the events that fall on `target_date` in `calendar`.
///
/// Events on other days are ignored, so callers may pass a wider window.
pub fn summarize(
    events: &[ActivityEvent],
    target_date: NaiveDate,
    calendar: &ReferenceCalendar,
) -> DailyActivitySummary {
    events
        .iter()
        .filter(|event| calendar.date_of(event.timestamp) == target_date)
        .fold(DailyActivitySummary::empty(target_date), |mut summary, event| {
            summary.activities_completed += 1;
            summary.xp_earned += u64::from(event.xp_amount);
            match event.kind {
                ActivityKind::LessonComplete => summary.lessons_completed += 1,
                ActivityKind::QuestionCorrect => summary.questions_answered += 1,
                ActivityKind::QuestionIncorrect
                | ActivityKind::QuizComplete
                | ActivityKind::StreakBonus => {}
            }
            summary
        })
}

/// Minimum-activity thresholds for a qualifying day.
///
/// Meeting any single threshold is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualificationPolicy {
    pub min_questions: u32,
    pub min_xp: u64,
    pub min_minutes: u32,
    pub min_lessons: u32,
}

impl Default for QualificationPolicy {
    fn default() -> Self {
        Self {
            min_questions: 5,
            min_xp: 20,
            min_minutes: 5,
            min_lessons: 1,
        }
    }
}

impl QualificationPolicy {
    /// Whether the day counts toward the streak.
    pub const fn qualifies(&self, summary: &DailyActivitySummary, time_spent_minutes: u32) -> bool {
        summary.questions_answered >= self.min_questions
            || summary.xp_earned >= self.min_xp
            || time_spent_minutes >= self.min_minutes
            || summary.lessons_completed >= self.min_lessons
    }
}
