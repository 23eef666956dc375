//! Storage layer for learner streaks and progression.
//!
//! Provides persistence for activity events, study time, per-learner state
//! and the milestone grant ledger using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Concurrent Updates
//!
//! Learner state is written with an optimistic version check. Every row in
//! `users` carries a `version`; [`Database::save_user`] only succeeds when the
//! caller's expected version still matches, and returns
//! [`DbError::VersionConflict`] otherwise. The grant ledger is written in the
//! same transaction, so a milestone reward can never be recorded twice.
//!
//! # Schema
//!
//! Dates are stored as `YYYY-MM-DD`. Timestamps are stored as TEXT in
//! ISO 8601 format with millisecond precision (e.g., `2025-03-10T09:00:00.000Z`),
//! so lexicographic order matches chronological order.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use lumen_core::{
    ActivityEvent, Milestone, ProgressionState, ReferenceCalendar, StreakState, UserId,
    UserProgress, level_for,
};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Another writer updated the learner since it was loaded.
    #[error("version conflict for user {user_id}: expected version {expected}")]
    VersionConflict { user_id: String, expected: i64 },
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for event {event_id}: {timestamp}")]
    TimestampParse {
        event_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Failed to parse a stored calendar date.
    #[error("invalid date for user {user_id}: {value}")]
    DateParse {
        user_id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row holds a value the domain types cannot represent.
    #[error("invalid record {id}: {message}")]
    InvalidRecord { id: String, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A raw activity event as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub xp_amount: i64,
    pub timestamp: String,
}

impl ActivityRecord {
    /// Builds a record for a domain event.
    pub fn from_event(id: impl Into<String>, user_id: &UserId, event: &ActivityEvent) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.to_string(),
            kind: event.kind.to_string(),
            xp_amount: i64::from(event.xp_amount),
            timestamp: format_timestamp(event.timestamp),
        }
    }

    /// Parses the stored strings back into a domain event.
    pub fn to_event(&self) -> Result<ActivityEvent, DbError> {
        let kind = self.kind.parse().map_err(|err| DbError::InvalidRecord {
            id: self.id.clone(),
            message: format!("{err}"),
        })?;
        let xp_amount = u32::try_from(self.xp_amount).map_err(|_| DbError::InvalidRecord {
            id: self.id.clone(),
            message: format!("xp_amount out of range: {}", self.xp_amount),
        })?;
        Ok(ActivityEvent {
            kind,
            xp_amount,
            timestamp: parse_timestamp(&self.timestamp, &self.id)?,
        })
    }
}

/// A learner's state together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub progress: UserProgress,
    /// Zero when the learner has never been saved.
    pub version: i64,
}

/// One row of the learner overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<String>,
    pub total_xp: u64,
    pub level: u32,
}

/// A milestone reward recorded in the grant ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneGrantRecord {
    pub user_id: String,
    pub milestone_name: String,
    pub reward_type: String,
    pub reward_amount: u32,
    pub streak_threshold: u32,
    pub granted_at: String,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.busy_timeout(std::time::Duration::from_secs(5))?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                current_streak INTEGER NOT NULL DEFAULT 0,
                longest_streak INTEGER NOT NULL DEFAULT 0,
                last_activity_date TEXT,
                freeze_count INTEGER NOT NULL DEFAULT 0,
                last_freeze_date TEXT,
                bonus_freezes INTEGER NOT NULL DEFAULT 0,
                total_xp INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Activity events: raw learning signals
            -- type: activity kind (e.g., 'lesson_complete')
            -- timestamp: ISO 8601 UTC with milliseconds
            CREATE TABLE IF NOT EXISTS activity_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                type TEXT NOT NULL,
                xp_amount INTEGER NOT NULL DEFAULT 0,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_user_time ON activity_events(user_id, timestamp);

            CREATE TABLE IF NOT EXISTS study_time (
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                minutes INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, date)
            );

            CREATE TABLE IF NOT EXISTS milestone_grants (
                user_id TEXT NOT NULL,
                milestone_name TEXT NOT NULL,
                reward_type TEXT NOT NULL,
                reward_amount INTEGER NOT NULL,
                streak_threshold INTEGER NOT NULL,
                granted_at TEXT NOT NULL,
                PRIMARY KEY (user_id, milestone_name)
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts a batch of activity events, ignoring duplicates by ID.
    pub fn insert_activity_events(&mut self, events: &[ActivityRecord]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO activity_events (id, user_id, type, xp_amount, timestamp)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.id,
                    event.user_id,
                    event.kind,
                    event.xp_amount,
                    event.timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Lists a learner's events within a time range, oldest first.
    ///
    /// The range is inclusive of `start` and exclusive of `end`.
    pub fn list_activity_events(
        &self,
        user_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, type, xp_amount, timestamp
            FROM activity_events
            WHERE user_id = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![user_id.as_str(), format_timestamp(start), format_timestamp(end)],
            |row| {
                Ok(ActivityRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    kind: row.get(2)?,
                    xp_amount: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Loads and parses the events that fall on `date` in `calendar`.
    pub fn activity_for_day(
        &self,
        user_id: &UserId,
        calendar: &ReferenceCalendar,
        date: NaiveDate,
    ) -> Result<Vec<ActivityEvent>, DbError> {
        let (start, end) = calendar.day_bounds(date);
        self.list_activity_events(user_id, start, end)?
            .iter()
            .map(ActivityRecord::to_event)
            .collect()
    }

    /// Adds study minutes to a learner's day.
    pub fn add_study_minutes(
        &mut self,
        user_id: &UserId,
        date: NaiveDate,
        minutes: u32,
    ) -> Result<u32, DbError> {
        let date = format_date(date);
        self.conn.execute(
            "
            INSERT INTO study_time (user_id, date, minutes) VALUES (?, ?, ?)
            ON CONFLICT(user_id, date) DO UPDATE SET minutes = minutes + excluded.minutes
            ",
            params![user_id.as_str(), date, minutes],
        )?;
        self.study_minutes_raw(user_id, &date)
    }

    /// Study minutes recorded for a learner's day, zero if none.
    pub fn study_minutes(&self, user_id: &UserId, date: NaiveDate) -> Result<u32, DbError> {
        self.study_minutes_raw(user_id, &format_date(date))
    }

    fn study_minutes_raw(&self, user_id: &UserId, date: &str) -> Result<u32, DbError> {
        let minutes: Option<i64> = self
            .conn
            .query_row(
                "SELECT minutes FROM study_time WHERE user_id = ? AND date = ?",
                params![user_id.as_str(), date],
                |row| row.get(0),
            )
            .optional()?;
        to_u32(minutes.unwrap_or(0), user_id.as_str(), "minutes")
    }

    /// Loads a learner. Unknown learners get the zero state at version 0.
    pub fn load_user(&self, user_id: &UserId) -> Result<UserRecord, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT current_streak, longest_streak, last_activity_date, freeze_count,
                       last_freeze_date, bonus_freezes, total_xp, version
                FROM users
                WHERE user_id = ?
                ",
                [user_id.as_str()],
                StoredUser::from_row,
            )
            .optional()?;

        let granted_milestones = self.granted_names(user_id)?;
        let Some(stored) = row else {
            return Ok(UserRecord {
                user_id: user_id.clone(),
                progress: UserProgress {
                    granted_milestones,
                    ..UserProgress::default()
                },
                version: 0,
            });
        };

        let id = user_id.as_str();
        let streak = StreakState {
            current_streak: to_u32(stored.current_streak, id, "current_streak")?,
            longest_streak: to_u32(stored.longest_streak, id, "longest_streak")?,
            last_activity_date: parse_date(stored.last_activity_date, id)?,
            freeze_count: to_u32(stored.freeze_count, id, "freeze_count")?,
            last_freeze_date: parse_date(stored.last_freeze_date, id)?,
            bonus_freezes: to_u32(stored.bonus_freezes, id, "bonus_freezes")?,
        };
        let total_xp = u64::try_from(stored.total_xp).map_err(|_| DbError::InvalidRecord {
            id: id.to_string(),
            message: format!("total_xp out of range: {}", stored.total_xp),
        })?;

        Ok(UserRecord {
            user_id: user_id.clone(),
            progress: UserProgress {
                streak,
                progression: ProgressionState::new(total_xp),
                granted_milestones,
            },
            version: stored.version,
        })
    }

    fn granted_names(&self, user_id: &UserId) -> Result<BTreeSet<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT milestone_name FROM milestone_grants WHERE user_id = ?")?;
        let rows = stmt.query_map([user_id.as_str()], |row| row.get::<_, String>(0))?;
        let mut names = BTreeSet::new();
        for row in rows {
            names.insert(row?);
        }
        Ok(names)
    }

    /// Writes a learner if nobody else has since `expected_version`.
    ///
    /// `grant` records a newly granted milestone in the same transaction.
    /// Returns the new version.
    pub fn save_user(
        &mut self,
        user_id: &UserId,
        expected_version: i64,
        progress: &UserProgress,
        grant: Option<&Milestone>,
        now: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_user(&tx, user_id, expected_version, progress, grant, now)?;
        tx.commit()?;
        Ok(expected_version + 1)
    }

    /// Stores one event and the progress it produced in a single transaction.
    ///
    /// Returns `Ok(false)` without touching the learner when the event ID
    /// already exists. A stale `expected_version` fails with
    /// [`DbError::VersionConflict`] and leaves the event unstored.
    pub fn record_event_with_progress(
        &mut self,
        event: &ActivityRecord,
        expected_version: i64,
        progress: &UserProgress,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let user_id = UserId::new(event.user_id.as_str()).map_err(|err| DbError::InvalidRecord {
            id: event.id.clone(),
            message: err.to_string(),
        })?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "
            INSERT OR IGNORE INTO activity_events (id, user_id, type, xp_amount, timestamp)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                event.id,
                event.user_id,
                event.kind,
                event.xp_amount,
                event.timestamp,
            ],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        write_user(&tx, &user_id, expected_version, progress, None, now)?;
        tx.commit()?;
        Ok(true)
    }

    /// Every learner with stored state, events or study time.
    pub fn list_user_ids(&self) -> Result<Vec<UserId>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT user_id FROM users
            UNION SELECT user_id FROM activity_events
            UNION SELECT user_id FROM study_time
            ORDER BY 1 ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            let raw = row?;
            let id = UserId::new(raw.clone()).map_err(|err| DbError::InvalidRecord {
                id: raw,
                message: err.to_string(),
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Stored learners ordered by ID.
    pub fn list_users(&self) -> Result<Vec<UserSummary>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT user_id, current_streak, longest_streak, last_activity_date, total_xp
            FROM users
            ORDER BY user_id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        let mut users = Vec::new();
        for row in rows {
            let (user_id, current, longest, last_activity_date, total_xp) = row?;
            let total_xp = u64::try_from(total_xp).unwrap_or(0);
            users.push(UserSummary {
                current_streak: to_u32(current, &user_id, "current_streak")?,
                longest_streak: to_u32(longest, &user_id, "longest_streak")?,
                last_activity_date,
                total_xp,
                level: level_for(total_xp),
                user_id,
            });
        }
        Ok(users)
    }

    /// A learner's grant ledger, oldest first.
    pub fn list_grants(&self, user_id: &UserId) -> Result<Vec<MilestoneGrantRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT user_id, milestone_name, reward_type, reward_amount, streak_threshold, granted_at
            FROM milestone_grants
            WHERE user_id = ?
            ORDER BY streak_threshold ASC
            ",
        )?;
        let rows = stmt.query_map([user_id.as_str()], |row| {
            Ok(MilestoneGrantRecord {
                user_id: row.get(0)?,
                milestone_name: row.get(1)?,
                reward_type: row.get(2)?,
                reward_amount: row.get(3)?,
                streak_threshold: row.get(4)?,
                granted_at: row.get(5)?,
            })
        })?;
        let mut grants = Vec::new();
        for row in rows {
            grants.push(row?);
        }
        Ok(grants)
    }
}

/// Raw `users` row before conversion to domain types.
struct StoredUser {
    current_streak: i64,
    longest_streak: i64,
    last_activity_date: Option<String>,
    freeze_count: i64,
    last_freeze_date: Option<String>,
    bonus_freezes: i64,
    total_xp: i64,
    version: i64,
}

impl StoredUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            current_streak: row.get(0)?,
            longest_streak: row.get(1)?,
            last_activity_date: row.get(2)?,
            freeze_count: row.get(3)?,
            last_freeze_date: row.get(4)?,
            bonus_freezes: row.get(5)?,
            total_xp: row.get(6)?,
            version: row.get(7)?,
        })
    }
}

/// Versioned write of one learner row plus an optional grant, inside `tx`.
fn write_user(
    tx: &Transaction<'_>,
    user_id: &UserId,
    expected_version: i64,
    progress: &UserProgress,
    grant: Option<&Milestone>,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let conflict = || DbError::VersionConflict {
        user_id: user_id.to_string(),
        expected: expected_version,
    };
    let streak = &progress.streak;
    let total_xp =
        i64::try_from(progress.progression.total_xp).map_err(|_| DbError::InvalidRecord {
            id: user_id.to_string(),
            message: format!("total_xp out of range: {}", progress.progression.total_xp),
        })?;
    let updated_at = format_timestamp(now);

    let changed = if expected_version == 0 {
        tx.execute(
            "
            INSERT OR IGNORE INTO users
            (user_id, current_streak, longest_streak, last_activity_date, freeze_count,
             last_freeze_date, bonus_freezes, total_xp, version, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            ",
            params![
                user_id.as_str(),
                streak.current_streak,
                streak.longest_streak,
                streak.last_activity_date.map(format_date),
                streak.freeze_count,
                streak.last_freeze_date.map(format_date),
                streak.bonus_freezes,
                total_xp,
                updated_at,
            ],
        )?
    } else {
        tx.execute(
            "
            UPDATE users SET
                current_streak = ?,
                longest_streak = ?,
                last_activity_date = ?,
                freeze_count = ?,
                last_freeze_date = ?,
                bonus_freezes = ?,
                total_xp = ?,
                version = version + 1,
                updated_at = ?
            WHERE user_id = ? AND version = ?
            ",
            params![
                streak.current_streak,
                streak.longest_streak,
                streak.last_activity_date.map(format_date),
                streak.freeze_count,
                streak.last_freeze_date.map(format_date),
                streak.bonus_freezes,
                total_xp,
                updated_at,
                user_id.as_str(),
                expected_version,
            ],
        )?
    };
    if changed == 0 {
        tracing::debug!(user_id = %user_id, expected_version, "stale learner version");
        return Err(conflict());
    }

    if let Some(milestone) = grant {
        let inserted = tx.execute(
            "
            INSERT OR IGNORE INTO milestone_grants
            (user_id, milestone_name, reward_type, reward_amount, streak_threshold, granted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
            params![
                user_id.as_str(),
                milestone.name,
                milestone.reward_type.as_str(),
                milestone.reward_amount,
                milestone.streak_threshold,
                updated_at,
            ],
        )?;
        if inserted == 0 {
            tracing::warn!(
                user_id = %user_id,
                milestone = %milestone.name,
                "milestone already in grant ledger"
            );
            return Err(conflict());
        }
    }

    Ok(())
}

fn to_u32(value: i64, id: &str, column: &str) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| DbError::InvalidRecord {
        id: id.to_string(),
        message: format!("{column} out of range: {value}"),
    })
}

fn parse_date(value: Option<String>, user_id: &str) -> Result<Option<NaiveDate>, DbError> {
    value
        .map(|value| {
            NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|source| DbError::DateParse {
                user_id: user_id.to_string(),
                value,
                source,
            })
        })
        .transpose()
}

fn parse_timestamp(timestamp: &str, event_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            event_id: event_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
