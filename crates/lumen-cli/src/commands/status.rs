//! Status command for showing the database and known learners.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use lumen_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let users = db.list_users()?;

    writeln!(writer, "Lumen status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    if users.is_empty() {
        writeln!(writer, "No learners recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Learners:")?;
    for user in users {
        let last = user.last_activity_date.as_deref().unwrap_or("never");
        writeln!(
            writer,
            "- {}: streak {} (longest {}), level {}, {} xp, last active {last}",
            user.user_id, user.current_streak, user.longest_streak, user.level, user.total_xp
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, TimeZone, Utc};
    use insta::assert_snapshot;
    use lumen_core::{ProgressionState, StreakState, UserId, UserProgress};

    use super::*;

    #[test]
    fn status_lists_learners() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("lumen.db");
        let mut db = Database::open(&db_path).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        let active = UserProgress {
            streak: StreakState {
                current_streak: 3,
                longest_streak: 5,
                last_activity_date: NaiveDate::from_ymd_opt(2025, 3, 10),
                ..StreakState::default()
            },
            progression: ProgressionState::new(150),
            granted_milestones: BTreeSet::new(),
        };
        db.save_user(&UserId::new("alice").unwrap(), 0, &active, None, now)
            .unwrap();
        db.save_user(&UserId::new("bob").unwrap(), 0, &UserProgress::default(), None, now)
            .unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &db_path).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&db_path.display().to_string(), "[TEMP]/lumen.db");
        assert_snapshot!(output, @r"
        Lumen status
        Database: [TEMP]/lumen.db
        Learners:
        - alice: streak 3 (longest 5), level 2, 150 xp, last active 2025-03-10
        - bob: streak 0 (longest 0), level 1, 0 xp, last active never
        ");
    }

    #[test]
    fn status_without_learners() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, Path::new("/data/lumen.db")).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Lumen status
        Database: /data/lumen.db
        No learners recorded.
        ");
    }
}
