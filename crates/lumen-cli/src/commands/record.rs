//! Record command for storing one activity event.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use lumen_core::{ActivityEvent, ActivityKind, UserId};

use crate::commands::util::parse_timestamp;
use crate::service::Service;

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Learner ID.
    pub user: String,

    /// Activity kind (lesson_complete, question_correct, question_incorrect,
    /// quiz_complete, streak_bonus).
    pub kind: String,

    /// XP carried by the event.
    #[arg(long, default_value_t = 0)]
    pub xp: u32,

    /// When the activity happened (RFC 3339). Defaults to now.
    #[arg(long)]
    pub at: Option<String>,

    /// Event ID for deduplication. Defaults to a fresh UUID.
    #[arg(long)]
    pub id: Option<String>,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &RecordArgs,
    service: &mut Service,
    now: DateTime<Utc>,
) -> Result<()> {
    let user_id = UserId::new(args.user.as_str()).context("invalid learner id")?;
    let kind: ActivityKind = args.kind.parse()?;
    let timestamp = match &args.at {
        Some(at) => parse_timestamp(at)?,
        None => now,
    };
    if timestamp > now {
        bail!("timestamp {} is in the future", timestamp.to_rfc3339());
    }

    let event_id = args
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let event = ActivityEvent {
        kind,
        xp_amount: args.xp,
        timestamp,
    };
    let outcome = service.record_activity(&event_id, &user_id, &event)?;

    if !outcome.inserted {
        writeln!(writer, "Event {event_id} already recorded")?;
        return Ok(());
    }

    let day = service.engine().calendar().date_of(timestamp);
    match outcome.xp {
        Some(applied) => {
            writeln!(
                writer,
                "Recorded {kind} for {user_id} on {day} (+{} xp, total {})",
                args.xp, applied.new_total
            )?;
            if applied.leveled_up {
                writeln!(writer, "Level up: {} -> {}", applied.old_level, applied.new_level)?;
            }
        }
        None => writeln!(writer, "Recorded {kind} for {user_id} on {day}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use insta::assert_snapshot;
    use lumen_core::{Engine, EngineConfig};
    use lumen_db::Database;

    use super::*;

    fn service() -> Service {
        Service::new(
            Database::open_in_memory().unwrap(),
            Engine::new(EngineConfig::default()),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap()
    }

    fn args(kind: &str, xp: u32, id: &str) -> RecordArgs {
        RecordArgs {
            user: "u1".to_string(),
            kind: kind.to_string(),
            xp,
            at: Some("2025-03-10T09:00:00Z".to_string()),
            id: Some(id.to_string()),
        }
    }

    #[test]
    fn record_reports_xp_and_level_up() {
        let mut service = service();
        let mut output = Vec::new();

        run(&mut output, &args("lesson_complete", 60, "e1"), &mut service, now()).unwrap();
        run(&mut output, &args("quiz_complete", 50, "e2"), &mut service, now()).unwrap();
        run(&mut output, &args("question_incorrect", 0, "e3"), &mut service, now()).unwrap();
        run(&mut output, &args("quiz_complete", 50, "e2"), &mut service, now()).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Recorded lesson_complete for u1 on 2025-03-10 (+60 xp, total 60)
        Recorded quiz_complete for u1 on 2025-03-10 (+50 xp, total 110)
        Level up: 1 -> 2
        Recorded question_incorrect for u1 on 2025-03-10
        Event e2 already recorded
        ");
    }

    #[test]
    fn record_rejects_unknown_kind() {
        let mut service = service();
        let mut output = Vec::new();

        let err = run(&mut output, &args("video_watched", 5, "e1"), &mut service, now()).unwrap_err();
        assert!(err.to_string().contains("unknown activity kind"));
    }

    #[test]
    fn record_rejects_future_timestamp() {
        let mut service = service();
        let mut output = Vec::new();
        let mut future = args("lesson_complete", 5, "e1");
        future.at = Some("2025-03-11T09:00:00Z".to_string());

        let err = run(&mut output, &future, &mut service, now()).unwrap_err();
        assert!(err.to_string().contains("in the future"));
    }
}
