//! Progress command for the dashboard view of one learner.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use lumen_core::{Tier, UserId};

use crate::commands::util::{describe_reward, resolve_date, status_label};
use crate::service::Service;

#[derive(Debug, Args)]
pub struct ProgressArgs {
    /// Learner ID.
    pub user: String,

    /// Subscription tier used for the freeze allowance (free or pro).
    #[arg(long, default_value_t = Tier::Free)]
    pub tier: Tier,

    /// Report as of this day. Defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &ProgressArgs,
    service: &Service,
    today: NaiveDate,
) -> Result<()> {
    let user_id = UserId::new(args.user.as_str()).context("invalid learner id")?;
    let date = resolve_date(args.date.as_deref(), today, today)?;
    let report = service.query_progress(&user_id, args.tier, date)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(writer, "Progress for {user_id} as of {date}")?;
    writeln!(
        writer,
        "Streak: {} days (longest {}, {})",
        report.current_streak,
        report.longest_streak,
        status_label(report.status)
    )?;
    writeln!(
        writer,
        "Level {}: {}/{} xp ({}%), total {} xp",
        report.level,
        report.progress_within_level,
        report.xp_for_next_level,
        report.progress_percent,
        report.total_xp
    )?;
    writeln!(writer, "Freezes remaining: {}", report.freezes_remaining)?;
    let next = &report.next_milestone;
    writeln!(
        writer,
        "Next milestone: {} in {} days ({})",
        next.name,
        next.days_remaining,
        describe_reward(next.reward_type, next.reward_amount)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};
    use insta::assert_snapshot;
    use lumen_core::{ActivityEvent, ActivityKind, Engine, EngineConfig};
    use lumen_db::Database;

    use super::*;

    fn d(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap() + TimeDelta::days(offset)
    }

    fn service() -> Service {
        Service::new(
            Database::open_in_memory().unwrap(),
            Engine::new(EngineConfig::default()),
        )
    }

    fn args(tier: Tier, json: bool) -> ProgressArgs {
        ProgressArgs {
            user: "u1".to_string(),
            tier,
            date: None,
            json,
        }
    }

    #[test]
    fn progress_for_new_learner() {
        let service = service();
        let mut output = Vec::new();
        run(&mut output, &args(Tier::Free, false), &service, d(0)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Progress for u1 as of 2025-03-10
        Streak: 0 days (longest 0, inactive)
        Level 1: 0/100 xp (0%), total 0 xp
        Freezes remaining: 2
        Next milestone: Week Warrior in 7 days (+100 xp)
        ");
    }

    #[test]
    fn progress_reports_at_risk_streak() {
        let mut service = service();
        let user_id = UserId::new("u1").unwrap();
        for offset in 0..3 {
            let event = ActivityEvent {
                kind: ActivityKind::QuizComplete,
                xp_amount: 50,
                timestamp: Utc.from_utc_datetime(&d(offset).and_hms_opt(9, 0, 0).unwrap()),
            };
            service
                .record_activity(&format!("e{offset}"), &user_id, &event)
                .unwrap();
            service.evaluate_day(&user_id, d(offset)).unwrap();
        }

        let mut output = Vec::new();
        run(&mut output, &args(Tier::Pro, false), &service, d(3)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Progress for u1 as of 2025-03-13
        Streak: 3 days (longest 3, at risk)
        Level 2: 50/200 xp (25%), total 150 xp
        Freezes remaining: 5
        Next milestone: Week Warrior in 4 days (+100 xp)
        ");
    }

    #[test]
    fn progress_json_exposes_next_milestone() {
        let service = service();
        let mut output = Vec::new();
        run(&mut output, &args(Tier::Free, true), &service, d(0)).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["status"], "inactive");
        assert_eq!(value["next_milestone"]["name"], "Week Warrior");
        assert_eq!(value["next_milestone"]["extrapolated"], false);
    }
}
