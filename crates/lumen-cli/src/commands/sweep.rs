//! Sweep command for the scheduled end-of-day pass.

use std::io::Write;

use anyhow::Result;
use chrono::{NaiveDate, TimeDelta};
use clap::Args;

use crate::commands::util::resolve_date;
use crate::service::Service;

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Day to evaluate. Defaults to yesterday.
    #[arg(long)]
    pub date: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    args: &SweepArgs,
    service: &mut Service,
    today: NaiveDate,
) -> Result<()> {
    let yesterday = today - TimeDelta::days(1);
    let date = resolve_date(args.date.as_deref(), today, yesterday)?;
    let report = service.sweep(date)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(writer, "Swept {date}: {} learners evaluated", report.evaluated)?;
    writeln!(
        writer,
        "Extended: {}, maintained: {}, broken: {}",
        report.extended, report.maintained, report.broken
    )?;
    writeln!(writer, "Milestones granted: {}", report.milestones_granted)?;
    if report.settled > 0 {
        writeln!(writer, "Earlier days settled: {}", report.settled)?;
    }
    if report.retried > 0 {
        writeln!(writer, "Re-evaluated after conflicts: {}", report.retried)?;
    }
    if report.failed > 0 {
        writeln!(writer, "Failed: {} (see log)", report.failed)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;
    use lumen_core::{ActivityEvent, ActivityKind, Engine, EngineConfig, UserId};
    use lumen_db::Database;

    use super::*;

    fn service() -> Service {
        Service::new(
            Database::open_in_memory().unwrap(),
            Engine::new(EngineConfig::default()),
        )
    }

    #[test]
    fn sweep_defaults_to_yesterday() {
        let mut service = service();
        let event = ActivityEvent {
            kind: ActivityKind::QuizComplete,
            xp_amount: 20,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 9, 20, 0, 0).unwrap(),
        };
        service
            .record_activity("e1", &UserId::new("alice").unwrap(), &event)
            .unwrap();
        service
            .log_time(
                &UserId::new("bob").unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
                2,
            )
            .unwrap();

        let mut output = Vec::new();
        let args = SweepArgs {
            date: None,
            json: false,
        };
        run(
            &mut output,
            &args,
            &mut service,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Swept 2025-03-09: 2 learners evaluated
        Extended: 1, maintained: 0, broken: 0
        Milestones granted: 0
        ");
    }

    #[test]
    fn sweep_settles_missed_nights_first() {
        let mut service = service();
        let alice = UserId::new("alice").unwrap();
        for day in 7..10 {
            let event = ActivityEvent {
                kind: ActivityKind::LessonComplete,
                xp_amount: 10,
                timestamp: Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap(),
            };
            service
                .record_activity(&format!("e{day}"), &alice, &event)
                .unwrap();
        }
        service
            .evaluate_day(&alice, NaiveDate::from_ymd_opt(2025, 3, 7).unwrap())
            .unwrap();

        let mut output = Vec::new();
        let args = SweepArgs {
            date: Some("2025-03-09".to_string()),
            json: false,
        };
        run(
            &mut output,
            &args,
            &mut service,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Swept 2025-03-09: 1 learners evaluated
        Extended: 1, maintained: 0, broken: 0
        Milestones granted: 0
        Earlier days settled: 1
        ");
    }

    #[test]
    fn sweep_json_reports_counts() {
        let mut service = service();
        let mut output = Vec::new();
        let args = SweepArgs {
            date: Some("2025-03-01".to_string()),
            json: true,
        };
        run(
            &mut output,
            &args,
            &mut service,
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["target_date"], "2025-03-01");
        assert_eq!(value["evaluated"], 0);
        assert_eq!(value["failed"], 0);
    }
}
