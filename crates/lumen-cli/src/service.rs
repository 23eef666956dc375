//! The caller layer around the engine.
//!
//! Every mutation follows the same contract: load the learner with its
//! version, run the pure engine, and commit with an optimistic version check.
//! A conflicting writer (another `lumen` process, or the nightly sweep racing
//! an on-demand evaluation) causes a reload and a fresh evaluation, up to
//! [`MAX_COMMIT_ATTEMPTS`] times.
//!
//! Evaluating a day first settles any earlier day the learner's streak still
//! depends on, so the on-demand and nightly triggers reach the same state in
//! either order.

use anyhow::bail;
use chrono::{NaiveDate, TimeDelta, Utc};
use lumen_core::{
    ActivityEvent, DayEvaluation, Engine, FreezeDenial, ProgressReport, ProgressionError,
    StreakState, Tier, UserId, XpApplication,
};
use lumen_db::{ActivityRecord, Database, DbError, UserRecord};
use rayon::prelude::*;
use serde::Serialize;

/// Attempts per learner before a version conflict is reported.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Outcome of a freeze request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FreezeOutcome {
    Applied { streak: StreakState, freezes_remaining: u32 },
    Denied { reason: FreezeDenial },
}

/// Outcome of recording one activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// False when an event with the same ID already existed.
    pub inserted: bool,
    /// XP applied for the event, if it carried any.
    pub xp: Option<XpApplication>,
}

/// Totals from one scheduled pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub target_date: Option<NaiveDate>,
    pub evaluated: usize,
    pub extended: usize,
    pub maintained: usize,
    pub broken: usize,
    pub milestones_granted: usize,
    /// Learners whose precomputed result went stale and were re-evaluated.
    pub retried: usize,
    /// Earlier days that had to be settled before the target day.
    pub settled: usize,
    /// Learners skipped because loading or committing failed.
    pub failed: usize,
}

impl SweepReport {
    fn count(&mut self, evaluation: &DayEvaluation) {
        self.evaluated += 1;
        if evaluation.extended() {
            self.extended += 1;
        }
        if evaluation.maintained() {
            self.maintained += 1;
        }
        if evaluation.broken() {
            self.broken += 1;
        }
        if evaluation.granted_milestone().is_some() {
            self.milestones_granted += 1;
        }
    }

    fn count_settled(&mut self, settled: &[DayEvaluation]) {
        self.settled += settled.len();
        for evaluation in settled {
            if evaluation.broken() {
                self.broken += 1;
            }
            if evaluation.granted_milestone().is_some() {
                self.milestones_granted += 1;
            }
        }
    }
}

/// Engine plus storage.
pub struct Service {
    db: Database,
    engine: Engine,
}

impl Service {
    pub const fn new(db: Database, engine: Engine) -> Self {
        Self { db, engine }
    }

    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Today in the engine's reference calendar.
    pub fn today(&self) -> NaiveDate {
        self.engine.calendar().today(Utc::now())
    }

    /// Store one activity event and award its XP.
    ///
    /// The event and the learner's new total are written in one transaction.
    /// A duplicate event ID is ignored and awards nothing.
    pub fn record_activity(
        &mut self,
        event_id: &str,
        user_id: &UserId,
        event: &ActivityEvent,
    ) -> anyhow::Result<RecordOutcome> {
        let record = ActivityRecord::from_event(event_id, user_id, event);
        if event.xp_amount == 0 {
            let inserted = self.db.insert_activity_events(&[record])? > 0;
            return Ok(RecordOutcome { inserted, xp: None });
        }

        let delta = i64::from(event.xp_amount);
        let db = &mut self.db;
        let engine = &self.engine;
        let outcome = retry_on_conflict(user_id, || {
            let user = db.load_user(user_id)?;
            match engine.award_xp(&user.progress, delta) {
                Ok((progress, applied)) => {
                    let inserted =
                        db.record_event_with_progress(&record, user.version, &progress, Utc::now())?;
                    Ok(Ok(RecordOutcome {
                        inserted,
                        xp: inserted.then_some(applied),
                    }))
                }
                Err(err) => Ok(Err(err)),
            }
        })??;
        match outcome.xp {
            Some(applied) => {
                tracing::info!(user_id = %user_id, event_id, delta, new_total = applied.new_total, "recorded activity");
            }
            None => tracing::debug!(user_id = %user_id, event_id, "duplicate activity ignored"),
        }
        Ok(outcome)
    }

    /// Add study minutes for a day. Returns the day's new total.
    pub fn log_time(&mut self, user_id: &UserId, date: NaiveDate, minutes: u32) -> anyhow::Result<u32> {
        Ok(self.db.add_study_minutes(user_id, date, minutes)?)
    }

    /// Apply XP directly. Non-positive deltas are rejected before anything
    /// is loaded or written.
    pub fn award_xp(&mut self, user_id: &UserId, delta: i64) -> anyhow::Result<XpApplication> {
        if delta <= 0 {
            return Err(ProgressionError::InvalidAmount { delta }.into());
        }
        let db = &mut self.db;
        let engine = &self.engine;
        let applied = retry_on_conflict(user_id, || {
            let record = db.load_user(user_id)?;
            match engine.award_xp(&record.progress, delta) {
                Ok((progress, applied)) => {
                    db.save_user(user_id, record.version, &progress, None, Utc::now())?;
                    Ok(Ok(applied))
                }
                Err(err) => Ok(Err(err)),
            }
        })??;
        tracing::info!(user_id = %user_id, delta, new_total = applied.new_total, "awarded xp");
        Ok(applied)
    }

    /// On-demand or scheduled evaluation of one learner's day.
    ///
    /// Unsettled earlier days are evaluated first, oldest first.
    pub fn evaluate_day(&mut self, user_id: &UserId, target_date: NaiveDate) -> anyhow::Result<DayEvaluation> {
        let (_, evaluation) = self.settle_and_evaluate(user_id, target_date)?;
        Ok(evaluation)
    }

    /// Evaluate the days `target_date` depends on, then `target_date`.
    ///
    /// Returns the settled days' evaluations that changed state, followed by
    /// the target day's.
    fn settle_and_evaluate(
        &mut self,
        user_id: &UserId,
        target_date: NaiveDate,
    ) -> Result<(Vec<DayEvaluation>, DayEvaluation), DbError> {
        let record = self.db.load_user(user_id)?;
        let mut settled = Vec::new();
        if let Some(mut day) = record.progress.streak.first_unsettled_day(target_date) {
            while day < target_date {
                let (evaluation, changed) = self.evaluate_single(user_id, day)?;
                let live = evaluation.progress.streak.current_streak > 0;
                if changed {
                    tracing::debug!(
                        user_id = %user_id,
                        %day,
                        transition = ?evaluation.transition,
                        "settled earlier day"
                    );
                    settled.push(evaluation);
                }
                if !live {
                    break;
                }
                day += TimeDelta::days(1);
            }
        }

        let (evaluation, _) = self.evaluate_single(user_id, target_date)?;
        tracing::info!(
            user_id = %user_id,
            %target_date,
            transition = ?evaluation.transition,
            current_streak = evaluation.progress.streak.current_streak,
            settled = settled.len(),
            "evaluated day"
        );
        Ok((settled, evaluation))
    }

    /// One day, one versioned commit. Also reports whether state changed.
    fn evaluate_single(&mut self, user_id: &UserId, date: NaiveDate) -> Result<(DayEvaluation, bool), DbError> {
        let db = &mut self.db;
        let engine = &self.engine;
        retry_on_conflict(user_id, || {
            let record = db.load_user(user_id)?;
            let events = db.activity_for_day(user_id, engine.calendar(), date)?;
            let minutes = db.study_minutes(user_id, date)?;
            let evaluation = engine.evaluate_day(&record.progress, &events, minutes, date);
            let changed = commit_evaluation(db, &record, &evaluation)?;
            Ok((evaluation, changed))
        })
    }

    /// Spend a streak freeze on `today` if the learner is eligible.
    pub fn request_freeze(
        &mut self,
        user_id: &UserId,
        tier: Tier,
        today: NaiveDate,
    ) -> anyhow::Result<FreezeOutcome> {
        let current = self.db.load_user(user_id)?;
        if let Some(last) = current
            .progress
            .streak
            .last_activity_date
            .filter(|last| today < *last)
        {
            bail!("cannot freeze {today}: {user_id} already counted through {last}");
        }

        let db = &mut self.db;
        let engine = &self.engine;
        let outcome = retry_on_conflict(user_id, || {
            let record = db.load_user(user_id)?;
            match engine.request_freeze(&record.progress, tier, today) {
                Ok(progress) => {
                    db.save_user(user_id, record.version, &progress, None, Utc::now())?;
                    Ok(FreezeOutcome::Applied {
                        streak: progress.streak,
                        freezes_remaining: engine.config().freeze.freezes_remaining(tier, &progress.streak),
                    })
                }
                Err(reason) => Ok(FreezeOutcome::Denied { reason }),
            }
        })?;
        match &outcome {
            FreezeOutcome::Applied { .. } => tracing::info!(user_id = %user_id, %today, "streak frozen"),
            FreezeOutcome::Denied { reason } => {
                tracing::info!(user_id = %user_id, reason = reason.code(), "freeze denied");
            }
        }
        Ok(outcome)
    }

    /// Read-only dashboard view.
    pub fn query_progress(&self, user_id: &UserId, tier: Tier, today: NaiveDate) -> anyhow::Result<ProgressReport> {
        let record = self.db.load_user(user_id)?;
        Ok(self.engine.query_progress(&record.progress, tier, today))
    }

    /// Scheduled pass: evaluate `target_date` for every known learner.
    ///
    /// Learners with no earlier day to settle are evaluated in parallel from
    /// inputs loaded up front; commits are applied one learner at a time. A
    /// learner with days to settle, or whose state moved since it was loaded,
    /// goes through [`Service::evaluate_day`]. A learner that fails to load or
    /// commit is logged and counted, and the pass continues.
    pub fn sweep(&mut self, target_date: NaiveDate) -> anyhow::Result<SweepReport> {
        let user_ids = self.db.list_user_ids()?;
        let mut report = SweepReport {
            target_date: Some(target_date),
            ..SweepReport::default()
        };

        let mut inputs = Vec::with_capacity(user_ids.len());
        let mut unsettled = Vec::new();
        for user_id in user_ids {
            match self.load_sweep_input(&user_id, target_date) {
                Ok(Some(input)) => inputs.push(input),
                Ok(None) => unsettled.push(user_id),
                Err(err) => {
                    tracing::error!(user_id = %user_id, error = %err, "failed to load learner for sweep");
                    report.failed += 1;
                }
            }
        }
        tracing::debug!(
            users = inputs.len(),
            unsettled = unsettled.len(),
            %target_date,
            "loaded sweep inputs"
        );

        let engine = &self.engine;
        let evaluated: Vec<(UserRecord, DayEvaluation)> = inputs
            .into_par_iter()
            .map(|(record, events, minutes)| {
                let evaluation = engine.evaluate_day(&record.progress, &events, minutes, target_date);
                (record, evaluation)
            })
            .collect();

        for (record, evaluation) in evaluated {
            match commit_evaluation(&mut self.db, &record, &evaluation) {
                Ok(_) => report.count(&evaluation),
                Err(DbError::VersionConflict { .. }) => {
                    tracing::warn!(user_id = %record.user_id, "learner changed during sweep, re-evaluating");
                    report.retried += 1;
                    self.sweep_serial(&record.user_id, target_date, &mut report);
                }
                Err(err) => {
                    tracing::error!(user_id = %record.user_id, error = %err, "failed to commit sweep result");
                    report.failed += 1;
                }
            }
        }
        for user_id in &unsettled {
            self.sweep_serial(user_id, target_date, &mut report);
        }

        tracing::info!(
            %target_date,
            evaluated = report.evaluated,
            broken = report.broken,
            milestones_granted = report.milestones_granted,
            settled = report.settled,
            failed = report.failed,
            "sweep complete"
        );
        Ok(report)
    }

    /// Inputs for the parallel path, or `None` when the learner has earlier
    /// days to settle first.
    fn load_sweep_input(
        &self,
        user_id: &UserId,
        target_date: NaiveDate,
    ) -> Result<Option<(UserRecord, Vec<ActivityEvent>, u32)>, DbError> {
        let record = self.db.load_user(user_id)?;
        if record.progress.streak.first_unsettled_day(target_date).is_some() {
            return Ok(None);
        }
        let events = self
            .db
            .activity_for_day(user_id, self.engine.calendar(), target_date)?;
        let minutes = self.db.study_minutes(user_id, target_date)?;
        Ok(Some((record, events, minutes)))
    }

    fn sweep_serial(&mut self, user_id: &UserId, target_date: NaiveDate, report: &mut SweepReport) {
        match self.settle_and_evaluate(user_id, target_date) {
            Ok((settled, evaluation)) => {
                report.count_settled(&settled);
                report.count(&evaluation);
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "failed to evaluate learner during sweep");
                report.failed += 1;
            }
        }
    }
}

/// Persist an evaluation. Unchanged progress is not written; the return
/// value says whether anything was.
fn commit_evaluation(
    db: &mut Database,
    record: &UserRecord,
    evaluation: &DayEvaluation,
) -> Result<bool, DbError> {
    if evaluation.progress == record.progress {
        return Ok(false);
    }
    db.save_user(
        &record.user_id,
        record.version,
        &evaluation.progress,
        evaluation.granted_milestone(),
        Utc::now(),
    )?;
    Ok(true)
}

fn retry_on_conflict<T>(
    user_id: &UserId,
    mut attempt: impl FnMut() -> Result<T, DbError>,
) -> Result<T, DbError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt() {
            Err(DbError::VersionConflict { .. }) if attempts < MAX_COMMIT_ATTEMPTS => {
                tracing::warn!(user_id = %user_id, attempts, "version conflict, retrying");
            }
            result => return result,
        }
    }
}
