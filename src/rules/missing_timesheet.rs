use chrono::{DateTime, Utc};

use crate::config::Thresholds;
use crate::error::StoreResult;
use crate::models::{NotificationType, User, UserScope};
use crate::notify::{self, ResolvePolicy, RunSummary};
use crate::rules::Rule;
use crate::store::Store;
use crate::window;

pub const KIND: NotificationType = NotificationType::TimesheetMissingAlert;
pub const POLICY: ResolvePolicy = ResolvePolicy::AutoResolve;
const RULE_ID: &str = "TIMESHEET_MISSING_ASSIGNED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    NoLog,
    WithinGrace,
    Opened,
    Ignored,
    UnderAppeal,
    Resolved,
    Compliant,
}

pub async fn evaluate<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> StoreResult<RunSummary> {
    let mut summary = RunSummary::new(Rule::MissingTimesheet, POLICY);

    summary.resolved += sweep_stale(store).await?;

    let users = store.users_in_scope(UserScope::ActiveViewers).await?;
    tracing::info!(count = users.len(), "checking active viewers");

    for user in &users {
        summary.evaluated += 1;
        match check_user(store, thresholds, now, user).await {
            Ok(Outcome::NoLog) | Ok(Outcome::WithinGrace) => summary.skipped += 1,
            Ok(Outcome::Opened) => summary.created += 1,
            Ok(Outcome::Ignored) => summary.escalated += 1,
            Ok(Outcome::Resolved) => summary.resolved += 1,
            Ok(Outcome::UnderAppeal) | Ok(Outcome::Compliant) => {}
            Err(err) => summary.record_failure(&user.email, &err),
        }
    }

    Ok(summary)
}

/// Resolves open alerts whose owner is gone, inactive, or no longer a viewer.
async fn sweep_stale<S: Store>(store: &S) -> StoreResult<usize> {
    let mut resolved = 0;
    for alert in store.open_notifications(KIND).await? {
        let owner = store.find_user(&alert.subject_email).await?;
        let still_in_scope = owner
            .as_ref()
            .is_some_and(|user| UserScope::ActiveViewers.contains(user));
        if !still_in_scope && store.resolve_notification(alert.id).await? {
            tracing::info!(user = %alert.subject_email, id = %alert.id, "resolved stale alert");
            resolved += 1;
        }
    }
    Ok(resolved)
}

/// Flags a viewer whose submitted timesheets trail their assigned tasks once
/// the grace period after the scheduled work start has passed.
async fn check_user<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
    user: &User,
) -> StoreResult<Outcome> {
    let day = window::target_day(now, thresholds.target_day_offset);
    let Some(log) = store.daily_log(user.id, day).await? else {
        tracing::debug!(user = %user.email, %day, "no activity log for target day");
        return Ok(Outcome::NoLog);
    };

    let start = window::parse_work_start(
        log.scheduled_working_start.as_deref(),
        thresholds.default_work_start,
    );
    let deadline = window::work_start(log.timestamp.date_naive(), start) + thresholds.grace_period;
    if now <= deadline {
        tracing::debug!(user = %user.email, %deadline, "still within grace period");
        return Ok(Outcome::WithinGrace);
    }

    let assigned = log.total_assigned_tasks;
    let submitted = log.submitted_timesheets_count;
    tracing::debug!(user = %user.email, assigned, submitted, "checking submissions");

    if submitted >= assigned {
        return if notify::resolve_own(store, user, KIND).await? {
            Ok(Outcome::Resolved)
        } else {
            Ok(Outcome::Compliant)
        };
    }

    let alert = notify::self_addressed(
        user,
        KIND,
        Some(RULE_ID),
        "Incomplete Timesheet Submission",
        format!(
            "Submitted {submitted} of {assigned} timesheets for {day}. \
             Log pending hours and submit before end of day."
        ),
        &thresholds.sender_name,
    );
    if notify::open_once(store, alert, &[]).await? {
        return Ok(Outcome::Opened);
    }
    if !store.has_open(&user.email, &user.email, KIND).await? {
        tracing::debug!(user = %user.email, "alert is under appeal, not counted as ignored");
        return Ok(Outcome::UnderAppeal);
    }

    let ignored = store.increment_ignored_alerts(log.id).await?;
    tracing::info!(user = %user.email, ignored, "alert still open, counted as ignored");
    Ok(Outcome::Ignored)
}
