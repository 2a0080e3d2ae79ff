use chrono::{DateTime, Utc};

use crate::config::Thresholds;
use crate::error::StoreResult;
use crate::models::{NotificationType, User, UserScope};
use crate::notify::{self, ResolvePolicy, RunSummary};
use crate::rules::Rule;
use crate::store::Store;
use crate::window;

pub const KIND: NotificationType = NotificationType::TimesheetLockoutAlarm;
pub const POLICY: ResolvePolicy = ResolvePolicy::ManualClearance;
const RULE_ID: &str = "TIMESHEET_LOCKOUT_MAX_IGNORES";

/// Locks out viewers who keep ignoring the missing-timesheet alert.
pub async fn evaluate<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> StoreResult<RunSummary> {
    let mut summary = RunSummary::new(Rule::Lockout, POLICY);
    let day = window::target_day(now, thresholds.target_day_offset);

    let users = store.users_in_scope(UserScope::ActiveViewers).await?;
    tracing::info!(
        count = users.len(),
        threshold = thresholds.lockout_ignored_alerts,
        "checking ignored alert counts"
    );

    for user in &users {
        summary.evaluated += 1;
        match check_user(store, thresholds, day, user).await {
            Ok(Some(true)) => summary.created += 1,
            Ok(Some(false)) => {}
            Ok(None) => summary.skipped += 1,
            Err(err) => summary.record_failure(&user.email, &err),
        }
    }

    Ok(summary)
}

/// `None` when the user has no log for the day, otherwise whether an alarm
/// was opened.
async fn check_user<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    day: chrono::NaiveDate,
    user: &User,
) -> StoreResult<Option<bool>> {
    let Some(log) = store.daily_log(user.id, day).await? else {
        tracing::debug!(user = %user.email, %day, "no activity log for target day");
        return Ok(None);
    };

    let ignored = log.ignored_alert_count;
    if ignored < thresholds.lockout_ignored_alerts {
        tracing::debug!(user = %user.email, ignored, "ignore count within limits");
        return Ok(Some(false));
    }

    let alarm = notify::self_addressed(
        user,
        KIND,
        Some(RULE_ID),
        "Account Locked: Non-Compliance",
        format!(
            "You have ignored the timesheet alert {ignored} times. \
             Your account is locked until manager approval."
        ),
        &thresholds.sender_name,
    );
    Ok(Some(notify::open_once(store, alarm, &[]).await?))
}
