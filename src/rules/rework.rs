use chrono::{DateTime, Duration, Utc};

use crate::config::Thresholds;
use crate::error::StoreResult;
use crate::models::{NotificationType, User, UserScope};
use crate::notify::{self, ResolvePolicy, RunSummary};
use crate::rules::Rule;
use crate::store::Store;
use crate::window::{self, ReworkRatio};

pub const POLICY: ResolvePolicy = ResolvePolicy::ManualClearance;
const RULE_ID: &str = "REWORK_RATIO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Normal,
    High,
    Critical,
}

pub fn tier(percent: f64, thresholds: &Thresholds) -> Tier {
    if percent > thresholds.high_rework_percent {
        Tier::Critical
    } else if percent > thresholds.rework_percent {
        Tier::High
    } else {
        Tier::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    NoTime,
    Opened,
    AlreadyActive,
    WithinLimit,
}

/// Rework ratio over the lookback window. The critical tier freezes task
/// assignment; alarms stay until cleared by appeal review.
pub async fn evaluate<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> StoreResult<RunSummary> {
    let mut summary = RunSummary::new(Rule::Rework, POLICY);
    let since = now.date_naive() - Duration::days(thresholds.rework_lookback_days);

    let users = store.users_in_scope(UserScope::ActiveMembers).await?;
    tracing::info!(
        count = users.len(),
        %since,
        threshold = thresholds.rework_percent,
        "checking rework ratio"
    );

    for user in &users {
        summary.evaluated += 1;
        match check_user(store, thresholds, now, since, user).await {
            Ok(Outcome::NoTime) => summary.skipped += 1,
            Ok(Outcome::Opened) => summary.created += 1,
            Ok(Outcome::AlreadyActive) | Ok(Outcome::WithinLimit) => {}
            Err(err) => summary.record_failure(&user.email, &err),
        }
    }

    Ok(summary)
}

async fn check_user<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
    since: chrono::NaiveDate,
    user: &User,
) -> StoreResult<Outcome> {
    let timesheets = store.timesheets_since(&user.email, since).await?;
    let Some(ratio) = window::rework_ratio(&timesheets, since) else {
        tracing::debug!(user = %user.email, "no logged time in window");
        return Ok(Outcome::NoTime);
    };

    let percent = window::round_one_decimal(ratio.percent);
    tracing::debug!(
        user = %user.email,
        total_minutes = ratio.total_minutes,
        rework_minutes = ratio.rework_minutes,
        percent,
        "rework ratio"
    );

    // The audit row is best effort.
    if let Err(err) = store.record_rework_check(user, percent, now).await {
        tracing::error!(user = %user.email, error = %err, "failed to record rework check");
    }

    let blocked_by_critical = [NotificationType::HighReworkAlarm];
    let (kind, also_blocked_by, message): (_, &[NotificationType], _) =
        match tier(ratio.percent, thresholds) {
            Tier::Normal => return Ok(Outcome::WithinLimit),
            Tier::Critical => (
                NotificationType::HighReworkAlarm,
                &[][..],
                critical_message(&ratio, thresholds),
            ),
            Tier::High => (
                NotificationType::ReworkAlarm,
                &blocked_by_critical[..],
                high_message(&ratio, thresholds),
            ),
        };

    let title = match kind {
        NotificationType::HighReworkAlarm => "Critical Rework Detected",
        _ => "High Rework Detected",
    };
    let alarm = notify::self_addressed(
        user,
        kind,
        Some(RULE_ID),
        title,
        message,
        &thresholds.sender_name,
    );
    if notify::open_once(store, alarm, also_blocked_by).await? {
        Ok(Outcome::Opened)
    } else {
        Ok(Outcome::AlreadyActive)
    }
}

fn critical_message(ratio: &ReworkRatio, thresholds: &Thresholds) -> String {
    format!(
        "Your rework time is at {:.1}%, exceeding the {}% threshold. \
         Task assignments are frozen. Peer review required.",
        ratio.percent, thresholds.high_rework_percent
    )
}

fn high_message(ratio: &ReworkRatio, thresholds: &Thresholds) -> String {
    format!(
        "Your rework time is at {:.1}%, exceeding the {}% threshold. \
         Peer review is recommended.",
        ratio.percent, thresholds.rework_percent
    )
}
