use chrono::{DateTime, Utc};

use crate::config::Thresholds;
use crate::error::StoreResult;
use crate::models::{NewNotification, NotificationType, User, UserScope};
use crate::notify::{self, ResolvePolicy, RunSummary};
use crate::rules::Rule;
use crate::store::Store;
use crate::window;

pub const KIND: NotificationType = NotificationType::OverworkAlarm;
pub const POLICY: ResolvePolicy = ResolvePolicy::ManualClearance;
const RULE_ID: &str = "OVERWORK_PLANNED_LOAD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Flagged { notified: usize },
    Cleared,
    StillOverloaded,
    Normal,
}

/// Flags members whose planned workload for the week exceeds the limit and
/// warns the tenant's project managers.
pub async fn evaluate<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> StoreResult<RunSummary> {
    let mut summary = RunSummary::new(Rule::Overwork, POLICY);

    let users = store.users_in_scope(UserScope::ActiveMembers).await?;
    tracing::info!(
        count = users.len(),
        threshold = thresholds.overwork_hours,
        mode = ?thresholds.mode,
        "checking planned workload"
    );

    for user in &users {
        summary.evaluated += 1;
        match check_user(store, thresholds, now, user).await {
            Ok(Outcome::Flagged { notified }) => {
                summary.escalated += 1;
                summary.created += notified;
            }
            Ok(Outcome::Cleared) => summary.resolved += 1,
            Ok(Outcome::StillOverloaded) | Ok(Outcome::Normal) => {}
            Err(err) => summary.record_failure(&user.email, &err),
        }
    }

    Ok(summary)
}

async fn check_user<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
    user: &User,
) -> StoreResult<Outcome> {
    let tasks = store.tasks_assigned_to(&user.email).await?;
    let workload = window::planned_workload(&tasks, now.date_naive());
    let overloaded = workload.hours > thresholds.overwork_hours;
    tracing::debug!(
        user = %user.email,
        hours = workload.hours,
        tasks = workload.task_count,
        overloaded,
        "planned workload"
    );

    if !overloaded {
        if user.is_overloaded && store.set_overloaded(user.id, false).await? {
            tracing::info!(user = %user.email, hours = workload.hours, "workload back to normal");
            return Ok(Outcome::Cleared);
        }
        return Ok(Outcome::Normal);
    }

    if user.is_overloaded || !store.set_overloaded(user.id, true).await? {
        return Ok(Outcome::StillOverloaded);
    }

    tracing::info!(user = %user.email, hours = workload.hours, "flagged as overloaded");
    match notify_managers(store, thresholds, user, workload.hours).await {
        Ok(notified) => Ok(Outcome::Flagged { notified }),
        Err(err) => {
            // The flag only sticks once every manager has been told.
            if let Err(reset) = store.set_overloaded(user.id, false).await {
                tracing::error!(
                    user = %user.email,
                    error = %reset,
                    "failed to reset overload flag"
                );
            }
            Err(err)
        }
    }
}

async fn notify_managers<S: Store>(
    store: &S,
    thresholds: &Thresholds,
    member: &User,
    hours: f64,
) -> StoreResult<usize> {
    let mut notified = 0;
    for manager in store.project_managers(&member.tenant_id).await? {
        let alarm = alarm_for(manager, member, hours, &thresholds.sender_name);
        if notify::open_once(store, alarm, &[]).await? {
            notified += 1;
        }
    }
    Ok(notified)
}

fn alarm_for(manager: User, member: &User, hours: f64, sender_name: &str) -> NewNotification {
    NewNotification {
        tenant_id: manager.tenant_id,
        recipient_email: manager.email,
        subject_email: member.email.clone(),
        rule_id: Some(RULE_ID.to_string()),
        kind: KIND,
        title: "Overwork Plan Alert".to_string(),
        message: format!(
            "User {} is planned for {:.1}h this week (over the limit). \
             Overtime disabled to prevent burnout.",
            member.full_name, hours
        ),
        sender_name: Some(sender_name.to_string()),
    }
}
