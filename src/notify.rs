use std::fmt;

use serde::Serialize;

use crate::error::StoreResult;
use crate::models::{NewNotification, NotificationType, User};
use crate::rules::Rule;
use crate::store::Store;

/// How an open notification leaves the OPEN state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePolicy {
    /// The rule resolves it as soon as the condition clears.
    AutoResolve,
    /// Only a person (manager approval, appeal review) clears it.
    ManualClearance,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rule: Rule,
    pub policy: ResolvePolicy,
    pub evaluated: usize,
    pub skipped: usize,
    pub created: usize,
    pub resolved: usize,
    pub escalated: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn new(rule: Rule, policy: ResolvePolicy) -> Self {
        Self {
            rule,
            policy,
            evaluated: 0,
            skipped: 0,
            created: 0,
            resolved: 0,
            escalated: 0,
            failed: 0,
        }
    }

    pub fn record_failure(&mut self, email: &str, err: &dyn fmt::Display) {
        tracing::warn!(
            rule = %self.rule,
            user = %email,
            error = %err,
            "evaluation failed, continuing"
        );
        self.failed += 1;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: evaluated {}, skipped {}, created {}, resolved {}, escalated {}, failed {}",
            self.rule,
            self.evaluated,
            self.skipped,
            self.created,
            self.resolved,
            self.escalated,
            self.failed
        )
    }
}

/// A notification about `user` addressed to `user`.
pub fn self_addressed(
    user: &User,
    kind: NotificationType,
    rule_id: Option<&str>,
    title: impl Into<String>,
    message: impl Into<String>,
    sender_name: &str,
) -> NewNotification {
    NewNotification {
        tenant_id: user.tenant_id.clone(),
        recipient_email: user.email.clone(),
        subject_email: user.email.clone(),
        rule_id: rule_id.map(str::to_string),
        kind,
        title: title.into(),
        message: message.into(),
        sender_name: Some(sender_name.to_string()),
    }
}

/// Opens `notification` unless one is already OPEN or APPEALED for the same
/// (recipient, subject, type); returns whether a new row was written.
pub async fn open_once<S: Store>(
    store: &S,
    notification: NewNotification,
    also_blocked_by: &[NotificationType],
) -> StoreResult<bool> {
    let kind = notification.kind;
    let recipient = notification.recipient_email.clone();
    match store.open_notification(notification, also_blocked_by).await? {
        Some(created) => {
            tracing::info!(%kind, recipient = %recipient, id = %created.id, "opened notification");
            Ok(true)
        }
        None => {
            tracing::debug!(%kind, recipient = %recipient, "notification already active");
            Ok(false)
        }
    }
}

/// Resolves the OPEN notification of `kind` that `user` holds about themself.
pub async fn resolve_own<S: Store>(
    store: &S,
    user: &User,
    kind: NotificationType,
) -> StoreResult<bool> {
    let resolved = store.resolve_open(&user.email, &user.email, kind).await?;
    if resolved > 0 {
        tracing::info!(%kind, user = %user.email, "resolved notification");
    }
    Ok(resolved > 0)
}
