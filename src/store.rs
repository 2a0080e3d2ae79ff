use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    ActivityLog, NewNotification, Notification, NotificationType, ReworkCheck, Task, Timesheet,
    User, UserScope,
};

/// Data access used by the evaluators. Writes that guard the
/// one-active-notification invariant are single conditional statements.
pub trait Store: Send + Sync {
    fn users_in_scope(&self, scope: UserScope)
        -> impl Future<Output = StoreResult<Vec<User>>> + Send;

    fn find_user(&self, email: &str) -> impl Future<Output = StoreResult<Option<User>>> + Send;

    fn project_managers(&self, tenant_id: &str)
        -> impl Future<Output = StoreResult<Vec<User>>> + Send;

    /// The `daily_activity` log recorded for `user_id` on `day`, if any.
    fn daily_log(
        &self,
        user_id: Uuid,
        day: NaiveDate,
    ) -> impl Future<Output = StoreResult<Option<ActivityLog>>> + Send;

    /// Adds one to the log's ignored alert counter and returns the new value.
    fn increment_ignored_alerts(&self, log_id: Uuid)
        -> impl Future<Output = StoreResult<i32>> + Send;

    /// Sets `is_overloaded`; returns false when the flag already had that value.
    fn set_overloaded(
        &self,
        user_id: Uuid,
        overloaded: bool,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn tasks_assigned_to(&self, email: &str)
        -> impl Future<Output = StoreResult<Vec<Task>>> + Send;

    fn timesheets_since(
        &self,
        email: &str,
        since: NaiveDate,
    ) -> impl Future<Output = StoreResult<Vec<Timesheet>>> + Send;

    fn record_rework_check(
        &self,
        user: &User,
        percentage: f64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn recent_rework_checks(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<ReworkCheck>>> + Send;

    /// Inserts `notification` unless an OPEN or APPEALED notification of the
    /// same type, or of any type in `also_blocked_by`, already exists for the
    /// same recipient and subject. Returns `None` when suppressed.
    fn open_notification(
        &self,
        notification: NewNotification,
        also_blocked_by: &[NotificationType],
    ) -> impl Future<Output = StoreResult<Option<Notification>>> + Send;

    /// Whether an OPEN (not APPEALED) notification of `kind` exists for the pair.
    fn has_open(
        &self,
        recipient_email: &str,
        subject_email: &str,
        kind: NotificationType,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Moves OPEN notifications of `kind` for the pair to RESOLVED.
    fn resolve_open(
        &self,
        recipient_email: &str,
        subject_email: &str,
        kind: NotificationType,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    fn resolve_notification(&self, id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;

    fn open_notifications(
        &self,
        kind: NotificationType,
    ) -> impl Future<Output = StoreResult<Vec<Notification>>> + Send;

    /// OPEN and APPEALED notifications, optionally restricted to one tenant.
    fn active_notifications(
        &self,
        tenant_id: Option<&str>,
    ) -> impl Future<Output = StoreResult<Vec<Notification>>> + Send;
}
