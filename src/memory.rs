use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    ActivityLog, NewNotification, Notification, NotificationStatus, NotificationType, ReworkCheck,
    Task, Timesheet, User, UserScope, DAILY_ACTIVITY_EVENT, REWORK_CHECK_EVENT,
};
use crate::store::Store;
use crate::window;

/// An `activity_logs` row with the columns the evaluators never read back.
struct LogRow {
    user_id: Uuid,
    email: String,
    tenant_id: String,
    event_type: &'static str,
    rework_percentage: Option<f64>,
    log: ActivityLog,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    logs: Vec<LogRow>,
    tasks: Vec<(String, Task)>,
    timesheets: Vec<(String, Timesheet)>,
    notifications: Vec<Notification>,
    failing: HashSet<String>,
    failing_manager_lookups: HashSet<String>,
    fail_rework_checks: bool,
}

/// In-memory store backing the rule tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.lock().expect("memory store poisoned");
        f(&mut tables)
    }

    /// Inserts or replaces by email.
    pub fn add_user(&self, user: User) {
        self.with(|t| {
            t.users.retain(|u| u.email != user.email);
            t.users.push(user);
        })
    }

    pub fn add_daily_log(&self, user: &User, log: ActivityLog) {
        self.with(|t| {
            t.logs.push(LogRow {
                user_id: user.id,
                email: user.email.clone(),
                tenant_id: user.tenant_id.clone(),
                event_type: DAILY_ACTIVITY_EVENT,
                rework_percentage: None,
                log,
            })
        })
    }

    pub fn add_task(&self, assignee: &User, task: Task) {
        self.with(|t| t.tasks.push((assignee.email.clone(), task)))
    }

    /// Replaces every task assigned to `assignee`.
    pub fn replace_tasks(&self, assignee: &User, tasks: Vec<Task>) {
        self.with(|t| {
            t.tasks.retain(|(email, _)| *email != assignee.email);
            t.tasks
                .extend(tasks.into_iter().map(|task| (assignee.email.clone(), task)));
        })
    }

    pub fn add_timesheet(&self, user: &User, timesheet: Timesheet) {
        self.with(|t| t.timesheets.push((user.email.clone(), timesheet)))
    }

    pub fn add_notification(&self, notification: Notification) {
        self.with(|t| t.notifications.push(notification))
    }

    /// Makes per-user reads for `email` fail.
    pub fn fail_for(&self, email: &str) {
        self.with(|t| t.failing.insert(email.to_string()));
    }

    /// Makes the next project manager lookup for `tenant_id` fail.
    pub fn fail_managers_once(&self, tenant_id: &str) {
        self.with(|t| t.failing_manager_lookups.insert(tenant_id.to_string()));
    }

    pub fn fail_rework_checks(&self) {
        self.with(|t| t.fail_rework_checks = true)
    }

    pub fn user(&self, email: &str) -> Option<User> {
        self.with(|t| t.users.iter().find(|u| u.email == email).cloned())
    }

    pub fn notifications_for(&self, recipient: &str, kind: NotificationType) -> Vec<Notification> {
        self.with(|t| {
            t.notifications
                .iter()
                .filter(|n| n.recipient_email == recipient && n.kind == kind)
                .cloned()
                .collect()
        })
    }

    pub fn ignored_alerts(&self, user_id: Uuid, day: NaiveDate) -> i32 {
        self.with(|t| {
            t.logs
                .iter()
                .find(|row| {
                    row.user_id == user_id
                        && row.event_type == DAILY_ACTIVITY_EVENT
                        && row.log.timestamp.date_naive() == day
                })
                .map(|row| row.log.ignored_alert_count)
                .unwrap_or(0)
        })
    }

    pub fn rework_checks(&self, email: &str) -> Vec<f64> {
        self.with(|t| {
            t.logs
                .iter()
                .filter(|row| row.email == email && row.event_type == REWORK_CHECK_EVENT)
                .filter_map(|row| row.rework_percentage)
                .collect()
        })
    }

    fn check_failing(&self, email: &str) -> StoreResult<()> {
        if self.with(|t| t.failing.contains(email)) {
            return Err(StoreError::invalid("fixture", email));
        }
        Ok(())
    }

    fn email_for(&self, user_id: Uuid) -> Option<String> {
        self.with(|t| {
            t.users
                .iter()
                .find(|u| u.id == user_id)
                .map(|u| u.email.clone())
        })
    }
}

impl Store for MemoryStore {
    async fn users_in_scope(&self, scope: UserScope) -> StoreResult<Vec<User>> {
        Ok(self.with(|t| {
            t.users
                .iter()
                .filter(|u| scope.contains(u))
                .cloned()
                .collect()
        }))
    }

    async fn find_user(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.user(email))
    }

    async fn project_managers(&self, tenant_id: &str) -> StoreResult<Vec<User>> {
        if self.with(|t| t.failing_manager_lookups.remove(tenant_id)) {
            return Err(StoreError::invalid("fixture", tenant_id));
        }
        Ok(self.with(|t| {
            t.users
                .iter()
                .filter(|u| u.tenant_id == tenant_id && u.has_custom_role("project_manager"))
                .cloned()
                .collect()
        }))
    }

    async fn daily_log(&self, user_id: Uuid, day: NaiveDate) -> StoreResult<Option<ActivityLog>> {
        if let Some(email) = self.email_for(user_id) {
            self.check_failing(&email)?;
        }
        let (start, end) = window::day_bounds(day);
        Ok(self.with(|t| {
            t.logs
                .iter()
                .filter(|row| {
                    row.user_id == user_id
                        && row.event_type == DAILY_ACTIVITY_EVENT
                        && row.log.timestamp >= start
                        && row.log.timestamp < end
                })
                .min_by_key(|row| row.log.timestamp)
                .map(|row| row.log.clone())
        }))
    }

    async fn increment_ignored_alerts(&self, log_id: Uuid) -> StoreResult<i32> {
        self.with(|t| {
            let row = t
                .logs
                .iter_mut()
                .find(|row| row.log.id == log_id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "activity log",
                    id: log_id.to_string(),
                })?;
            row.log.ignored_alert_count += 1;
            Ok(row.log.ignored_alert_count)
        })
    }

    async fn set_overloaded(&self, user_id: Uuid, overloaded: bool) -> StoreResult<bool> {
        Ok(self.with(|t| {
            match t
                .users
                .iter_mut()
                .find(|u| u.id == user_id && u.is_overloaded != overloaded)
            {
                Some(user) => {
                    user.is_overloaded = overloaded;
                    true
                }
                None => false,
            }
        }))
    }

    async fn tasks_assigned_to(&self, email: &str) -> StoreResult<Vec<Task>> {
        self.check_failing(email)?;
        Ok(self.with(|t| {
            t.tasks
                .iter()
                .filter(|(assignee, _)| assignee == email)
                .map(|(_, task)| task.clone())
                .collect()
        }))
    }

    async fn timesheets_since(&self, email: &str, since: NaiveDate) -> StoreResult<Vec<Timesheet>> {
        self.check_failing(email)?;
        Ok(self.with(|t| {
            t.timesheets
                .iter()
                .filter(|(owner, ts)| owner == email && ts.date >= since)
                .map(|(_, ts)| ts.clone())
                .collect()
        }))
    }

    async fn record_rework_check(
        &self,
        user: &User,
        percentage: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.with(|t| t.fail_rework_checks) {
            return Err(StoreError::invalid("fixture", "rework check"));
        }
        self.with(|t| {
            t.logs.push(LogRow {
                user_id: user.id,
                email: user.email.clone(),
                tenant_id: user.tenant_id.clone(),
                event_type: REWORK_CHECK_EVENT,
                rework_percentage: Some(percentage),
                log: ActivityLog {
                    id: Uuid::new_v4(),
                    scheduled_working_start: None,
                    total_assigned_tasks: 0,
                    submitted_timesheets_count: 0,
                    ignored_alert_count: 0,
                    timestamp: at,
                },
            })
        });
        Ok(())
    }

    async fn recent_rework_checks(&self, since: DateTime<Utc>) -> StoreResult<Vec<ReworkCheck>> {
        Ok(self.with(|t| {
            t.logs
                .iter()
                .filter(|row| row.event_type == REWORK_CHECK_EVENT && row.log.timestamp >= since)
                .filter_map(|row| {
                    row.rework_percentage.map(|rework_percentage| ReworkCheck {
                        email: row.email.clone(),
                        tenant_id: row.tenant_id.clone(),
                        rework_percentage,
                        timestamp: row.log.timestamp,
                    })
                })
                .collect()
        }))
    }

    async fn open_notification(
        &self,
        notification: NewNotification,
        also_blocked_by: &[NotificationType],
    ) -> StoreResult<Option<Notification>> {
        Ok(self.with(|t| {
            let blocked = t.notifications.iter().any(|n| {
                n.status.is_active()
                    && n.recipient_email == notification.recipient_email
                    && n.subject_email == notification.subject_email
                    && (n.kind == notification.kind || also_blocked_by.contains(&n.kind))
            });
            if blocked {
                return None;
            }
            let created = Notification {
                id: Uuid::new_v4(),
                tenant_id: notification.tenant_id,
                recipient_email: notification.recipient_email,
                subject_email: notification.subject_email,
                rule_id: notification.rule_id,
                kind: notification.kind,
                category: notification.kind.category(),
                status: NotificationStatus::Open,
                title: notification.title,
                message: notification.message,
                read: false,
                created_date: Utc::now(),
            };
            t.notifications.push(created.clone());
            Some(created)
        }))
    }

    async fn has_open(
        &self,
        recipient_email: &str,
        subject_email: &str,
        kind: NotificationType,
    ) -> StoreResult<bool> {
        Ok(self.with(|t| {
            t.notifications.iter().any(|n| {
                n.recipient_email == recipient_email
                    && n.subject_email == subject_email
                    && n.kind == kind
                    && n.status == NotificationStatus::Open
            })
        }))
    }

    async fn resolve_open(
        &self,
        recipient_email: &str,
        subject_email: &str,
        kind: NotificationType,
    ) -> StoreResult<u64> {
        Ok(self.with(|t| {
            let mut resolved = 0;
            for n in t.notifications.iter_mut().filter(|n| {
                n.recipient_email == recipient_email
                    && n.subject_email == subject_email
                    && n.kind == kind
                    && n.status == NotificationStatus::Open
            }) {
                n.status = NotificationStatus::Resolved;
                resolved += 1;
            }
            resolved
        }))
    }

    async fn resolve_notification(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.with(|t| {
            match t
                .notifications
                .iter_mut()
                .find(|n| n.id == id && n.status == NotificationStatus::Open)
            {
                Some(n) => {
                    n.status = NotificationStatus::Resolved;
                    true
                }
                None => false,
            }
        }))
    }

    async fn open_notifications(&self, kind: NotificationType) -> StoreResult<Vec<Notification>> {
        Ok(self.with(|t| {
            t.notifications
                .iter()
                .filter(|n| n.kind == kind && n.status == NotificationStatus::Open)
                .cloned()
                .collect()
        }))
    }

    async fn active_notifications(
        &self,
        tenant_id: Option<&str>,
    ) -> StoreResult<Vec<Notification>> {
        Ok(self.with(|t| {
            t.notifications
                .iter()
                .filter(|n| n.status.is_active())
                .filter(|n| tenant_id.map_or(true, |tenant| n.tenant_id == tenant))
                .cloned()
                .collect()
        }))
    }
}

pub mod fixtures {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    use crate::models::{
        ActivityLog, Notification, NotificationStatus, NotificationType, Task, Timesheet, User,
    };

    fn user(email: &str, tenant: &str, custom_role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: email
                .split('@')
                .next()
                .unwrap_or(email)
                .to_uppercase(),
            tenant_id: tenant.to_string(),
            role: "member".to_string(),
            custom_role: Some(custom_role.to_string()),
            status: "active".to_string(),
            is_overloaded: false,
        }
    }

    pub fn viewer(email: &str, tenant: &str) -> User {
        user(email, tenant, "viewer")
    }

    pub fn member(email: &str, tenant: &str) -> User {
        user(email, tenant, "contributor")
    }

    pub fn project_manager(email: &str, tenant: &str) -> User {
        let mut manager = user(email, tenant, "project_manager");
        manager.role = "admin".to_string();
        manager
    }

    /// Logged at 08:00 UTC on `day`.
    pub fn daily_log(day: NaiveDate, assigned: i32, submitted: i32) -> ActivityLog {
        ActivityLog {
            id: Uuid::new_v4(),
            scheduled_working_start: None,
            total_assigned_tasks: assigned,
            submitted_timesheets_count: submitted,
            ignored_alert_count: 0,
            timestamp: day
                .and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap())
                .and_utc(),
        }
    }

    pub fn open_notification(user: &User, kind: NotificationType) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            tenant_id: user.tenant_id.clone(),
            recipient_email: user.email.clone(),
            subject_email: user.email.clone(),
            rule_id: None,
            kind,
            category: kind.category(),
            status: NotificationStatus::Open,
            title: "Existing".to_string(),
            message: "Raised by an earlier sweep".to_string(),
            read: false,
            created_date: Utc::now(),
        }
    }

    pub fn task(
        status: &str,
        due_date: Option<NaiveDate>,
        estimated_hours: Option<f64>,
        story_points: Option<f64>,
    ) -> Task {
        Task {
            status: status.to_string(),
            due_date,
            estimated_hours,
            story_points,
        }
    }

    pub fn timesheet(date: NaiveDate, hours: i32, minutes: i32, work_type: &str) -> Timesheet {
        Timesheet {
            date,
            hours,
            minutes,
            work_type: work_type.to_string(),
        }
    }
}
