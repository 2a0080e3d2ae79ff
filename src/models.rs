use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::StoreError;

pub const DAILY_ACTIVITY_EVENT: &str = "daily_activity";
pub const REWORK_CHECK_EVENT: &str = "rework_check";

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub tenant_id: String,
    pub role: String,
    pub custom_role: Option<String>,
    pub status: String,
    pub is_overloaded: bool,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status != "inactive"
    }

    pub fn is_member(&self) -> bool {
        self.role == "member"
    }

    pub fn has_custom_role(&self, role: &str) -> bool {
        self.custom_role.as_deref() == Some(role)
    }

    pub fn is_viewer(&self) -> bool {
        self.has_custom_role("viewer")
    }
}

/// Which users an evaluator sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserScope {
    /// Active members whose custom role is `viewer`.
    ActiveViewers,
    /// Members whose status is exactly `active`.
    ActiveMembers,
}

impl UserScope {
    pub fn contains(&self, user: &User) -> bool {
        match self {
            UserScope::ActiveViewers => user.is_active() && user.is_member() && user.is_viewer(),
            UserScope::ActiveMembers => user.status == "active" && user.is_member(),
        }
    }
}

/// A `daily_activity` row; rework audit rows are read as [`ReworkCheck`].
#[derive(Debug, Clone)]
pub struct ActivityLog {
    pub id: Uuid,
    pub scheduled_working_start: Option<String>,
    pub total_assigned_tasks: i32,
    pub submitted_timesheets_count: i32,
    pub ignored_alert_count: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub story_points: Option<f64>,
}

impl Task {
    pub fn normalized_status(&self) -> String {
        self.status.to_lowercase()
    }

    pub fn is_active_work(&self) -> bool {
        matches!(self.normalized_status().as_str(), "in_progress" | "review")
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.normalized_status().as_str(),
            "completed" | "done" | "closed" | "resolved"
        )
    }

    /// Estimated effort, falling back to two hours per story point.
    pub fn planned_hours(&self) -> f64 {
        let hours = self.estimated_hours.unwrap_or(0.0);
        match self.story_points {
            Some(points) if hours == 0.0 && points > 0.0 => points * 2.0,
            _ => hours,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Timesheet {
    pub date: NaiveDate,
    pub hours: i32,
    pub minutes: i32,
    pub work_type: String,
}

impl Timesheet {
    pub fn total_minutes(&self) -> i64 {
        i64::from(self.hours) * 60 + i64::from(self.minutes)
    }

    pub fn is_rework(&self) -> bool {
        self.work_type == "rework"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    TimesheetMissingAlert,
    TimesheetLockoutAlarm,
    OverworkAlarm,
    ReworkAlarm,
    HighReworkAlarm,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::TimesheetMissingAlert => "timesheet_missing_alert",
            NotificationType::TimesheetLockoutAlarm => "timesheet_lockout_alarm",
            NotificationType::OverworkAlarm => "overwork_alarm",
            NotificationType::ReworkAlarm => "rework_alarm",
            NotificationType::HighReworkAlarm => "high_rework_alarm",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            NotificationType::TimesheetMissingAlert => Category::Alert,
            _ => Category::Alarm,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "timesheet_missing_alert" => Ok(NotificationType::TimesheetMissingAlert),
            "timesheet_lockout_alarm" => Ok(NotificationType::TimesheetLockoutAlarm),
            "overwork_alarm" => Ok(NotificationType::OverworkAlarm),
            "rework_alarm" => Ok(NotificationType::ReworkAlarm),
            "high_rework_alarm" => Ok(NotificationType::HighReworkAlarm),
            other => Err(StoreError::invalid("notification type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Alert,
    Alarm,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Alert => "alert",
            Category::Alarm => "alarm",
        }
    }
}

impl FromStr for Category {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "alert" => Ok(Category::Alert),
            "alarm" => Ok(Category::Alarm),
            other => Err(StoreError::invalid("notification category", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Open,
    Resolved,
    Appealed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Open => "OPEN",
            NotificationStatus::Resolved => "RESOLVED",
            NotificationStatus::Appealed => "APPEALED",
        }
    }

    /// OPEN and APPEALED both suppress a new notification of the same type.
    pub fn is_active(&self) -> bool {
        matches!(self, NotificationStatus::Open | NotificationStatus::Appealed)
    }
}

impl FromStr for NotificationStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OPEN" => Ok(NotificationStatus::Open),
            "RESOLVED" => Ok(NotificationStatus::Resolved),
            "APPEALED" => Ok(NotificationStatus::Appealed),
            other => Err(StoreError::invalid("notification status", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: String,
    pub recipient_email: String,
    pub subject_email: String,
    pub rule_id: Option<String>,
    pub kind: NotificationType,
    pub category: Category,
    pub status: NotificationStatus,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_date: DateTime<Utc>,
}

/// Everything needed to open a notification; id, status and timestamps are
/// assigned on insert.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub tenant_id: String,
    pub recipient_email: String,
    pub subject_email: String,
    pub rule_id: Option<String>,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReworkCheck {
    pub email: String,
    pub tenant_id: String,
    pub rework_percentage: f64,
    pub timestamp: DateTime<Utc>,
}
