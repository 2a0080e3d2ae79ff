use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Category, Notification, NotificationStatus, NotificationType, ReworkCheck};

#[derive(Debug, Clone)]
pub struct TypeSummary {
    pub kind: NotificationType,
    pub open: usize,
    pub appealed: usize,
}

pub fn summarize_by_type(notifications: &[Notification]) -> Vec<TypeSummary> {
    let mut map: HashMap<NotificationType, (usize, usize)> = HashMap::new();

    for notification in notifications.iter().filter(|n| n.status.is_active()) {
        let entry = map.entry(notification.kind).or_insert((0, 0));
        if notification.status == NotificationStatus::Appealed {
            entry.1 += 1;
        } else {
            entry.0 += 1;
        }
    }

    let mut summaries: Vec<TypeSummary> = map
        .into_iter()
        .map(|(kind, (open, appealed))| TypeSummary {
            kind,
            open,
            appealed,
        })
        .collect();

    summaries.sort_by(|a, b| {
        (b.open + b.appealed)
            .cmp(&(a.open + a.appealed))
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
    });
    summaries
}

/// Latest check per user, highest percentage first.
pub fn latest_rework_by_user(checks: &[ReworkCheck]) -> Vec<ReworkCheck> {
    let mut latest: HashMap<&str, &ReworkCheck> = HashMap::new();
    for check in checks {
        latest
            .entry(check.email.as_str())
            .and_modify(|current| {
                if check.timestamp > current.timestamp {
                    *current = check;
                }
            })
            .or_insert(check);
    }

    let mut values: Vec<ReworkCheck> = latest.into_values().cloned().collect();
    values.sort_by(|a, b| {
        b.rework_percentage
            .partial_cmp(&a.rework_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    values
}

pub fn build_report(
    tenant: Option<&str>,
    generated_at: DateTime<Utc>,
    notifications: &[Notification],
    rework_checks: &[ReworkCheck],
) -> String {
    let summaries = summarize_by_type(notifications);

    let mut output = String::new();
    let tenant_label = tenant.unwrap_or("all tenants");

    let _ = writeln!(output, "# Timesheet Alarm Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        tenant_label,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Active Notifications");

    if summaries.is_empty() {
        let _ = writeln!(output, "No active alerts or alarms.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): {} open, {} appealed",
                summary.kind,
                summary.kind.category().as_str(),
                summary.open,
                summary.appealed
            );
        }
    }

    let mut alarms: Vec<&Notification> = notifications
        .iter()
        .filter(|n| n.category == Category::Alarm)
        .collect();
    alarms.sort_by(|a, b| b.created_date.cmp(&a.created_date));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Alarms");

    if alarms.is_empty() {
        let _ = writeln!(output, "No open alarms.");
    } else {
        for alarm in alarms.iter().take(20) {
            let unread = if alarm.read { "" } else { ", unread" };
            let _ = writeln!(
                output,
                "- {} for {} about {} in {} on {}: {} ({}{})",
                alarm.kind,
                alarm.recipient_email,
                alarm.subject_email,
                alarm.tenant_id,
                alarm.created_date.format("%Y-%m-%d"),
                alarm.title,
                alarm.status.as_str(),
                unread
            );
            let rule = alarm.rule_id.as_deref().unwrap_or("manual");
            let _ = writeln!(output, "  {} [{}]", alarm.message, rule);
        }
    }

    let latest = latest_rework_by_user(rework_checks);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Rework Checks");

    if latest.is_empty() {
        let _ = writeln!(output, "No rework checks recorded for this window.");
    } else {
        for check in latest.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}): {:.1}% on {}",
                check.email,
                check.tenant_id,
                check.rework_percentage,
                check.timestamp.format("%Y-%m-%d")
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fixtures;
    use chrono::{Duration, TimeZone};

    fn check(email: &str, percent: f64, hours_ago: i64) -> ReworkCheck {
        ReworkCheck {
            email: email.to_string(),
            tenant_id: "acme".to_string(),
            rework_percentage: percent,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
                - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn summaries_split_open_and_appealed_and_skip_resolved() {
        let viewer = fixtures::viewer("vera@acme.io", "acme");
        let member = fixtures::member("rae@acme.io", "acme");
        let mut appealed = fixtures::open_notification(&member, NotificationType::HighReworkAlarm);
        appealed.status = NotificationStatus::Appealed;
        let mut notifications = vec![
            fixtures::open_notification(&viewer, NotificationType::TimesheetMissingAlert),
            fixtures::open_notification(&member, NotificationType::TimesheetMissingAlert),
            appealed,
        ];

        let mut resolved = fixtures::open_notification(&viewer, NotificationType::OverworkAlarm);
        resolved.status = NotificationStatus::Resolved;
        notifications.push(resolved);

        let summaries = summarize_by_type(&notifications);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].kind, NotificationType::TimesheetMissingAlert);
        assert_eq!(summaries[0].open, 2);
        assert_eq!(summaries[1].appealed, 1);
    }

    #[test]
    fn keeps_latest_check_per_user() {
        let checks = vec![
            check("rae@acme.io", 31.0, 48),
            check("rae@acme.io", 12.5, 1),
            check("sam@acme.io", 18.0, 3),
        ];

        let latest = latest_rework_by_user(&checks);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].email, "sam@acme.io");
        assert_eq!(latest[1].rework_percentage, 12.5);
    }

    #[test]
    fn report_lists_alarms_but_not_alerts() {
        let viewer = fixtures::viewer("vera@acme.io", "acme");
        let mut lockout =
            fixtures::open_notification(&viewer, NotificationType::TimesheetLockoutAlarm);
        lockout.rule_id = Some("TIMESHEET_LOCKOUT_MAX_IGNORES".to_string());
        let notifications = vec![
            fixtures::open_notification(&viewer, NotificationType::TimesheetMissingAlert),
            lockout,
        ];
        let generated_at = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();

        let report = build_report(Some("acme"), generated_at, &notifications, &[]);

        assert!(report.contains("Generated for acme at 2026-03-04 12:00 UTC"));
        assert!(report.contains(
            "- timesheet_lockout_alarm for vera@acme.io about vera@acme.io in acme on"
        ));
        assert!(report.contains("  Raised by an earlier sweep [TIMESHEET_LOCKOUT_MAX_IGNORES]"));
        assert!(!report.contains("- timesheet_missing_alert for"));
        assert!(report.contains("No rework checks recorded"));
    }

    #[test]
    fn empty_report_says_so() {
        let generated_at = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let report = build_report(None, generated_at, &[], &[]);
        assert!(report.contains("all tenants"));
        assert!(report.contains("No active alerts or alarms."));
        assert!(report.contains("No open alarms."));
    }
}
