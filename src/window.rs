use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::models::{Task, Timesheet};

/// The calendar day `offset_days` before `now`.
pub fn target_day(now: DateTime<Utc>, offset_days: i64) -> NaiveDate {
    now.date_naive() - Duration::days(offset_days)
}

/// Half-open `[start, end)` instants covering `day`.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Parses a scheduled `HH:MM` start, keeping `default` when the value is
/// missing or unusable.
pub fn parse_work_start(scheduled: Option<&str>, default: NaiveTime) -> NaiveTime {
    let Some(raw) = scheduled else {
        return default;
    };
    let mut parts = raw.trim().split(':');
    let (Some(hour), Some(minute)) = (parts.next(), parts.next()) else {
        return default;
    };
    match (hour.trim().parse::<u32>(), minute.trim().parse::<u32>()) {
        (Ok(hour), Ok(minute)) => NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(default),
        _ => default,
    }
}

pub fn work_start(day: NaiveDate, start: NaiveTime) -> DateTime<Utc> {
    day.and_time(start).and_utc()
}

/// Monday and Sunday of the week containing `today`.
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Workload {
    pub hours: f64,
    pub task_count: usize,
}

/// A task counts toward this week's load when it is being worked or
/// reviewed, falls due this week, or is overdue and still open.
pub fn counts_toward_week(task: &Task, week_start: NaiveDate, week_end: NaiveDate) -> bool {
    if task.is_active_work() {
        return true;
    }
    let Some(due) = task.due_date else {
        return false;
    };
    if due >= week_start && due <= week_end {
        return true;
    }
    due < week_start && !task.is_completed()
}

pub fn planned_workload(tasks: &[Task], today: NaiveDate) -> Workload {
    let (week_start, week_end) = week_bounds(today);
    tasks
        .iter()
        .filter(|task| counts_toward_week(task, week_start, week_end))
        .fold(
            Workload {
                hours: 0.0,
                task_count: 0,
            },
            |acc, task| Workload {
                hours: acc.hours + task.planned_hours(),
                task_count: acc.task_count + 1,
            },
        )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReworkRatio {
    pub total_minutes: i64,
    pub rework_minutes: i64,
    pub percent: f64,
}

/// Share of logged time spent on rework for entries dated on or after
/// `since`. `None` when nothing was logged.
pub fn rework_ratio(timesheets: &[Timesheet], since: NaiveDate) -> Option<ReworkRatio> {
    let (total_minutes, rework_minutes) = timesheets
        .iter()
        .filter(|entry| entry.date >= since)
        .fold((0i64, 0i64), |(total, rework), entry| {
            let minutes = entry.total_minutes();
            let rework = if entry.is_rework() {
                rework + minutes
            } else {
                rework
            };
            (total + minutes, rework)
        });

    if total_minutes <= 0 {
        return None;
    }

    Some(ReworkRatio {
        total_minutes,
        rework_minutes,
        percent: rework_minutes as f64 / total_minutes as f64 * 100.0,
    })
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
