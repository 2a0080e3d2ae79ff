use std::ops::RangeInclusive;

use anyhow::Context;
use chrono::{Duration, NaiveTime};
use clap::{Args, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Development,
    Production,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Selects the default grace period, target day and overwork window.
    #[arg(long, env = "APP_MODE", value_enum, default_value_t = Mode::Production, global = true)]
    pub mode: Mode,

    /// Minutes after the scheduled work start before a missing timesheet counts.
    #[arg(long, env = "GRACE_PERIOD_MINUTES", global = true)]
    pub grace_period_minutes: Option<i64>,

    /// Days back from today whose activity log is checked.
    #[arg(long, env = "TARGET_DAY_OFFSET", global = true)]
    pub target_day_offset: Option<i64>,

    /// Work start used when a log carries no usable `HH:MM`.
    #[arg(long, env = "DEFAULT_WORK_START", default_value = "10:00", global = true)]
    pub default_work_start: String,

    #[arg(long, env = "OVERWORK_DAILY_HOURS", default_value_t = 11.0, global = true)]
    pub overwork_daily_hours: f64,

    #[arg(long, env = "OVERWORK_WORK_DAYS", default_value_t = 6, global = true)]
    pub overwork_work_days: u32,

    #[arg(long, env = "LOCKOUT_THRESHOLD", default_value_t = 3, global = true)]
    pub lockout_threshold: i32,

    #[arg(long, env = "REWORK_PERCENT", default_value_t = 15.0, global = true)]
    pub rework_percent: f64,

    #[arg(long, env = "HIGH_REWORK_PERCENT", default_value_t = 25.0, global = true)]
    pub high_rework_percent: f64,

    #[arg(long, env = "REWORK_LOOKBACK_DAYS", default_value_t = 7, global = true)]
    pub rework_lookback_days: i64,

    /// Display name stamped on created notifications.
    #[arg(long, env = "NOTIFY_SENDER_NAME", default_value = "Groona Bot", global = true)]
    pub sender_name: String,
}

const GRACE_MINUTES_RANGE: RangeInclusive<i64> = 0..=7 * 24 * 60;
const TARGET_DAY_OFFSET_RANGE: RangeInclusive<i64> = 0..=366;
const REWORK_LOOKBACK_RANGE: RangeInclusive<i64> = 1..=366;

/// Resolved, immutable values the evaluators read.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub mode: Mode,
    pub grace_period: Duration,
    pub target_day_offset: i64,
    pub default_work_start: NaiveTime,
    pub overwork_hours: f64,
    pub lockout_ignored_alerts: i32,
    pub rework_percent: f64,
    pub high_rework_percent: f64,
    pub rework_lookback_days: i64,
    pub sender_name: String,
}

impl Settings {
    pub fn resolve(&self) -> anyhow::Result<Thresholds> {
        let default_work_start = NaiveTime::parse_from_str(&self.default_work_start, "%H:%M")
            .with_context(|| {
                format!("DEFAULT_WORK_START must be HH:MM, got {}", self.default_work_start)
            })?;

        if self.high_rework_percent < self.rework_percent {
            anyhow::bail!(
                "HIGH_REWORK_PERCENT ({}) must not be below REWORK_PERCENT ({})",
                self.high_rework_percent,
                self.rework_percent
            );
        }

        let (grace_minutes, target_day_offset, overwork_hours) = match self.mode {
            Mode::Development => (
                self.grace_period_minutes.unwrap_or(2),
                self.target_day_offset.unwrap_or(0),
                self.overwork_daily_hours,
            ),
            Mode::Production => (
                self.grace_period_minutes.unwrap_or(24 * 60),
                self.target_day_offset.unwrap_or(1),
                self.overwork_daily_hours * f64::from(self.overwork_work_days),
            ),
        };

        let grace_minutes = bounded("GRACE_PERIOD_MINUTES", grace_minutes, GRACE_MINUTES_RANGE)?;
        let target_day_offset =
            bounded("TARGET_DAY_OFFSET", target_day_offset, TARGET_DAY_OFFSET_RANGE)?;
        let rework_lookback_days = bounded(
            "REWORK_LOOKBACK_DAYS",
            self.rework_lookback_days,
            REWORK_LOOKBACK_RANGE,
        )?;

        Ok(Thresholds {
            mode: self.mode,
            grace_period: Duration::minutes(grace_minutes),
            target_day_offset,
            default_work_start,
            overwork_hours,
            lockout_ignored_alerts: self.lockout_threshold,
            rework_percent: self.rework_percent,
            high_rework_percent: self.high_rework_percent,
            rework_lookback_days,
            sender_name: self.sender_name.clone(),
        })
    }
}

fn bounded(name: &str, value: i64, range: RangeInclusive<i64>) -> anyhow::Result<i64> {
    if !range.contains(&value) {
        anyhow::bail!(
            "{name} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        );
    }
    Ok(value)
}

#[cfg(test)]
impl Thresholds {
    pub fn for_tests(mode: Mode) -> Self {
        settings(mode).resolve().expect("default settings resolve")
    }
}

#[cfg(test)]
fn settings(mode: Mode) -> Settings {
    Settings {
        mode,
        grace_period_minutes: None,
        target_day_offset: None,
        default_work_start: "10:00".to_string(),
        overwork_daily_hours: 11.0,
        overwork_work_days: 6,
        lockout_threshold: 3,
        rework_percent: 15.0,
        high_rework_percent: 25.0,
        rework_lookback_days: 7,
        sender_name: "Groona Bot".to_string(),
    }
}
