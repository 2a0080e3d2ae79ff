use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

use crate::config::Thresholds;
use crate::error::StoreResult;
use crate::notify::RunSummary;
use crate::store::Store;

pub mod lockout;
pub mod missing_timesheet;
pub mod overwork;
pub mod rework;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    MissingTimesheet,
    Lockout,
    Overwork,
    Rework,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::MissingTimesheet => "missing-timesheet",
            Rule::Lockout => "lockout",
            Rule::Overwork => "overwork",
            Rule::Rework => "rework",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuleSelection {
    All,
    MissingTimesheet,
    Lockout,
    Overwork,
    Rework,
}

impl RuleSelection {
    /// Missing-timesheet runs ahead of lockout so lockout sees this sweep's
    /// ignore counts.
    pub fn rules(&self) -> Vec<Rule> {
        match self {
            RuleSelection::All => vec![
                Rule::MissingTimesheet,
                Rule::Lockout,
                Rule::Overwork,
                Rule::Rework,
            ],
            RuleSelection::MissingTimesheet => vec![Rule::MissingTimesheet],
            RuleSelection::Lockout => vec![Rule::Lockout],
            RuleSelection::Overwork => vec![Rule::Overwork],
            RuleSelection::Rework => vec![Rule::Rework],
        }
    }
}

#[tracing::instrument(skip_all, fields(rule = %rule))]
pub async fn run<S: Store>(
    store: &S,
    rule: Rule,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> StoreResult<RunSummary> {
    tracing::info!("starting sweep");

    let summary = match rule {
        Rule::MissingTimesheet => missing_timesheet::evaluate(store, thresholds, now).await?,
        Rule::Lockout => lockout::evaluate(store, thresholds, now).await?,
        Rule::Overwork => overwork::evaluate(store, thresholds, now).await?,
        Rule::Rework => rework::evaluate(store, thresholds, now).await?,
    };

    tracing::info!(%summary, "sweep complete");
    Ok(summary)
}
