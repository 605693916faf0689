use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Command recorded when a user starts a new patent investigation.
pub const NEW_PROJECT_COMMAND: &str = "startInvestigation";

/// One roster entry, as exported by the application database.
/// Missing optional fields fall back to empty or zero so one malformed
/// record degrades to placeholder cells instead of failing the run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub promo: String,
    /// Signup instant, epoch milliseconds.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub days_since_sign_up: i64,
    #[serde(default)]
    pub days_since_last_login: Option<i64>,
    /// Login instants, epoch milliseconds. May be empty.
    #[serde(default)]
    pub logins: Vec<i64>,
    #[serde(default)]
    pub total_logins: i64,
}

/// Point-in-time snapshot of one project document. The owner is not
/// required to exist in the roster.
#[derive(Debug, Clone)]
pub struct ProjectDocument {
    pub user_hash: String,
    /// Action key -> action. Unordered; no chronological guarantee.
    pub history: HashMap<String, Action>,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub command: String,
    /// Epoch milliseconds.
    pub occurred_at_ms: i64,
}

/// One table cell. Column position carries the meaning; blanks render as
/// empty strings and are distinct from numeric zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Blank,
    Text(String),
    Int(i64),
    Num(f64),
}

pub type Row = Vec<Cell>;

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Blank => Ok(()),
            Cell::Text(value) => write!(f, "{value}"),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Num(value) => write!(f, "{value:.2}"),
        }
    }
}

/// Totals summed across roster users only. Documents owned by identifiers
/// outside the roster never contribute here.
#[derive(Debug, Clone, Default)]
pub struct RollupTotals {
    pub logins: i64,
    pub weekly_logins: i64,
    pub daily_logins: i64,
    pub projects: i64,
    pub weekly_projects: i64,
    pub daily_projects: i64,
    pub actions: i64,
    pub weekly_actions: i64,
    pub daily_actions: i64,
    pub days_since_sign_up: i64,
    pub days_since_last_login: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SignupSummary {
    pub total_users: i64,
    pub new_last_week: i64,
    pub new_today: i64,
}
