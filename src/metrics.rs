use std::collections::HashMap;

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::models::{Cell, ProjectDocument, RollupTotals, Row, SignupSummary, User};
use crate::windows::{analysis_windows, AnalysisWindows};

// Column positions are the report's contract with downstream consumers;
// the scan stage writes through to these indices after every document.
const COL_LIFETIME_PROJECTS: usize = 8;
const COL_LIFETIME_ACTIONS: usize = 9;
const COL_WEEK_PROJECTS: usize = 12;
const COL_WEEK_ACTIONS: usize = 13;
const COL_TODAY_PROJECTS: usize = 16;
const COL_TODAY_ACTIONS: usize = 17;

#[derive(Debug, Default)]
struct UserCounters {
    projects: i64,
    weekly_projects: i64,
    daily_projects: i64,
    actions: i64,
    weekly_actions: i64,
    daily_actions: i64,
}

/// State for one aggregation run. Built fresh per invocation; nothing is
/// shared across runs.
struct Aggregation {
    windows: AnalysisWindows,
    rows: Vec<Row>,
    row_index: HashMap<String, usize>,
    counters: HashMap<String, UserCounters>,
    totals: RollupTotals,
    signups: SignupSummary,
    roster_size: usize,
}

/// Builds the full metrics table: header rows, one row per roster user in
/// roster order, then totals, averages, and the signup summary. `now` is
/// injected so identical inputs always produce identical tables.
pub fn build_metrics_table(
    roster: &[User],
    documents: &[ProjectDocument],
    now: DateTime<Utc>,
) -> Vec<Row> {
    let mut run = Aggregation::new(analysis_windows(now));
    run.push_headers();
    run.seed_users(roster);
    run.scan_projects(documents);
    run.assemble()
}

impl Aggregation {
    fn new(windows: AnalysisWindows) -> Self {
        Aggregation {
            windows,
            rows: Vec::new(),
            row_index: HashMap::new(),
            counters: HashMap::new(),
            totals: RollupTotals::default(),
            signups: SignupSummary::default(),
            roster_size: 0,
        }
    }

    fn push_headers(&mut self) {
        self.rows.push(vec![
            Cell::Blank,
            Cell::Text("PatentID User Metrics".to_string()),
            Cell::Text(format_date(self.windows.midnight_ms)),
        ]);
        self.rows.push(vec![
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Text("Lifetime".to_string()),
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Text("Past Week".to_string()),
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Text("Today".to_string()),
        ]);
        self.rows.push(vec![
            Cell::Text("User Name".to_string()),
            Cell::Text("Email".to_string()),
            Cell::Text("Promo".to_string()),
            Cell::Text("Sign Up Date".to_string()),
            Cell::Text("Days Since Sign Up".to_string()),
            Cell::Text("Days Since Last Login".to_string()),
            Cell::Blank,
            Cell::Text("Logins".to_string()),
            Cell::Text("Active Projects".to_string()),
            Cell::Text("Actions".to_string()),
            Cell::Blank,
            Cell::Text("Logins".to_string()),
            Cell::Text("Active Projects".to_string()),
            Cell::Text("Actions".to_string()),
            Cell::Blank,
            Cell::Text("Logins".to_string()),
            Cell::Text("Active Projects".to_string()),
            Cell::Text("Actions".to_string()),
        ]);
    }

    fn seed_users(&mut self, roster: &[User]) {
        for user in roster {
            // Independent membership tests: a login this morning counts
            // toward both the today and past-week cells.
            let logins_today = user
                .logins
                .iter()
                .filter(|&&ts| self.windows.in_today(ts))
                .count() as i64;
            let logins_week = user
                .logins
                .iter()
                .filter(|&&ts| self.windows.in_past_week(ts))
                .count() as i64;

            self.counters.insert(user.id.clone(), UserCounters::default());

            self.signups.total_users += 1;
            if self.windows.in_today(user.created_at) {
                self.signups.new_today += 1;
            }
            if self.windows.in_past_week(user.created_at) {
                self.signups.new_last_week += 1;
            }

            self.totals.logins += user.total_logins;
            self.totals.weekly_logins += logins_week;
            self.totals.daily_logins += logins_today;
            self.totals.days_since_sign_up += user.days_since_sign_up;
            self.totals.days_since_last_login += user.days_since_last_login.unwrap_or(0);

            // A lifetime login total of zero means "never logged in";
            // the login-derived cells stay blank rather than showing 0.
            let never_logged_in = user.total_logins == 0;
            let last_login_cell = if never_logged_in {
                Cell::Blank
            } else {
                user.days_since_last_login.map(Cell::Int).unwrap_or(Cell::Blank)
            };
            let login_cell = |count: i64| {
                if never_logged_in {
                    Cell::Blank
                } else {
                    Cell::Int(count)
                }
            };

            self.row_index.insert(user.id.clone(), self.rows.len());
            self.rows.push(vec![
                Cell::Text(user.id.clone()),
                Cell::Text(user.email.clone()),
                Cell::Text(user.promo.clone()),
                Cell::Text(format_date(user.created_at)),
                Cell::Int(user.days_since_sign_up),
                last_login_cell,
                Cell::Blank,
                login_cell(user.total_logins),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Blank,
                login_cell(logins_week),
                Cell::Int(0),
                Cell::Int(0),
                Cell::Blank,
                login_cell(logins_today),
                Cell::Int(0),
                Cell::Int(0),
            ]);
        }

        self.roster_size = roster.len();
    }

    fn scan_projects(&mut self, documents: &[ProjectDocument]) {
        for document in documents {
            let known = self.counters.contains_key(&document.user_hash);

            // One lifetime active-project unit per document, regardless of
            // how many actions it holds.
            if let Some(counters) = self.counters.get_mut(&document.user_hash) {
                counters.projects += 1;
            }
            if known {
                self.totals.projects += 1;
            }

            let mut active_past_week = false;
            let mut active_today = false;

            for action in document.history.values() {
                let happened_today = self.windows.in_today(action.occurred_at_ms);
                let happened_past_week = self.windows.in_past_week(action.occurred_at_ms);

                if let Some(counters) = self.counters.get_mut(&document.user_hash) {
                    counters.actions += 1;
                    if happened_past_week {
                        counters.weekly_actions += 1;
                    }
                    if happened_today {
                        counters.daily_actions += 1;
                    }
                }
                if known {
                    self.totals.actions += 1;
                    if happened_past_week {
                        self.totals.weekly_actions += 1;
                    }
                    if happened_today {
                        self.totals.daily_actions += 1;
                    }
                }

                active_past_week |= happened_past_week;
                active_today |= happened_today;
            }

            if active_past_week {
                if let Some(counters) = self.counters.get_mut(&document.user_hash) {
                    counters.weekly_projects += 1;
                    self.totals.weekly_projects += 1;
                }
            }
            if active_today {
                if let Some(counters) = self.counters.get_mut(&document.user_hash) {
                    counters.daily_projects += 1;
                    self.totals.daily_projects += 1;
                }
            }

            self.write_through(&document.user_hash);
        }
    }

    /// Copies the owner's cumulative counters into their output row. A
    /// document for an unknown owner matches no row and is a no-op.
    fn write_through(&mut self, user_hash: &str) {
        let (Some(&index), Some(counters)) =
            (self.row_index.get(user_hash), self.counters.get(user_hash))
        else {
            return;
        };

        let row = &mut self.rows[index];
        row[COL_LIFETIME_PROJECTS] = Cell::Int(counters.projects);
        row[COL_LIFETIME_ACTIONS] = Cell::Int(counters.actions);
        row[COL_WEEK_PROJECTS] = Cell::Int(counters.weekly_projects);
        row[COL_WEEK_ACTIONS] = Cell::Int(counters.weekly_actions);
        row[COL_TODAY_PROJECTS] = Cell::Int(counters.daily_projects);
        row[COL_TODAY_ACTIONS] = Cell::Int(counters.daily_actions);
    }

    fn assemble(mut self) -> Vec<Row> {
        let totals = self.totals.clone();

        self.rows.push(Row::new());
        self.rows.push(vec![
            Cell::Text("Total".to_string()),
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Int(totals.days_since_sign_up),
            Cell::Int(totals.days_since_last_login),
            Cell::Blank,
            Cell::Int(totals.logins),
            Cell::Int(totals.projects),
            Cell::Int(totals.actions),
            Cell::Blank,
            Cell::Int(totals.weekly_logins),
            Cell::Int(totals.weekly_projects),
            Cell::Int(totals.weekly_actions),
            Cell::Blank,
            Cell::Int(totals.daily_logins),
            Cell::Int(totals.daily_projects),
            Cell::Int(totals.daily_actions),
        ]);
        self.rows.push(vec![
            Cell::Text("Average/User".to_string()),
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            self.average(totals.days_since_sign_up),
            self.average(totals.days_since_last_login),
            Cell::Blank,
            self.average(totals.logins),
            self.average(totals.projects),
            self.average(totals.actions),
            Cell::Blank,
            self.average(totals.weekly_logins),
            self.average(totals.weekly_projects),
            self.average(totals.weekly_actions),
            Cell::Blank,
            self.average(totals.daily_logins),
            self.average(totals.daily_projects),
            self.average(totals.daily_actions),
        ]);
        self.rows.push(Row::new());
        self.rows.push(vec![
            Cell::Text("Total Users".to_string()),
            Cell::Int(self.signups.total_users),
            Cell::Blank,
            Cell::Text("New Users Last 7 Days".to_string()),
            Cell::Int(self.signups.new_last_week),
            Cell::Blank,
            Cell::Text("New Users Today".to_string()),
            Cell::Int(self.signups.new_today),
        ]);

        self.rows
    }

    /// Per-user average over the roster size, rounded to two decimals. An
    /// empty roster yields a blank placeholder instead of dividing by zero.
    fn average(&self, total: i64) -> Cell {
        if self.roster_size == 0 {
            return Cell::Blank;
        }
        let value = total as f64 / self.roster_size as f64;
        Cell::Num((value * 100.0).round() / 100.0)
    }
}

/// `M-D-YYYY`, matching what the rest of the reporting pipeline expects.
fn format_date(timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(instant) => {
            let date = instant.date_naive();
            format!("{}-{}-{}", date.month(), date.day(), date.year())
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, NEW_PROJECT_COMMAND};

    const HEADER_ROWS: usize = 3;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 30, 0).unwrap()
    }

    fn ms(year: i32, month: u32, day: u32, hour: u32) -> i64 {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn user(id: &str, created_at: i64, logins: &[i64]) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@axonpatent.com"),
            promo: "beta".to_string(),
            created_at,
            days_since_sign_up: 10,
            days_since_last_login: Some(2),
            logins: logins.to_vec(),
            total_logins: logins.len() as i64,
        }
    }

    fn document(user_hash: &str, actions: &[(&str, &str, i64)]) -> ProjectDocument {
        let history = actions
            .iter()
            .map(|(key, command, occurred_at_ms)| {
                (
                    key.to_string(),
                    Action {
                        command: command.to_string(),
                        occurred_at_ms: *occurred_at_ms,
                    },
                )
            })
            .collect();
        ProjectDocument {
            user_hash: user_hash.to_string(),
            history,
        }
    }

    fn user_row(table: &[Row], position: usize) -> &Row {
        &table[HEADER_ROWS + position]
    }

    #[test]
    fn new_user_with_no_activity_gets_placeholders_and_signup_count() {
        let roster = vec![user("u1", ms(2026, 3, 10, 8), &[])];
        let table = build_metrics_table(&roster, &[], fixed_now());

        let row = user_row(&table, 0);
        assert_eq!(row[0], Cell::Text("u1".to_string()));
        assert_eq!(row[5], Cell::Blank);
        assert_eq!(row[7], Cell::Blank);
        assert_eq!(row[11], Cell::Blank);
        assert_eq!(row[15], Cell::Blank);
        assert_eq!(row[8], Cell::Int(0));
        assert_eq!(row[9], Cell::Int(0));

        let signup = table.last().unwrap();
        assert_eq!(signup[1], Cell::Int(1));
        assert_eq!(signup[4], Cell::Int(1));
        assert_eq!(signup[7], Cell::Int(1));
    }

    #[test]
    fn active_user_shows_numeric_login_counts() {
        let roster = vec![user("u1", ms(2026, 1, 1, 8), &[ms(2026, 3, 10, 9)])];
        let table = build_metrics_table(&roster, &[], fixed_now());

        let row = user_row(&table, 0);
        assert_eq!(row[7], Cell::Int(1));
        // A login this morning lands in the week window as well.
        assert_eq!(row[11], Cell::Int(1));
        assert_eq!(row[15], Cell::Int(1));
    }

    #[test]
    fn project_active_last_week_but_not_today() {
        let week_stamp = ms(2026, 3, 5, 12);
        let roster = vec![user("u1", ms(2026, 1, 1, 8), &[week_stamp])];
        let documents = vec![document(
            "u1",
            &[("a", NEW_PROJECT_COMMAND, week_stamp)],
        )];
        let table = build_metrics_table(&roster, &documents, fixed_now());

        let row = user_row(&table, 0);
        assert_eq!(row[8], Cell::Int(1), "lifetime active projects");
        assert_eq!(row[12], Cell::Int(1), "week active projects");
        assert_eq!(row[16], Cell::Int(0), "today active projects");
        assert_eq!(row[9], Cell::Int(1));
        assert_eq!(row[13], Cell::Int(1));
        assert_eq!(row[17], Cell::Int(0));
    }

    #[test]
    fn zero_action_document_counts_a_project_but_no_window_activity() {
        let roster = vec![user("u1", ms(2026, 1, 1, 8), &[ms(2026, 3, 9, 9)])];
        let documents = vec![document("u1", &[])];
        let table = build_metrics_table(&roster, &documents, fixed_now());

        let row = user_row(&table, 0);
        assert_eq!(row[8], Cell::Int(1));
        assert_eq!(row[12], Cell::Int(0));
        assert_eq!(row[16], Cell::Int(0));
        assert_eq!(row[9], Cell::Int(0));
    }

    #[test]
    fn unknown_owner_documents_change_nothing() {
        let roster = vec![user("u1", ms(2026, 1, 1, 8), &[ms(2026, 3, 9, 9)])];
        let today = ms(2026, 3, 10, 10);
        let documents = vec![document(
            "ghost",
            &[
                ("a", "search", today),
                ("b", "search", today),
                ("c", "savePatent", today),
                ("d", "savePatent", today),
                ("e", NEW_PROJECT_COMMAND, today),
            ],
        )];

        let with_ghost = build_metrics_table(&roster, &documents, fixed_now());
        let without = build_metrics_table(&roster, &[], fixed_now());
        assert_eq!(with_ghost, without);
    }

    #[test]
    fn lifetime_actions_sum_matches_known_document_actions() {
        let roster = vec![
            user("u1", ms(2026, 1, 1, 8), &[ms(2026, 3, 9, 9)]),
            user("u2", ms(2026, 2, 1, 8), &[]),
        ];
        let documents = vec![
            document("u1", &[("a", "search", ms(2026, 2, 20, 9)), ("b", "search", ms(2026, 3, 9, 9))]),
            document("u2", &[("a", "savePatent", ms(2026, 3, 10, 9))]),
            document("ghost", &[("a", "search", ms(2026, 3, 10, 9))]),
        ];
        let table = build_metrics_table(&roster, &documents, fixed_now());

        let summed: i64 = (0..roster.len())
            .map(|position| match user_row(&table, position)[9] {
                Cell::Int(count) => count,
                _ => 0,
            })
            .sum();
        assert_eq!(summed, 3);

        // Totals row mirrors the sum and excludes the unknown owner.
        let totals = &table[HEADER_ROWS + roster.len() + 1];
        assert_eq!(totals[0], Cell::Text("Total".to_string()));
        assert_eq!(totals[9], Cell::Int(3));
    }

    #[test]
    fn later_documents_overwrite_rows_with_cumulative_counts() {
        let stamp = ms(2026, 3, 10, 9);
        let roster = vec![user("u1", ms(2026, 1, 1, 8), &[stamp])];
        let documents = vec![
            document("u1", &[("a", "search", stamp)]),
            document("u1", &[("a", "search", stamp), ("b", "search", stamp)]),
        ];
        let table = build_metrics_table(&roster, &documents, fixed_now());

        let row = user_row(&table, 0);
        assert_eq!(row[8], Cell::Int(2));
        assert_eq!(row[9], Cell::Int(3));
        assert_eq!(row[16], Cell::Int(2));
        assert_eq!(row[17], Cell::Int(3));
    }

    #[test]
    fn averages_divide_by_roster_size() {
        let roster = vec![
            user("u1", ms(2026, 1, 1, 8), &[ms(2026, 3, 10, 9)]),
            user("u2", ms(2026, 2, 1, 8), &[]),
        ];
        let documents = vec![document("u1", &[("a", "search", ms(2026, 3, 10, 9))])];
        let table = build_metrics_table(&roster, &documents, fixed_now());

        let averages = &table[HEADER_ROWS + roster.len() + 2];
        assert_eq!(averages[0], Cell::Text("Average/User".to_string()));
        assert_eq!(averages[7], Cell::Num(0.5));
        assert_eq!(averages[8], Cell::Num(0.5));
        assert_eq!(averages[9], Cell::Num(0.5));
        assert_eq!(averages[4], Cell::Num(10.0));
    }

    #[test]
    fn empty_roster_produces_blank_averages_without_panicking() {
        let table = build_metrics_table(&[], &[], fixed_now());
        let averages = &table[HEADER_ROWS + 2];
        assert_eq!(averages[0], Cell::Text("Average/User".to_string()));
        assert_eq!(averages[7], Cell::Blank);
        assert_eq!(averages[9], Cell::Blank);
    }

    #[test]
    fn identical_inputs_produce_identical_tables() {
        let roster = vec![
            user("u1", ms(2026, 1, 1, 8), &[ms(2026, 3, 9, 9), ms(2026, 3, 10, 9)]),
            user("u2", ms(2026, 3, 10, 8), &[]),
        ];
        let documents = vec![
            document("u1", &[("a", NEW_PROJECT_COMMAND, ms(2026, 3, 9, 9))]),
            document("u2", &[]),
        ];

        let first = build_metrics_table(&roster, &documents, fixed_now());
        let second = build_metrics_table(&roster, &documents, fixed_now());
        assert_eq!(first, second);
    }

    #[test]
    fn signup_date_is_formatted_month_day_year() {
        let roster = vec![user("u1", ms(2026, 3, 2, 8), &[])];
        let table = build_metrics_table(&roster, &[], fixed_now());
        assert_eq!(user_row(&table, 0)[3], Cell::Text("3-2-2026".to_string()));
    }
}
