use chrono::{DateTime, Duration, NaiveTime, Utc};

/// The three analysis windows for one reporting run, derived once from an
/// injected "now". Lifetime has no lower bound and needs no stored
/// boundary; the other two are half-open intervals `[boundary, +inf)` over
/// epoch milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisWindows {
    pub midnight_ms: i64,
    pub one_week_ago_ms: i64,
}

/// Computes window boundaries from `now`. `one_week_ago` is midnight minus
/// seven calendar days, so a run early in a month lands in the previous
/// month rather than subtracting a fixed 168 hours.
pub fn analysis_windows(now: DateTime<Utc>) -> AnalysisWindows {
    let today = now.date_naive();
    let midnight = today.and_time(NaiveTime::MIN).and_utc();
    let one_week_ago = (today - Duration::days(7)).and_time(NaiveTime::MIN).and_utc();

    AnalysisWindows {
        midnight_ms: midnight.timestamp_millis(),
        one_week_ago_ms: one_week_ago.timestamp_millis(),
    }
}

impl AnalysisWindows {
    pub fn in_today(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.midnight_ms
    }

    pub fn in_past_week(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.one_week_ago_ms
    }
}
