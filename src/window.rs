use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::models::WorkLogRow;

/// Date format used by the row store, e.g. `05-Mar-2024`.
pub const DATE_FORMAT: &str = "%d-%b-%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Today,
    Trailing(i64),
}

impl Window {
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Window::Today => today,
            Window::Trailing(days) => cutoff_date(today, *days),
        }
    }

    pub fn contains(&self, row: &WorkLogRow, today: NaiveDate) -> bool {
        parse_log_date(&row.date).is_some_and(|date| date >= self.cutoff(today) && date <= today)
    }

    /// Rows dated between the cutoff and `today`, inclusive.
    pub fn select(&self, rows: &[WorkLogRow], today: NaiveDate) -> Vec<WorkLogRow> {
        filter(rows, self.cutoff(today))
            .into_iter()
            .filter(|row| self.contains(row, today))
            .collect()
    }

    pub fn date_range(&self, today: NaiveDate) -> String {
        format!(
            "{} - {}",
            format_log_date(self.cutoff(today)),
            format_log_date(today)
        )
    }
}

pub fn parse_log_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

pub fn format_log_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn cutoff_date(today: NaiveDate, since_days: i64) -> NaiveDate {
    today - Duration::days(since_days.max(1))
}

pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Keeps rows whose date is on or after `cutoff`. Unparseable dates are dropped.
pub fn filter(rows: &[WorkLogRow], cutoff: NaiveDate) -> Vec<WorkLogRow> {
    rows.iter()
        .filter(|row| parse_log_date(&row.date).is_some_and(|date| date >= cutoff))
        .cloned()
        .collect()
}

/// Days between the most recent parseable row in `previous` and `as_of`.
/// Zero when there is no such row.
pub fn days_since_last_update(previous: &[WorkLogRow], as_of: NaiveDate) -> i64 {
    previous
        .iter()
        .rev()
        .find_map(|row| parse_log_date(&row.date))
        .map(|last| (as_of - last).num_days().max(0))
        .unwrap_or(0)
}
