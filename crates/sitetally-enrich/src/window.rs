//! Trailing full-month date window.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive `[from, to]` range handed to every fetch of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    /// First day of the month `months` before `today`'s month, through the
    /// last day of the previous month.
    ///
    /// With `months = 3` and `today = 2026-10-16` this is
    /// `2026-07-01 ..= 2026-09-30`.
    pub fn trailing(today: NaiveDate, months: u32) -> Self {
        let this_month = today.with_day(1).unwrap_or(today);
        let to = this_month.pred_opt().unwrap_or(this_month);
        let from = this_month
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        Self { from, to }
    }

    /// Render both ends with a `chrono` format string.
    pub fn render(&self, format: &str) -> (String, String) {
        (
            self.from.format(format).to_string(),
            self.to.format(format).to_string(),
        )
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}
