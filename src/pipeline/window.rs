// src/pipeline/window.rs

//! Recency window: a fixed set of calendar dates.
//!
//! Not a sliding duration. An item is "new enough" when its UTC publish date
//! is one of the dates, which by default are today and yesterday. That
//! tolerates trigger skew and one missed run without rereading a whole catalog.

use std::collections::BTreeSet;

use chrono::{DateTime, Days, NaiveDate, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    dates: BTreeSet<NaiveDate>,
}

impl TimeWindow {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    /// `days` calendar dates ending with the UTC date of `now`.
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        let today = now.date_naive();
        Self::new((0..days.max(1)).filter_map(|back| today.checked_sub_days(Days::new(back.into()))))
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.contains_date(at.date_naive())
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 5, 0, 0).unwrap()
    }

    #[test]
    fn test_today_and_yesterday_included() {
        let window = TimeWindow::trailing_days(now(), 2);
        assert!(window.contains(&now()));
        assert!(window.contains(&(now() - Duration::days(1))));
        // Early yesterday is still yesterday
        assert!(window.contains(&Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 1).unwrap()));
    }

    #[test]
    fn test_two_days_ago_and_future_excluded() {
        let window = TimeWindow::trailing_days(now(), 2);
        assert!(!window.contains(&(now() - Duration::days(2))));
        assert!(!window.contains(&(now() + Duration::days(1))));
    }

    #[test]
    fn test_calendar_not_sliding() {
        // 23:59 two days back is 29 hours earlier, still outside
        let window = TimeWindow::trailing_days(now(), 2);
        let late = Utc.with_ymd_and_hms(2026, 10, 15, 23, 59, 0).unwrap();
        assert!(!window.contains(&late));
        assert_eq!(window.dates().count(), 2);
    }
}
