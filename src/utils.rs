use crate::error::{AnalyticsError, Result};
use chrono::{Datelike, Days, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An inclusive date range. Both bounds are part of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(AnalyticsError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Splits the window into consecutive calendar-month sub-windows.
    /// The first and last sub-windows are clipped to the outer bounds.
    pub fn months(&self) -> Vec<DateWindow> {
        let mut buckets = Vec::new();
        let mut cursor = self.start;

        while cursor <= self.end {
            let month_end = last_day_of_month(cursor.year(), cursor.month());
            let bucket_end = month_end.min(self.end);
            buckets.push(DateWindow {
                start: cursor,
                end: bucket_end,
            });
            cursor = match bucket_end.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        buckets
    }

    pub fn label(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }
}

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

/// Rounds a USD amount to cent precision. All monetary values that cross
/// the crate boundary are rounded with this helper.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rejects_inverted_bounds() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(DateWindow::new(start, end).is_err());
    }

    #[test]
    fn test_window_contains_is_inclusive() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();

        assert!(window.contains(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(window.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
    }

    #[test]
    fn test_months_splits_and_clips() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        )
        .unwrap();

        let buckets = window.months();
        assert_eq!(buckets.len(), 3);
        assert_eq!(
            buckets[0].start,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(buckets[0].end, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(buckets[1].start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(buckets[1].end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(buckets[2].end, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 12),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(10.004), 10.0);
        assert_eq!(round_cents(10.006), 10.01);
        assert_eq!(round_cents(33.333333), 33.33);
        assert_eq!(round_cents(-2.675), -2.67);
    }
}
