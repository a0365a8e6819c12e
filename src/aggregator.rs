//! # Macro Aggregator
//!
//! Folds meal records into a single-day summary or a multi-day rollup.
//! Sums are kept at full precision; rounding happens only when a value is
//! formatted for display.

use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

use crate::meal::{MacroTotals, MealRecord};

/// Totals and meals for one calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub totals: MacroTotals,
    /// Sorted by `meal_time` ascending
    pub meals: Vec<MealRecord>,
}

impl DailySummary {
    /// True when nothing was logged for the day
    pub fn is_empty(&self) -> bool {
        self.meals.is_empty()
    }
}

/// Totals for one day of a rollup
#[derive(Debug, Clone, PartialEq)]
pub struct DayTotals {
    pub date: NaiveDate,
    pub totals: MacroTotals,
    pub meal_count: usize,
}

/// Per-day totals ordered by date descending, with no entries for days
/// that had no records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodRollup {
    pub days: Vec<DayTotals>,
}

impl PeriodRollup {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Sum across every day in the rollup
    pub fn grand_total(&self) -> MacroTotals {
        let mut total = MacroTotals::default();
        for day in &self.days {
            total += day.totals;
        }
        total
    }
}

/// Half-open date range `[start, end)` used for "the last N days"
///
/// `last_n_days` ends at `today` exclusive: the current day is shown by the
/// daily summary, not the rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl PeriodWindow {
    pub fn last_n_days(today: NaiveDate, days: u32) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// First covered date
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// First date after the window
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Covered dates in ascending order
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

fn sum_macros<'a>(records: impl IntoIterator<Item = &'a MealRecord>) -> MacroTotals {
    let mut totals = MacroTotals::default();
    for record in records {
        totals += record.macros();
    }
    totals
}

/// Summarize one user's meals for one day
///
/// Input order is not trusted; meals come back sorted by `meal_time`.
pub fn summarize_day(
    date: NaiveDate,
    records: impl IntoIterator<Item = MealRecord>,
) -> DailySummary {
    let mut meals: Vec<MealRecord> = records.into_iter().collect();
    meals.sort_by_key(|meal| meal.meal_time);
    let totals = sum_macros(&meals);

    DailySummary {
        date,
        totals,
        meals,
    }
}

/// Roll meals spanning several days up into per-day totals
pub fn summarize_period(records: impl IntoIterator<Item = MealRecord>) -> PeriodRollup {
    let mut buckets: BTreeMap<NaiveDate, Vec<MealRecord>> = BTreeMap::new();
    for record in records {
        buckets.entry(record.log_date).or_default().push(record);
    }

    let days = buckets
        .into_iter()
        .rev()
        .map(|(date, meals)| DayTotals {
            date,
            totals: sum_macros(&meals),
            meal_count: meals.len(),
        })
        .collect();

    PeriodRollup { days }
}

/// Round half away from zero to one decimal place
///
/// The nudge absorbs binary representation error, so a sum such as
/// `100.25 + 99.8` rounds to `200.1` rather than `200.0`.
pub fn round_one_decimal(value: f64) -> f64 {
    let scaled = value * 10.0;
    (scaled + scaled.signum() * 1e-9).round() / 10.0
}

/// Display form of a nutrient amount
pub fn format_amount(value: f64) -> String {
    format!("{:.1}", round_one_decimal(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, h, m, 0).unwrap()
    }

    fn meal(id: i64, log_date: &str, meal_time: DateTime<Utc>, calories: f64) -> MealRecord {
        MealRecord {
            id,
            user_id: 1,
            log_date: date(log_date),
            meal_time,
            food_item: format!("meal {id}"),
            protein_g: 10.0,
            carbs_g: 20.0,
            fats_g: 5.0,
            calories,
        }
    }

    #[test]
    fn test_summarize_day_empty() {
        let summary = summarize_day(date("2024-01-03"), Vec::new());
        assert!(summary.is_empty());
        assert!(summary.totals.is_zero());
        assert_eq!(summary.date, date("2024-01-03"));
    }

    #[test]
    fn test_summarize_day_exact_sum() {
        let summary = summarize_day(
            date("2024-01-03"),
            vec![
                meal(1, "2024-01-03", at(8, 0), 100.25),
                meal(2, "2024-01-03", at(12, 0), 99.8),
            ],
        );

        assert_eq!(summary.totals.calories, 100.25 + 99.8);
        assert!((summary.totals.calories - 200.05).abs() < 1e-9);
        assert_eq!(format_amount(summary.totals.calories), "200.1");
        assert_eq!(summary.totals.protein_g, 20.0);
        assert_eq!(summary.totals.carbs_g, 40.0);
        assert_eq!(summary.totals.fats_g, 10.0);
    }

    #[test]
    fn test_summarize_day_keeps_zero_records() {
        let mut water = meal(3, "2024-01-03", at(9, 0), 0.0);
        water.protein_g = 0.0;
        water.carbs_g = 0.0;
        water.fats_g = 0.0;

        let summary = summarize_day(
            date("2024-01-03"),
            vec![water, meal(4, "2024-01-03", at(10, 0), 250.0)],
        );
        assert_eq!(summary.meals.len(), 2);
        assert_eq!(summary.totals.calories, 250.0);
    }

    #[test]
    fn test_summarize_day_sorts_by_meal_time() {
        let summary = summarize_day(
            date("2024-01-03"),
            vec![
                meal(1, "2024-01-03", at(19, 30), 700.0),
                meal(2, "2024-01-03", at(7, 15), 300.0),
                meal(3, "2024-01-03", at(12, 45), 500.0),
            ],
        );

        let ids: Vec<i64> = summary.meals.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_summarize_period_skips_missing_days() {
        let rollup = summarize_period(vec![
            meal(1, "2024-01-01", at(8, 0), 100.0),
            meal(2, "2024-01-03", at(8, 0), 300.0),
            meal(3, "2024-01-01", at(13, 0), 50.5),
        ]);

        let dates: Vec<NaiveDate> = rollup.days.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date("2024-01-03"), date("2024-01-01")]);
        assert_eq!(rollup.days[0].totals.calories, 300.0);
        assert_eq!(rollup.days[0].meal_count, 1);
        assert_eq!(rollup.days[1].totals.calories, 150.5);
        assert_eq!(rollup.days[1].meal_count, 2);
        assert_eq!(rollup.grand_total().calories, 450.5);
    }

    #[test]
    fn test_summarize_period_buckets_by_log_date_not_timestamp() {
        // Logged late on the 2nd in local time, stored timestamp already on the 3rd in UTC
        let late_time = Utc.with_ymd_and_hms(2024, 1, 3, 1, 30, 0).unwrap();
        let late = meal(1, "2024-01-02", late_time, 400.0);
        let rollup = summarize_period(vec![late]);

        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup.days[0].date, date("2024-01-02"));
    }

    #[test]
    fn test_summarize_period_empty() {
        let rollup = summarize_period(Vec::new());
        assert!(rollup.is_empty());
        assert!(rollup.grand_total().is_zero());
    }

    #[test]
    fn test_last_n_days_excludes_today() {
        let window = PeriodWindow::last_n_days(date("2024-01-10"), 3);

        assert_eq!(window.start(), date("2024-01-07"));
        assert_eq!(window.end(), date("2024-01-10"));
        let dates: Vec<NaiveDate> = window.dates().collect();
        assert_eq!(
            dates,
            vec![date("2024-01-07"), date("2024-01-08"), date("2024-01-09")]
        );
        assert!(!window.contains(date("2024-01-10")));
        assert!(!window.contains(date("2024-01-06")));
    }

    #[test]
    fn test_last_zero_days_is_empty() {
        let window = PeriodWindow::last_n_days(date("2024-01-10"), 0);
        assert_eq!(window.dates().count(), 0);
        assert!(!window.contains(date("2024-01-10")));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(format_amount(0.0), "0.0");
        assert_eq!(format_amount(12.34), "12.3");
        assert_eq!(format_amount(12.35), "12.4");
        assert_eq!(format_amount(7.0), "7.0");
        assert_eq!(round_one_decimal(-1.25), -1.3);
    }
}
