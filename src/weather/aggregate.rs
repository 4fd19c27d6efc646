use std::collections::HashSet;

use chrono::DateTime;

use crate::weather::models::{ForecastEntry, ForecastSeries};

/// Collapse a fine-grained series (3-hour steps) into one entry per calendar day.
///
/// The first entry seen for each day is kept and days stay in order of first
/// appearance. The city is carried over unchanged.
pub fn daily_aggregate(series: &ForecastSeries) -> ForecastSeries {
    let mut seen = HashSet::new();
    let list = series
        .list
        .iter()
        .filter(|entry| seen.insert(day_key(entry)))
        .cloned()
        .collect();

    ForecastSeries {
        list,
        city: series.city.clone(),
    }
}

/// Date portion of the entry's timestamp.
fn day_key(entry: &ForecastEntry) -> String {
    match entry.dt_txt.get(..10) {
        Some(date) => date.to_string(),
        None => DateTime::from_timestamp(entry.dt, 0)
            .map(|dt| dt.date_naive().to_string())
            .unwrap_or_else(|| entry.dt_txt.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::models::fixtures;

    #[test]
    fn test_keeps_first_entry_per_day_in_order() {
        let series = fixtures::forecast(
            "Cairo",
            30.0,
            31.0,
            &[
                "2025-04-01 00:00:00",
                "2025-04-01 03:00:00",
                "2025-04-02 00:00:00",
            ],
        );

        let daily = daily_aggregate(&series);

        assert_eq!(daily.list.len(), 2);
        assert_eq!(daily.list[0].dt_txt, "2025-04-01 00:00:00");
        assert_eq!(daily.list[1].dt_txt, "2025-04-02 00:00:00");
        assert_eq!(daily.list[0].main.temp, series.list[0].main.temp);
        assert_eq!(daily.city, series.city);
    }

    #[test]
    fn test_out_of_order_days_keep_first_appearance() {
        let series = fixtures::forecast(
            "Cairo",
            30.0,
            31.0,
            &[
                "2025-04-02 21:00:00",
                "2025-04-01 00:00:00",
                "2025-04-02 00:00:00",
                "2025-04-01 03:00:00",
            ],
        );

        let daily = daily_aggregate(&series);

        let stamps: Vec<&str> = daily.list.iter().map(|e| e.dt_txt.as_str()).collect();
        assert_eq!(stamps, vec!["2025-04-02 21:00:00", "2025-04-01 00:00:00"]);
    }

    #[test]
    fn test_empty_series_stays_empty() {
        let series = fixtures::forecast("Cairo", 30.0, 31.0, &[]);
        assert!(daily_aggregate(&series).list.is_empty());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let series = fixtures::forecast(
            "Cairo",
            30.0,
            31.0,
            &["2025-04-01 00:00:00", "2025-04-01 03:00:00", "2025-04-03 00:00:00"],
        );
        let once = daily_aggregate(&series);
        assert_eq!(daily_aggregate(&once), once);
    }

    #[test]
    fn test_missing_timestamp_text_uses_unix_date() {
        let mut series = fixtures::forecast("Cairo", 30.0, 31.0, &["", "", ""]);
        // 2025-04-01 00:00 UTC, 2025-04-01 03:00 UTC, 2025-04-02 00:00 UTC
        series.list[0].dt = 1_743_465_600;
        series.list[1].dt = 1_743_476_400;
        series.list[2].dt = 1_743_552_000;

        let daily = daily_aggregate(&series);

        let stamps: Vec<i64> = daily.list.iter().map(|e| e.dt).collect();
        assert_eq!(stamps, vec![1_743_465_600, 1_743_552_000]);
    }
}
