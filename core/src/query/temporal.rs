use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::query::types::TemporalRange;

const MONTHS: [(&str, u32); 12] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Stage 2 temporal extraction: relative phrases ("yesterday", "last week",
/// "N days ago"), absolute months/years, and seasons (winter wraps into the
/// prior calendar year's December).
pub fn parse_temporal(original: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
    let lower = original.to_lowercase();

    if lower.contains("yesterday") {
        return day_range(now - Duration::days(1));
    }
    if lower.contains("last week") {
        return Some(range_back_from_now(now, 7));
    }
    if lower.contains("last month") {
        return Some(range_back_from_now(now, 30));
    }
    if lower.contains("recent") {
        return Some(range_back_from_now(now, 14));
    }
    if let Some(range) = parse_relative_n_ago(&lower, now) {
        return Some(range);
    }
    if let Some(range) = parse_month_year(&lower, now) {
        return Some(range);
    }
    if let Some(range) = parse_season(&lower, now) {
        return Some(range);
    }
    parse_bare_year(&lower)
}

fn range_back_from_now(now: DateTime<Utc>, days: i64) -> TemporalRange {
    TemporalRange {
        start_epoch: (now - Duration::days(days)).timestamp() as f64,
        end_epoch: now.timestamp() as f64,
    }
}

fn day_range(day: DateTime<Utc>) -> Option<TemporalRange> {
    let start = Utc.with_ymd_and_hms(day.year(), day.month(), day.day(), 0, 0, 0).single()?;
    let end = start + Duration::days(1) - Duration::seconds(1);
    Some(TemporalRange { start_epoch: start.timestamp() as f64, end_epoch: end.timestamp() as f64 })
}

fn parse_relative_n_ago(lower: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    for i in 0..tokens.len() {
        if tokens[i] == "ago" && i >= 2 {
            let unit = tokens[i - 1].trim_end_matches('s');
            if let Ok(n) = tokens[i - 2].parse::<i64>() {
                let days = match unit {
                    "day" => n,
                    "week" => n * 7,
                    "month" => n * 30,
                    _ => continue,
                };
                return Some(range_back_from_now(now, days));
            }
        }
    }
    None
}

fn parse_month_year(lower: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
    for (name, month) in MONTHS {
        if let Some(pos) = lower.find(name) {
            let year = find_adjacent_year(&lower[pos + name.len()..]).unwrap_or_else(|| now.year());
            return month_range(year, month);
        }
    }
    None
}

fn find_adjacent_year(rest: &str) -> Option<i32> {
    for tok in rest.split_whitespace().take(2) {
        let digits: String = tok.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == 4 {
            return digits.parse().ok();
        }
    }
    None
}

fn month_range(year: i32, month: u32) -> Option<TemporalRange> {
    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).single()? - Duration::seconds(1);
    Some(TemporalRange { start_epoch: start.timestamp() as f64, end_epoch: end.timestamp() as f64 })
}

fn parse_season(lower: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
    let year = now.year();
    if lower.contains("winter") {
        let start = Utc.with_ymd_and_hms(year - 1, 12, 1, 0, 0, 0).single()?;
        let end = Utc.with_ymd_and_hms(year, 3, 1, 0, 0, 0).single()? - Duration::seconds(1);
        return Some(TemporalRange { start_epoch: start.timestamp() as f64, end_epoch: end.timestamp() as f64 });
    }
    if lower.contains("spring") {
        return season_range(year, 3, 6);
    }
    if lower.contains("summer") {
        return season_range(year, 6, 9);
    }
    if lower.contains("fall") || lower.contains("autumn") {
        return season_range(year, 9, 12);
    }
    None
}

fn season_range(year: i32, start_month: u32, end_month: u32) -> Option<TemporalRange> {
    let start = Utc.with_ymd_and_hms(year, start_month, 1, 0, 0, 0).single()?;
    let end = Utc.with_ymd_and_hms(year, end_month, 1, 0, 0, 0).single()? - Duration::seconds(1);
    Some(TemporalRange { start_epoch: start.timestamp() as f64, end_epoch: end.timestamp() as f64 })
}

fn parse_bare_year(lower: &str) -> Option<TemporalRange> {
    for tok in lower.split_whitespace() {
        if tok.len() == 4 && tok.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(year) = tok.parse::<i32>() {
                if (1900..=2100).contains(&year) {
                    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
                    let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single()? - Duration::seconds(1);
                    return Some(TemporalRange { start_epoch: start.timestamp() as f64, end_epoch: end.timestamp() as f64 });
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn yesterday_resolves_to_prior_calendar_day() {
        let range = parse_temporal("files from yesterday", fixed_now()).unwrap();
        let start = Utc.timestamp_opt(range.start_epoch as i64, 0).single().unwrap();
        assert_eq!(start.day(), 26);
    }

    #[test]
    fn n_days_ago_parses() {
        let range = parse_temporal("report 3 days ago", fixed_now()).unwrap();
        assert!(range.end_epoch - range.start_epoch >= 3.0 * 86400.0 - 1.0);
    }

    #[test]
    fn winter_wraps_into_prior_year_december() {
        let range = parse_temporal("winter vacation photos", fixed_now()).unwrap();
        let start = Utc.timestamp_opt(range.start_epoch as i64, 0).single().unwrap();
        assert_eq!(start.year(), 2025);
        assert_eq!(start.month(), 12);
    }

    #[test]
    fn bare_year_resolves_full_calendar_year() {
        let range = parse_temporal("taxes 2023", fixed_now()).unwrap();
        let start = Utc.timestamp_opt(range.start_epoch as i64, 0).single().unwrap();
        assert_eq!(start.year(), 2023);
        assert_eq!(start.month(), 1);
    }

    #[test]
    fn no_temporal_phrase_returns_none() {
        assert!(parse_temporal("budget spreadsheet", fixed_now()).is_none());
    }
}
