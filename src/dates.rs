//! Date parsing and the relative date vocabulary
//!
//! All relative words resolve against a single caller-provided `today`
//! so query runs are deterministic under test.

use chrono::{Datelike, Duration, NaiveDate};

/// A resolved date predicate value: either one day or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMatch {
    Day(NaiveDate),
    Range(NaiveDate, NaiveDate),
    Before(NaiveDate),
    After(NaiveDate),
}

impl DateMatch {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            DateMatch::Day(d) => date == *d,
            DateMatch::Range(start, end) => date >= *start && date <= *end,
            DateMatch::Before(d) => date < *d,
            DateMatch::After(d) => date > *d,
        }
    }
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parse an ISO datetime (`YYYY-MM-DDTHH:MM` or with seconds / offset)
/// down to its date component.
pub fn parse_iso_datetime_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Resolve a date word from the query vocabulary.
///
/// Accepts `today`, `yesterday`, `tomorrow`, `this-week`, `next-week`,
/// `past`, `future`, and ISO dates. Returns `None` for anything else.
pub fn resolve_date_word(word: &str, today: NaiveDate) -> Option<DateMatch> {
    match word {
        "today" => Some(DateMatch::Day(today)),
        "yesterday" => Some(DateMatch::Day(today - Duration::days(1))),
        "tomorrow" => Some(DateMatch::Day(today + Duration::days(1))),
        "this-week" => {
            let start = week_start(today);
            Some(DateMatch::Range(start, start + Duration::days(6)))
        }
        "next-week" => {
            let start = week_start(today) + Duration::days(7);
            Some(DateMatch::Range(start, start + Duration::days(6)))
        }
        "past" => Some(DateMatch::Before(today)),
        "future" => Some(DateMatch::After(today)),
        _ => parse_iso_date(word).map(DateMatch::Day),
    }
}

/// Monday of the week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    let days_from_monday = date.weekday().num_days_from_monday() as i64;
    date - Duration::days(days_from_monday)
}

/// Extract a calendar date from a stored value string, accepting both
/// date and datetime forms.
pub fn date_of_value(value: &str) -> Option<NaiveDate> {
    parse_iso_date(value).or_else(|| parse_iso_datetime_date(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    #[test]
    fn test_simple_words() {
        let today = d("2026-02-10");
        assert_eq!(resolve_date_word("today", today), Some(DateMatch::Day(d("2026-02-10"))));
        assert_eq!(resolve_date_word("yesterday", today), Some(DateMatch::Day(d("2026-02-09"))));
        assert_eq!(resolve_date_word("tomorrow", today), Some(DateMatch::Day(d("2026-02-11"))));
    }

    #[test]
    fn test_weeks() {
        // 2026-02-10 is a Tuesday; the week runs Mon 02-09 .. Sun 02-15.
        let today = d("2026-02-10");
        assert_eq!(
            resolve_date_word("this-week", today),
            Some(DateMatch::Range(d("2026-02-09"), d("2026-02-15")))
        );
        assert_eq!(
            resolve_date_word("next-week", today),
            Some(DateMatch::Range(d("2026-02-16"), d("2026-02-22")))
        );
    }

    #[test]
    fn test_past_future() {
        let today = d("2026-02-10");
        let past = resolve_date_word("past", today).unwrap();
        assert!(past.contains(d("2026-02-09")));
        assert!(!past.contains(today));

        let future = resolve_date_word("future", today).unwrap();
        assert!(future.contains(d("2026-02-11")));
        assert!(!future.contains(today));
    }

    #[test]
    fn test_iso_passthrough() {
        let today = d("2026-02-10");
        assert_eq!(
            resolve_date_word("2025-12-31", today),
            Some(DateMatch::Day(d("2025-12-31")))
        );
        assert_eq!(resolve_date_word("not-a-date", today), None);
    }

    #[test]
    fn test_date_of_value() {
        assert_eq!(date_of_value("2026-02-10"), Some(d("2026-02-10")));
        assert_eq!(date_of_value("2026-02-10T09:00"), Some(d("2026-02-10")));
        assert_eq!(date_of_value("nope"), None);
    }
}
