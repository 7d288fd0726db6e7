//! Property-based tests for recurrence normalization and expansion.

use calq_core::date::{day_of_week, CalendarDate};
use calq_core::recurrence::{
    expand_occurrences_in_range, normalize_recurrence, occurs_on_date_normalized, RawRecurrenceInput,
    MAX_EXPANSION_DAYS,
};
use chrono::Datelike;
use proptest::prelude::*;

fn arb_freq() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("DAILY"), Just("WEEKLY"), Just("MONTHLY"), Just("YEARLY")]
}

fn arb_byday() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(vec!["MO", "TU", "WE", "TH", "FR", "SA", "SU"], 0..=7)
}

/// Day capped at 28 so every month/day combination exists.
fn arb_date() -> impl Strategy<Value = CalendarDate> {
    (2024i32..=2028, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| CalendarDate::from_ymd(y, m, d).expect("day <= 28 is always valid"))
}

fn rule_text(freq: &str, by_day: &[&str]) -> String {
    if by_day.is_empty() {
        format!("FREQ={}", freq)
    } else {
        format!("FREQ={};BYDAY={}", freq, by_day.join(","))
    }
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn normalization_never_panics(raw in ".{0,80}", end in ".{0,12}", start in ".{0,24}") {
        let input = RawRecurrenceInput::from_column(Some(&raw));
        let rule = normalize_recurrence(&input, Some(&end), Some(&start));
        if !rule.is_valid() {
            prop_assert!(!rule.errors().is_empty());
        }
    }

    #[test]
    fn day_of_week_agrees_with_chrono(date in arb_date()) {
        let expected = date.as_naive().weekday().num_days_from_sunday();
        prop_assert_eq!(day_of_week(date.year(), date.month(), date.day()), expected);
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn expansion_matches_day_checks(
        freq in arb_freq(),
        by_day in arb_byday(),
        start in arb_date(),
        offset in 0i64..200,
        len in 0i64..120,
    ) {
        let raw = RawRecurrenceInput::Rule(rule_text(freq, &by_day));
        let start_text = start.to_string();
        let rule = normalize_recurrence(&raw, None, Some(&start_text));
        prop_assert!(rule.is_valid());

        let range_start = start.add_days(offset - 100).expect("in range");
        let range_end = range_start.add_days(len).expect("in range");
        let expanded = expand_occurrences_in_range(&rule, range_start, range_end);

        let walked: Vec<CalendarDate> = (0..=len)
            .filter_map(|i| range_start.add_days(i))
            .filter(|d| occurs_on_date_normalized(&rule, *d))
            .collect();
        prop_assert_eq!(&expanded, &walked);

        for pair in expanded.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
        for date in &expanded {
            prop_assert!(*date >= start, "{} occurs before start {}", date, start);
        }
    }

    #[test]
    fn effective_end_is_respected(
        freq in arb_freq(),
        start in arb_date(),
        until_offset in 0i64..90,
        external_offset in 0i64..90,
    ) {
        let until = start.add_days(until_offset).expect("in range");
        let external = start.add_days(external_offset).expect("in range");
        let raw = RawRecurrenceInput::Rule(format!(
            "FREQ={};UNTIL={}",
            freq,
            until.to_string().replace('-', "")
        ));
        let start_text = start.to_string();
        let external_text = external.to_string();
        let rule = normalize_recurrence(&raw, Some(&external_text), Some(&start_text));

        prop_assert_eq!(rule.effective_end_date(), Some(until.min(external)));
        let horizon = start.add_days(120).expect("in range");
        for date in expand_occurrences_in_range(&rule, start, horizon) {
            prop_assert!(date <= until && date <= external);
        }
    }

    #[test]
    fn oversized_spans_are_refused(start in arb_date(), extra in 1i64..400) {
        let raw = RawRecurrenceInput::Rule("FREQ=DAILY".to_string());
        let start_text = start.to_string();
        let rule = normalize_recurrence(&raw, None, Some(&start_text));
        let end = start.add_days(MAX_EXPANSION_DAYS - 1 + extra).expect("in range");
        prop_assert!(expand_occurrences_in_range(&rule, start, end).is_empty());

        let at_limit = start.add_days(MAX_EXPANSION_DAYS - 1).expect("in range");
        prop_assert_eq!(
            expand_occurrences_in_range(&rule, start, at_limit).len() as i64,
            MAX_EXPANSION_DAYS
        );
    }
}

#[test]
fn monthly_on_31st_skips_short_months() {
    let raw = RawRecurrenceInput::Rule("FREQ=MONTHLY;BYMONTHDAY=31".to_string());
    let rule = normalize_recurrence(&raw, None, Some("2026-01-31"));
    let start = CalendarDate::from_ymd(2026, 1, 1).unwrap();
    let end = CalendarDate::from_ymd(2026, 12, 31).unwrap();
    let months: Vec<u32> = expand_occurrences_in_range(&rule, start, end)
        .iter()
        .map(|d| d.month())
        .collect();
    assert_eq!(months, vec![1, 3, 5, 7, 8, 10, 12]);
}

#[test]
fn yearly_leap_day_only_in_leap_years() {
    let raw = RawRecurrenceInput::Rule("FREQ=YEARLY".to_string());
    let rule = normalize_recurrence(&raw, None, Some("2024-02-29"));
    for year in 2024..=2032 {
        let target = CalendarDate::from_ymd(year, 2, 28).unwrap().succ().unwrap();
        let leap = year % 4 == 0;
        assert_eq!(
            occurs_on_date_normalized(&rule, target),
            leap && target.month() == 2,
            "year {}",
            year
        );
    }
}
