//! Property-based tests for the interval algebra used by the range cache.

use calq_core::date::{CalendarDate, DateRange};
use calq_core::interval::{
    compute_uncovered_ranges, is_fully_covered, merge_ranges, split_range_by_invalidation,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn base() -> CalendarDate {
    CalendarDate::from_ymd(2026, 1, 1).expect("base date is valid")
}

/// Ranges inside a ~4 month window so overlaps and adjacency are common.
fn arb_range() -> impl Strategy<Value = DateRange> {
    (0i64..120, 0i64..30).prop_map(|(offset, len)| {
        let start = base().add_days(offset).expect("offset stays in range");
        let end = start.add_days(len).expect("length stays in range");
        DateRange::new(start, end).expect("start precedes end")
    })
}

fn days_of(ranges: &[DateRange]) -> BTreeSet<CalendarDate> {
    ranges.iter().flat_map(|r| r.days()).collect()
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
    fn merge_is_idempotent(ranges in prop::collection::vec(arb_range(), 0..12)) {
        let once = merge_ranges(ranges);
        let twice = merge_ranges(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_ignores_input_order(ranges in prop::collection::vec(arb_range(), 0..12)) {
        let mut reversed = ranges.clone();
        reversed.reverse();
        prop_assert_eq!(merge_ranges(ranges), merge_ranges(reversed));
    }

    #[test]
    fn merge_preserves_days_and_separates_output(ranges in prop::collection::vec(arb_range(), 0..12)) {
        let merged = merge_ranges(ranges.clone());
        prop_assert_eq!(days_of(&merged), days_of(&ranges));
        for pair in merged.windows(2) {
            prop_assert!(!pair[0].touches(&pair[1]), "{} touches {}", pair[0], pair[1]);
            prop_assert!(pair[0].end() < pair[1].start());
        }
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn uncovered_is_exact_complement(
        target in arb_range(),
        covered in prop::collection::vec(arb_range(), 0..8),
    ) {
        let gaps = compute_uncovered_ranges(target, &covered);
        let covered_days = days_of(&covered);
        let expected: BTreeSet<CalendarDate> =
            target.days().filter(|d| !covered_days.contains(d)).collect();

        prop_assert_eq!(days_of(&gaps), expected);
        for gap in &gaps {
            prop_assert!(target.contains(gap));
        }
        prop_assert_eq!(merge_ranges(gaps.clone()), gaps);
    }

    #[test]
    fn target_plus_gaps_is_fully_covered(
        target in arb_range(),
        covered in prop::collection::vec(arb_range(), 0..8),
    ) {
        let mut all = covered.clone();
        all.extend(compute_uncovered_ranges(target, &covered));
        prop_assert!(is_fully_covered(target, &all));
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn split_removes_exactly_the_invalidated_days(source in arb_range(), hole in arb_range()) {
        let pieces = split_range_by_invalidation(source, hole);
        let expected: BTreeSet<CalendarDate> =
            source.days().filter(|d| !hole.contains_date(*d)).collect();

        prop_assert_eq!(days_of(&pieces), expected);
        prop_assert!(pieces.len() <= 2);
        for piece in &pieces {
            prop_assert!(source.contains(piece));
            prop_assert!(!piece.overlaps(&hole));
        }
    }
}
