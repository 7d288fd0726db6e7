//! Interval algebra over inclusive [`DateRange`]s.
//!
//! Adjacent ranges (`a.end + 1 == b.start`) are treated as one span by
//! [`merge_ranges`]; every other function works on exact day boundaries.

use crate::date::DateRange;

/// Sorts and coalesces ranges; overlapping and adjacent inputs become one.
///
/// The result is ordered, non-overlapping and non-adjacent, so the operation
/// is idempotent and independent of input order.
pub fn merge_ranges(ranges: impl IntoIterator<Item = DateRange>) -> Vec<DateRange> {
    let mut sorted: Vec<DateRange> = ranges.into_iter().collect();
    sorted.sort();

    let mut merged: Vec<DateRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if last.touches(&range) => *last = last.hull(&range),
            _ => merged.push(range),
        }
    }
    merged
}

/// Returns the maximal gaps of `target` not covered by `covered`.
///
/// Walks the merged coverage left to right and emits the gap before, between
/// and after the covered intervals that intersect `target`.
pub fn compute_uncovered_ranges(target: DateRange, covered: &[DateRange]) -> Vec<DateRange> {
    let mut gaps = Vec::new();
    let mut cursor = Some(target.start());

    for range in merge_ranges(covered.iter().copied()) {
        let Some(from) = cursor else { break };
        if range.end() < from {
            continue;
        }
        if range.start() > target.end() {
            break;
        }
        if range.start() > from {
            if let Some(gap_end) = range.start().pred() {
                if let Some(gap) = DateRange::new(from, gap_end.min(target.end())) {
                    gaps.push(gap);
                }
            }
        }
        cursor = range.end().succ();
    }

    if let Some(from) = cursor {
        if let Some(gap) = DateRange::new(from, target.end()) {
            gaps.push(gap);
        }
    }
    gaps
}

/// Pieces of `source` that survive removing `invalidated`.
///
/// Disjoint input comes back unchanged, a source fully inside the invalidation
/// vanishes, and a hole in the middle leaves two pieces.
pub fn split_range_by_invalidation(source: DateRange, invalidated: DateRange) -> Vec<DateRange> {
    if !source.overlaps(&invalidated) {
        return vec![source];
    }

    let mut survivors = Vec::with_capacity(2);
    if source.start() < invalidated.start() {
        if let Some(left) = invalidated
            .start()
            .pred()
            .and_then(|end| DateRange::new(source.start(), end))
        {
            survivors.push(left);
        }
    }
    if invalidated.end() < source.end() {
        if let Some(right) = invalidated
            .end()
            .succ()
            .and_then(|start| DateRange::new(start, source.end()))
        {
            survivors.push(right);
        }
    }
    survivors
}

/// Intersection used by retention pruning; `None` when nothing is kept.
pub fn clip_range(source: DateRange, keep: DateRange) -> Option<DateRange> {
    source.intersect(&keep)
}

/// Cuts `range` into consecutive pieces of at most `max_days` days.
///
/// A non-positive `max_days` leaves the range whole.
pub fn chunk_range(range: DateRange, max_days: i64) -> Vec<DateRange> {
    if max_days <= 0 {
        return vec![range];
    }
    let mut pieces = Vec::new();
    let mut from = Some(range.start());
    while let Some(start) = from.filter(|start| *start <= range.end()) {
        let end = start
            .add_days(max_days - 1)
            .map_or(range.end(), |end| end.min(range.end()));
        let Some(piece) = DateRange::new(start, end) else { break };
        pieces.push(piece);
        from = end.succ();
    }
    pieces
}

/// True when the union of `covered` contains every day of `target`.
pub fn is_fully_covered(target: DateRange, covered: &[DateRange]) -> bool {
    compute_uncovered_ranges(target, covered).is_empty()
}
