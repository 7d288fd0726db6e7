use crate::date::{CalendarDate, DateRange};
use crate::models::TodoCandidate;
use crate::recurrence::{
    clamped_span_days, expand_occurrences_in_range, normalize_recurrence, occurs_on_date_normalized,
    NormalizedRecurrenceRule, MAX_EXPANSION_DAYS,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Why a todo was kept or dropped by the decision stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Single date equals the target (or lies inside the range).
    Single,
    /// Period covers the target (or intersects the range).
    Period,
    /// Valid recurrence occurs on the target (or inside the range).
    Recurring,
    /// Nothing lands on the target.
    Excluded,
    /// Recurrence rule could not be normalized; the todo is excluded.
    InvalidRecurrence,
    /// Clamped span exceeded the expansion guard; the todo is excluded.
    ExpansionRefused,
}

impl DecisionReason {
    pub fn passed(&self) -> bool {
        matches!(
            self,
            DecisionReason::Single | DecisionReason::Period | DecisionReason::Recurring
        )
    }
}

/// Decision for a single target date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateDecision {
    pub date: CalendarDate,
    pub passed_todo_ids: HashSet<Uuid>,
    pub reasons_by_todo_id: HashMap<Uuid, DecisionReason>,
}

impl DateDecision {
    pub fn invalid_recurrence_count(&self) -> usize {
        count_reason(&self.reasons_by_todo_id, DecisionReason::InvalidRecurrence)
    }
}

/// Decision for a date range, with the concrete occurrence dates per todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDecision {
    pub range: DateRange,
    pub passed_todo_ids: HashSet<Uuid>,
    pub reasons_by_todo_id: HashMap<Uuid, DecisionReason>,
    /// Ascending dates inside the range; only present for passed todos.
    pub occurrences_by_todo_id: HashMap<Uuid, Vec<CalendarDate>>,
}

impl RangeDecision {
    pub fn invalid_recurrence_count(&self) -> usize {
        count_reason(&self.reasons_by_todo_id, DecisionReason::InvalidRecurrence)
    }
}

fn count_reason(reasons: &HashMap<Uuid, DecisionReason>, wanted: DecisionReason) -> usize {
    reasons.values().filter(|reason| **reason == wanted).count()
}

/// Second pipeline stage: decides which candidates actually occur.
///
/// Pure computation over the rows handed in; never touches storage.
pub struct OccurrenceDecisionService;

impl OccurrenceDecisionService {
    /// Normalizes a todo's recurrence against its own anchor and end date.
    pub fn rule_for(todo: &TodoCandidate) -> NormalizedRecurrenceRule {
        normalize_recurrence(
            &todo.recurrence_input(),
            todo.recurrence_end_date.as_deref(),
            todo.recurrence_anchor(),
        )
    }

    pub fn decide_for_date(todos: &[TodoCandidate], date: CalendarDate) -> DateDecision {
        let mut decision = DateDecision {
            date,
            passed_todo_ids: HashSet::new(),
            reasons_by_todo_id: HashMap::with_capacity(todos.len()),
        };

        for todo in todos {
            let reason = Self::reason_on_date(todo, date);
            if reason.passed() {
                decision.passed_todo_ids.insert(todo.id);
            }
            decision.reasons_by_todo_id.insert(todo.id, reason);
        }
        decision
    }

    pub fn decide_for_range(todos: &[TodoCandidate], range: DateRange) -> RangeDecision {
        let mut decision = RangeDecision {
            range,
            passed_todo_ids: HashSet::new(),
            reasons_by_todo_id: HashMap::with_capacity(todos.len()),
            occurrences_by_todo_id: HashMap::new(),
        };

        for todo in todos {
            let (reason, occurrences) = Self::occurrences_in_range(todo, range);
            if reason.passed() {
                decision.passed_todo_ids.insert(todo.id);
                decision.occurrences_by_todo_id.insert(todo.id, occurrences);
            }
            decision.reasons_by_todo_id.insert(todo.id, reason);
        }
        decision
    }

    fn reason_on_date(todo: &TodoCandidate, date: CalendarDate) -> DecisionReason {
        if todo.is_recurring() {
            let rule = Self::rule_for(todo);
            if !rule.is_valid() {
                warn_invalid(todo, &rule);
                return DecisionReason::InvalidRecurrence;
            }
            return if occurs_on_date_normalized(&rule, date) {
                DecisionReason::Recurring
            } else {
                DecisionReason::Excluded
            };
        }

        if todo.single_date() == Some(date) {
            DecisionReason::Single
        } else if todo
            .period()
            .is_some_and(|(start, end)| start <= date && date <= end)
        {
            DecisionReason::Period
        } else {
            DecisionReason::Excluded
        }
    }

    fn occurrences_in_range(todo: &TodoCandidate, range: DateRange) -> (DecisionReason, Vec<CalendarDate>) {
        if todo.is_recurring() {
            let rule = Self::rule_for(todo);
            if !rule.is_valid() {
                warn_invalid(todo, &rule);
                return (DecisionReason::InvalidRecurrence, Vec::new());
            }
            if clamped_span_days(&rule, range.start(), range.end())
                .is_some_and(|span| span > MAX_EXPANSION_DAYS)
            {
                tracing::warn!(todo_id = %todo.id, %range, "recurrence expansion refused");
                return (DecisionReason::ExpansionRefused, Vec::new());
            }
            let occurrences = expand_occurrences_in_range(&rule, range.start(), range.end());
            return if occurrences.is_empty() {
                (DecisionReason::Excluded, occurrences)
            } else {
                (DecisionReason::Recurring, occurrences)
            };
        }

        if let Some(date) = todo.single_date().filter(|d| range.contains_date(*d)) {
            return (DecisionReason::Single, vec![date]);
        }
        let overlap = todo
            .period()
            .and_then(|(start, end)| DateRange::new(start, end))
            .and_then(|period| period.intersect(&range));
        match overlap {
            Some(overlap) => (DecisionReason::Period, overlap.days().collect()),
            None => (DecisionReason::Excluded, Vec::new()),
        }
    }
}

fn warn_invalid(todo: &TodoCandidate, rule: &NormalizedRecurrenceRule) {
    tracing::warn!(
        todo_id = %todo.id,
        raw = ?todo.recurrence,
        errors = ?rule.errors(),
        "excluding todo with invalid recurrence"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn d(s: &str) -> CalendarDate {
        CalendarDate::parse(s).unwrap()
    }

    fn single(date: &str) -> TodoCandidate {
        TodoCandidate {
            title: "single".to_string(),
            date: Some(date.to_string()),
            ..Default::default()
        }
    }

    fn period(start: &str, end: Option<&str>) -> TodoCandidate {
        TodoCandidate {
            title: "period".to_string(),
            start_date: Some(start.to_string()),
            end_date: end.map(str::to_string),
            ..Default::default()
        }
    }

    fn recurring(rule: &str, anchor: &str) -> TodoCandidate {
        TodoCandidate {
            title: "recurring".to_string(),
            date: Some(anchor.to_string()),
            recurrence: Some(rule.to_string()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("2026-03-10", DecisionReason::Single)]
    #[case("2026-03-11", DecisionReason::Excluded)]
    fn test_single_date(#[case] target: &str, #[case] expected: DecisionReason) {
        let todo = single("2026-03-10");
        let decision = OccurrenceDecisionService::decide_for_date(&[todo.clone()], d(target));
        assert_eq!(decision.reasons_by_todo_id[&todo.id], expected);
        assert_eq!(decision.passed_todo_ids.contains(&todo.id), expected.passed());
    }

    #[rstest]
    #[case("2026-03-01", true)]
    #[case("2026-03-03", true)]
    #[case("2026-03-04", false)]
    fn test_period_membership(#[case] target: &str, #[case] passes: bool) {
        let todo = period("2026-03-01", Some("2026-03-03"));
        let decision = OccurrenceDecisionService::decide_for_date(&[todo.clone()], d(target));
        assert_eq!(decision.passed_todo_ids.contains(&todo.id), passes);
    }

    #[test]
    fn test_period_without_end_is_one_day() {
        let todo = period("2026-03-01", None);
        let decision =
            OccurrenceDecisionService::decide_for_range(&[todo.clone()], DateRange::parse("2026-02-01", "2026-03-31").unwrap());
        assert_eq!(decision.occurrences_by_todo_id[&todo.id], vec![d("2026-03-01")]);
    }

    #[test]
    fn test_period_range_uses_intersection() {
        let todo = period("2026-02-27", Some("2026-03-02"));
        let range = DateRange::parse("2026-03-01", "2026-03-31").unwrap();
        let decision = OccurrenceDecisionService::decide_for_range(&[todo.clone()], range);
        assert_eq!(decision.reasons_by_todo_id[&todo.id], DecisionReason::Period);
        assert_eq!(
            decision.occurrences_by_todo_id[&todo.id],
            vec![d("2026-03-01"), d("2026-03-02")]
        );
    }

    #[test]
    fn test_invalid_recurrence_is_excluded_and_counted() {
        let broken = recurring("FREQ=SOMETIMES", "2026-03-01");
        let fine = single("2026-03-01");
        let decision =
            OccurrenceDecisionService::decide_for_date(&[broken.clone(), fine.clone()], d("2026-03-01"));
        assert_eq!(decision.reasons_by_todo_id[&broken.id], DecisionReason::InvalidRecurrence);
        assert!(decision.passed_todo_ids.contains(&fine.id));
        assert_eq!(decision.invalid_recurrence_count(), 1);
    }

    #[test]
    fn test_weekly_range_occurrences() {
        let todo = recurring("FREQ=WEEKLY;BYDAY=MO,WE", "2026-03-02");
        let range = DateRange::parse("2026-03-01", "2026-03-14").unwrap();
        let decision = OccurrenceDecisionService::decide_for_range(&[todo.clone()], range);
        assert_eq!(
            decision.occurrences_by_todo_id[&todo.id],
            vec![d("2026-03-02"), d("2026-03-04"), d("2026-03-09"), d("2026-03-11")]
        );
    }

    #[test]
    fn test_recurrence_outside_range_is_excluded() {
        let todo = TodoCandidate {
            recurrence_end_date: Some("2026-01-31".to_string()),
            ..recurring("FREQ=DAILY", "2026-01-01")
        };
        let range = DateRange::parse("2026-03-01", "2026-03-31").unwrap();
        let decision = OccurrenceDecisionService::decide_for_range(&[todo.clone()], range);
        assert_eq!(decision.reasons_by_todo_id[&todo.id], DecisionReason::Excluded);
        assert!(!decision.occurrences_by_todo_id.contains_key(&todo.id));
    }

    #[test]
    fn test_oversized_range_refuses_expansion() {
        let todo = recurring("FREQ=DAILY", "2026-01-01");
        let range = DateRange::parse("2026-01-01", "2027-06-30").unwrap();
        let decision = OccurrenceDecisionService::decide_for_range(&[todo.clone()], range);
        assert_eq!(decision.reasons_by_todo_id[&todo.id], DecisionReason::ExpansionRefused);
        assert!(decision.passed_todo_ids.is_empty());
    }

    #[test]
    fn test_recurrence_uses_start_date_as_anchor() {
        let todo = TodoCandidate {
            start_date: Some("2026-03-10".to_string()),
            ..recurring("FREQ=DAILY", "2026-03-01")
        };
        let before = OccurrenceDecisionService::decide_for_date(&[todo.clone()], d("2026-03-05"));
        assert_eq!(before.reasons_by_todo_id[&todo.id], DecisionReason::Excluded);
        let after = OccurrenceDecisionService::decide_for_date(&[todo.clone()], d("2026-03-10"));
        assert_eq!(after.reasons_by_todo_id[&todo.id], DecisionReason::Recurring);
    }
}
