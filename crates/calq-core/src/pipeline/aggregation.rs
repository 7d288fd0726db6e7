use crate::date::CalendarDate;
use crate::models::{completion_key, AggregatedItem, CompletionCandidate, TodoCandidate};
use crate::pipeline::decision::{DateDecision, RangeDecision};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Items bucketed by occurrence date, each bucket in display order.
pub type ItemsByDate = BTreeMap<CalendarDate, Vec<AggregatedItem>>;

/// Third pipeline stage: joins decided todos with completions and category
/// fields into view-ready items.
pub struct AggregationService;

impl AggregationService {
    /// One item per passed todo on the decision's date.
    pub fn aggregate_for_date(
        todos: &[TodoCandidate],
        completions: &[CompletionCandidate],
        decision: &DateDecision,
    ) -> Vec<AggregatedItem> {
        let by_key = completions_by_key(completions);
        let mut items: Vec<AggregatedItem> = todos
            .iter()
            .filter(|todo| decision.passed_todo_ids.contains(&todo.id))
            .map(|todo| build_item(todo, decision.date, &by_key))
            .collect();
        items.sort_by(display_order);
        items
    }

    /// One item per passed todo per occurrence date inside the range.
    pub fn aggregate_for_range(
        todos: &[TodoCandidate],
        completions: &[CompletionCandidate],
        decision: &RangeDecision,
    ) -> ItemsByDate {
        let by_key = completions_by_key(completions);
        let mut items_by_date = ItemsByDate::new();

        for todo in todos.iter().filter(|todo| decision.passed_todo_ids.contains(&todo.id)) {
            let Some(dates) = decision.occurrences_by_todo_id.get(&todo.id) else {
                continue;
            };
            for date in dates.iter().filter(|date| decision.range.contains_date(**date)) {
                items_by_date
                    .entry(*date)
                    .or_default()
                    .push(build_item(todo, *date, &by_key));
            }
        }

        for items in items_by_date.values_mut() {
            items.sort_by(display_order);
        }
        items_by_date
    }
}

fn completions_by_key(completions: &[CompletionCandidate]) -> HashMap<&str, &CompletionCandidate> {
    completions.iter().map(|c| (c.key.as_str(), c)).collect()
}

fn build_item(
    todo: &TodoCandidate,
    occurrence_date: CalendarDate,
    completions: &HashMap<&str, &CompletionCandidate>,
) -> AggregatedItem {
    let is_recurring = todo.is_recurring();
    let key = completion_key(todo.id, is_recurring.then_some(occurrence_date));
    let completion_id = completions.get(key.as_str()).map(|c| c.id);

    AggregatedItem {
        todo_id: todo.id,
        title: todo.title.clone(),
        occurrence_date,
        date: todo.date.clone(),
        start_date: todo.start_date.clone(),
        end_date: todo.end_date.clone(),
        start_time: todo.start_time.clone(),
        end_time: todo.end_time.clone(),
        is_all_day: todo.is_all_day,
        is_recurring,
        category_id: todo.category_id,
        category_name: todo.category_name.clone(),
        category_color: todo.category_color.clone(),
        completion_key: key,
        completion_id,
        completed: completion_id.is_some(),
    }
}

/// All-day items first, then by start time, then title.
fn display_order(a: &AggregatedItem, b: &AggregatedItem) -> Ordering {
    b.is_all_day
        .cmp(&a.is_all_day)
        .then_with(|| a.start_time.cmp(&b.start_time))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.todo_id.cmp(&b.todo_id))
}
