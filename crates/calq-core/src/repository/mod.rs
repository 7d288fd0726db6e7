use crate::date::{CalendarDate, DateRange};
use crate::error::CoreError;
use crate::models::{CompletionCandidate, SyncMeta, TodoCandidate};
use async_trait::async_trait;

pub mod memory;
pub mod query_builder;
pub mod sqlite;

pub use memory::MemoryCandidateStore;
pub use sqlite::SqliteCandidateStore;

/// Date or range a candidate fetch is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFilter {
    OnDate(CalendarDate),
    InRange(DateRange),
}

impl CandidateFilter {
    /// The inclusive span the filter touches.
    pub fn span(&self) -> DateRange {
        match self {
            CandidateFilter::OnDate(date) => DateRange::single(*date),
            CandidateFilter::InRange(range) => *range,
        }
    }
}

/// Contract toward the row storage engine.
///
/// Fetches must return a superset of the rows that can produce an occurrence
/// inside the filter's span: false positives are fine, false negatives are
/// not. Whether a todo actually occurs is decided downstream.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Todos whose single date, period or potential recurrence window
    /// intersects the filter.
    async fn fetch_todos(&self, filter: &CandidateFilter) -> Result<Vec<TodoCandidate>, CoreError>;

    /// Completions dated inside the filter plus every date-less completion.
    async fn fetch_completions(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CompletionCandidate>, CoreError>;

    async fn sync_meta(&self) -> Result<SyncMeta, CoreError>;

    /// Label stamped on cache entries loaded from this store.
    fn source_tag(&self) -> &str;
}

/// Superset predicate shared by in-process stores.
pub(crate) fn todo_may_touch(todo: &TodoCandidate, span: DateRange) -> bool {
    use crate::date::normalize_date_only_string as parse;

    if todo.is_recurring() {
        let anchor = todo.recurrence_anchor().and_then(parse);
        let end = todo.recurrence_end_date.as_deref().and_then(parse);
        return anchor.map_or(true, |a| a <= span.end()) && end.map_or(true, |e| e >= span.start());
    }

    let on_single = todo.single_date().is_some_and(|d| span.contains_date(d));
    let on_period = todo
        .period()
        .and_then(|(start, end)| DateRange::new(start, end))
        .is_some_and(|period| period.overlaps(&span));
    on_single || on_period
}

pub(crate) fn completion_may_touch(completion: &CompletionCandidate, span: DateRange) -> bool {
    match completion.date.as_deref() {
        None => true,
        Some(raw) => crate::date::normalize_date_only_string(raw).is_some_and(|d| span.contains_date(d)),
    }
}
