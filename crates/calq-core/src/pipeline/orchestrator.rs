use crate::date::{CalendarDate, DateRange};
use crate::error::{QueryError, Stage};
use crate::models::{AggregatedItem, SyncMeta};
use crate::pipeline::aggregation::{AggregationService, ItemsByDate};
use crate::pipeline::candidates::{CandidateQueryService, CandidateSet};
use crate::pipeline::decision::OccurrenceDecisionService;
use crate::repository::{CandidateFilter, CandidateStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rows flowing out of each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub candidate_todos: usize,
    pub candidate_completions: usize,
    pub decided: usize,
    pub aggregated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    pub candidate: Duration,
    pub decision: Duration,
    pub aggregation: Duration,
    pub total: Duration,
}

/// Diagnostics recorded for one pipeline run, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub counts: StageCounts,
    pub timings: StageTimings,
    pub failed_stage: Option<Stage>,
    pub invalid_recurrences: usize,
    pub meta: Option<SyncMeta>,
}

/// Outcome of a pipeline run. `result` is never partially filled: a failed
/// stage leaves only the stats behind.
#[derive(Debug, Clone)]
pub struct QueryReport<T> {
    pub result: Result<T, QueryError>,
    pub stats: PipelineStats,
}

impl<T> QueryReport<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, QueryError> {
        self.result
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateQueryOutput {
    pub date: CalendarDate,
    pub items: Vec<AggregatedItem>,
    pub meta: SyncMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeQueryOutput {
    pub range: DateRange,
    pub items_by_date: ItemsByDate,
    pub meta: SyncMeta,
}

/// Runs candidate, decision and aggregation stages in order for one date or
/// one range, stopping at the first failure.
pub struct QueryOrchestrator<S: ?Sized> {
    candidates: CandidateQueryService<S>,
}

impl<S: CandidateStore + ?Sized> QueryOrchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            candidates: CandidateQueryService::new(store),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.candidates.store()
    }

    pub async fn run_query_for_date(&self, date: &str) -> QueryReport<DateQueryOutput> {
        let started = Instant::now();
        let fetched = self.candidates.fetch_for_date(date).await;
        Self::finish_date(fetched, started)
    }

    pub async fn run_query_for_range(&self, start: &str, end: &str) -> QueryReport<RangeQueryOutput> {
        let started = Instant::now();
        let fetched = self.candidates.fetch_for_range(start, end).await;
        Self::finish_range(fetched, started)
    }

    pub async fn query_date(&self, date: CalendarDate) -> QueryReport<DateQueryOutput> {
        let started = Instant::now();
        let fetched = self.candidates.fetch(CandidateFilter::OnDate(date)).await;
        Self::finish_date(fetched, started)
    }

    pub async fn query_range(&self, range: DateRange) -> QueryReport<RangeQueryOutput> {
        let started = Instant::now();
        let fetched = self.candidates.fetch(CandidateFilter::InRange(range)).await;
        Self::finish_range(fetched, started)
    }

    fn finish_date(fetched: Result<CandidateSet, QueryError>, started: Instant) -> QueryReport<DateQueryOutput> {
        let mut stats = PipelineStats::default();
        stats.timings.candidate = started.elapsed();

        let set = match fetched {
            Ok(set) => set,
            Err(err) => return Self::failed(err, stats, started),
        };
        let date = set.filter.span().start();
        record_candidates(&mut stats, &set);

        let stage = Instant::now();
        let decision = OccurrenceDecisionService::decide_for_date(&set.todos, date);
        stats.timings.decision = stage.elapsed();
        stats.counts.decided = decision.passed_todo_ids.len();
        stats.invalid_recurrences = decision.invalid_recurrence_count();

        let stage = Instant::now();
        let items = AggregationService::aggregate_for_date(&set.todos, &set.completions, &decision);
        stats.timings.aggregation = stage.elapsed();
        stats.counts.aggregated = items.len();
        stats.timings.total = started.elapsed();

        tracing::debug!(%date, counts = ?stats.counts, total = ?stats.timings.total, "date query finished");
        QueryReport {
            result: Ok(DateQueryOutput {
                date,
                items,
                meta: set.meta,
            }),
            stats,
        }
    }

    fn finish_range(fetched: Result<CandidateSet, QueryError>, started: Instant) -> QueryReport<RangeQueryOutput> {
        let mut stats = PipelineStats::default();
        stats.timings.candidate = started.elapsed();

        let set = match fetched {
            Ok(set) => set,
            Err(err) => return Self::failed(err, stats, started),
        };
        let range = set.filter.span();
        record_candidates(&mut stats, &set);

        let stage = Instant::now();
        let decision = OccurrenceDecisionService::decide_for_range(&set.todos, range);
        stats.timings.decision = stage.elapsed();
        stats.counts.decided = decision.passed_todo_ids.len();
        stats.invalid_recurrences = decision.invalid_recurrence_count();

        let stage = Instant::now();
        let items_by_date = AggregationService::aggregate_for_range(&set.todos, &set.completions, &decision);
        stats.timings.aggregation = stage.elapsed();
        stats.counts.aggregated = items_by_date.values().map(Vec::len).sum();
        stats.timings.total = started.elapsed();

        tracing::debug!(%range, counts = ?stats.counts, total = ?stats.timings.total, "range query finished");
        QueryReport {
            result: Ok(RangeQueryOutput {
                range,
                items_by_date,
                meta: set.meta,
            }),
            stats,
        }
    }

    /// Only the candidate stage can fail: decision and aggregation work on
    /// already-typed rows.
    fn failed<T>(err: QueryError, mut stats: PipelineStats, started: Instant) -> QueryReport<T> {
        let stage = Stage::Candidate;
        stats.failed_stage = Some(stage);
        stats.timings.total = started.elapsed();
        tracing::warn!(%stage, %err, "query pipeline failed");
        QueryReport {
            result: Err(err),
            stats,
        }
    }
}

fn record_candidates(stats: &mut PipelineStats, set: &CandidateSet) {
    stats.counts.candidate_todos = set.todos.len();
    stats.counts.candidate_completions = set.completions.len();
    stats.meta = Some(set.meta.clone());
}
