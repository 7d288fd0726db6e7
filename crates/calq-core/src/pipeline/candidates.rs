use crate::date::{CalendarDate, DateRange};
use crate::error::QueryError;
use crate::models::{CompletionCandidate, SyncMeta, TodoCandidate};
use crate::repository::{CandidateFilter, CandidateStore};
use std::sync::Arc;

/// Rows that might matter for one date or range, plus data freshness.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub filter: CandidateFilter,
    pub todos: Vec<TodoCandidate>,
    pub completions: Vec<CompletionCandidate>,
    pub meta: SyncMeta,
}

/// First pipeline stage: validates the requested date or range and pulls
/// candidate rows from the storage collaborator. No recurrence logic here.
pub struct CandidateQueryService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: CandidateStore + ?Sized> CandidateQueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn fetch_for_date(&self, date: &str) -> Result<CandidateSet, QueryError> {
        let date: CalendarDate = date.parse()?;
        self.fetch(CandidateFilter::OnDate(date)).await
    }

    pub async fn fetch_for_range(&self, start: &str, end: &str) -> Result<CandidateSet, QueryError> {
        let range = DateRange::parse(start, end)?;
        self.fetch(CandidateFilter::InRange(range)).await
    }

    /// Storage failures come back as [`QueryError::Storage`].
    pub async fn fetch(&self, filter: CandidateFilter) -> Result<CandidateSet, QueryError> {
        let (todos, completions) = futures::try_join!(
            self.store.fetch_todos(&filter),
            self.store.fetch_completions(&filter),
        )
        .map_err(|err| {
            tracing::warn!(?filter, %err, "candidate fetch failed");
            QueryError::from(err)
        })?;

        let meta = match self.store.sync_meta().await {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(%err, "sync metadata unavailable");
                SyncMeta::default()
            }
        };

        tracing::debug!(
            ?filter,
            todos = todos.len(),
            completions = completions.len(),
            stale = meta.is_stale,
            "fetched candidates"
        );

        Ok(CandidateSet {
            filter,
            todos,
            completions,
            meta,
        })
    }
}
