use crate::error::CoreError;
use crate::models::{CompletionCandidate, SyncMeta, TodoCandidate};
use crate::repository::{completion_may_touch, todo_may_touch, CandidateFilter, CandidateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// In-process candidate store over plain vectors.
///
/// Applies the same superset predicates as the SQLite store. Counts todo
/// fetches so callers can observe how often the storage layer was hit.
#[derive(Debug)]
pub struct MemoryCandidateStore {
    todos: RwLock<Vec<TodoCandidate>>,
    completions: RwLock<Vec<CompletionCandidate>>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    stale_after: chrono::Duration,
    latency: Option<Duration>,
    fetch_count: AtomicUsize,
}

impl Default for MemoryCandidateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self {
            todos: RwLock::new(Vec::new()),
            completions: RwLock::new(Vec::new()),
            last_sync: RwLock::new(None),
            stale_after: chrono::Duration::hours(24),
            latency: None,
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(todos: Vec<TodoCandidate>, completions: Vec<CompletionCandidate>) -> Self {
        let store = Self::new();
        *store.todos.write() = todos;
        *store.completions.write() = completions;
        store
    }

    /// Delays every todo fetch, which makes overlapping loads observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn upsert_todo(&self, todo: TodoCandidate) {
        let mut todos = self.todos.write();
        match todos.iter_mut().find(|t| t.id == todo.id) {
            Some(existing) => *existing = todo,
            None => todos.push(todo),
        }
    }

    pub fn remove_todo(&self, id: Uuid) {
        self.todos.write().retain(|t| t.id != id);
        self.completions.write().retain(|c| c.todo_id != id);
    }

    /// Inserts a completion, replacing any row with the same key.
    pub fn upsert_completion(&self, completion: CompletionCandidate) {
        let mut completions = self.completions.write();
        completions.retain(|c| c.key != completion.key);
        completions.push(completion);
    }

    pub fn remove_completion(&self, key: &str) {
        self.completions.write().retain(|c| c.key != key);
    }

    pub fn set_last_sync(&self, at: Option<DateTime<Utc>>) {
        *self.last_sync.write() = at;
    }

    /// Number of todo fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn fetch_todos(&self, filter: &CandidateFilter) -> Result<Vec<TodoCandidate>, CoreError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let span = filter.span();
        let todos = self
            .todos
            .read()
            .iter()
            .filter(|todo| todo_may_touch(todo, span))
            .cloned()
            .collect();
        Ok(todos)
    }

    async fn fetch_completions(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CompletionCandidate>, CoreError> {
        let span = filter.span();
        let completions = self
            .completions
            .read()
            .iter()
            .filter(|completion| completion_may_touch(completion, span))
            .cloned()
            .collect();
        Ok(completions)
    }

    async fn sync_meta(&self) -> Result<SyncMeta, CoreError> {
        Ok(SyncMeta::evaluate(*self.last_sync.read(), self.stale_after, Utc::now()))
    }

    fn source_tag(&self) -> &str {
        "memory"
    }
}
