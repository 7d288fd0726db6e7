use crate::config::{Config, StorageConfig};
use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{CompletionCandidate, SyncMeta, TodoCandidate};
use crate::repository::query_builder::SqlCandidateBuilder;
use crate::repository::{CandidateFilter, CandidateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// SQLite implementation of the candidate store
pub struct SqliteCandidateStore {
    pool: DbPool,
    stale_after: chrono::Duration,
    source_tag: String,
}

impl SqliteCandidateStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_config(pool, &StorageConfig::default(), "sqlite")
    }

    /// Store configured from a loaded [`Config`], tagged with the cache's
    /// source tag.
    pub fn from_config(pool: DbPool, config: &Config) -> Self {
        Self::with_config(pool, &config.storage, config.cache.source_tag.clone())
    }

    /// Out-of-range staleness hours saturate; [`Config::validate`] reports them.
    pub fn with_config(pool: DbPool, config: &StorageConfig, source_tag: impl Into<String>) -> Self {
        Self {
            pool,
            stale_after: config.stale_after().unwrap_or_else(|| {
                if config.stale_after_hours < 0 {
                    chrono::Duration::zero()
                } else {
                    chrono::Duration::MAX
                }
            }),
            source_tag: source_tag.into(),
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl CandidateStore for SqliteCandidateStore {
    async fn fetch_todos(&self, filter: &CandidateFilter) -> Result<Vec<TodoCandidate>, CoreError> {
        let mut query_builder = SqlCandidateBuilder::todo_query(filter);
        let todos = query_builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(todos)
    }

    async fn fetch_completions(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CompletionCandidate>, CoreError> {
        let mut query_builder = SqlCandidateBuilder::completion_query(filter);
        let completions = query_builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(completions)
    }

    async fn sync_meta(&self) -> Result<SyncMeta, CoreError> {
        let last_sync: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT last_sync_time FROM sync_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(SyncMeta::evaluate(last_sync.flatten(), self.stale_after, Utc::now()))
    }

    fn source_tag(&self) -> &str {
        &self.source_tag
    }
}
