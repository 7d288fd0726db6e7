use crate::date::{normalize_date_only_string, CalendarDate};
use crate::recurrence::RawRecurrenceInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Idempotency key of a completion: `{todo_id}_{date}` or `{todo_id}_null`.
///
/// Recurring todos complete per occurrence date; non-recurring todos share a
/// single date-less completion.
pub fn completion_key(todo_id: Uuid, date: Option<CalendarDate>) -> String {
    match date {
        Some(date) => format!("{}_{}", todo_id, date),
        None => format!("{}_null", todo_id),
    }
}

/// Todo row snapshot as returned by the storage collaborator.
///
/// Date columns are kept as raw text; they are only trusted after passing
/// through [`normalize_date_only_string`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TodoCandidate {
    pub id: Uuid,
    pub title: String,
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_all_day: bool,
    pub recurrence: Option<String>,
    pub recurrence_end_date: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
}

impl Default for TodoCandidate {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            title: String::new(),
            date: None,
            start_date: None,
            end_date: None,
            start_time: None,
            end_time: None,
            is_all_day: true,
            recurrence: None,
            recurrence_end_date: None,
            category_id: None,
            category_name: None,
            category_color: None,
        }
    }
}

impl TodoCandidate {
    pub fn recurrence_input(&self) -> RawRecurrenceInput {
        RawRecurrenceInput::from_column(self.recurrence.as_deref())
    }

    pub fn is_recurring(&self) -> bool {
        !self.recurrence_input().is_absent()
    }

    /// Anchor date of a recurrence: the period start, else the single date.
    pub fn recurrence_anchor(&self) -> Option<&str> {
        self.start_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.date.as_deref())
    }

    pub fn single_date(&self) -> Option<CalendarDate> {
        self.date.as_deref().and_then(normalize_date_only_string)
    }

    /// Period span; a missing or broken end collapses to the start day.
    pub fn period(&self) -> Option<(CalendarDate, CalendarDate)> {
        let start = self.start_date.as_deref().and_then(normalize_date_only_string)?;
        let end = self
            .end_date
            .as_deref()
            .and_then(normalize_date_only_string)
            .filter(|end| *end >= start)
            .unwrap_or(start);
        Some((start, end))
    }
}

/// Completion row snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CompletionCandidate {
    pub id: Uuid,
    pub key: String,
    pub todo_id: Uuid,
    pub date: Option<String>,
}

impl CompletionCandidate {
    pub fn new(todo_id: Uuid, date: Option<CalendarDate>) -> Self {
        Self {
            id: Uuid::now_v7(),
            key: completion_key(todo_id, date),
            todo_id,
            date: date.map(|d| d.to_string()),
        }
    }
}

/// Freshness of the local data set as reported by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SyncMeta {
    pub is_stale: bool,
    pub stale_reason: Option<StaleReason>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    NeverSynced,
    SyncOlderThanThreshold,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::NeverSynced => write!(f, "never_synced"),
            StaleReason::SyncOlderThanThreshold => write!(f, "sync_older_than_threshold"),
        }
    }
}

impl SyncMeta {
    /// Classifies a last-sync timestamp against a staleness threshold.
    pub fn evaluate(last_sync_time: Option<DateTime<Utc>>, stale_after: chrono::Duration, now: DateTime<Utc>) -> Self {
        let stale_reason = match last_sync_time {
            None => Some(StaleReason::NeverSynced),
            Some(at) if now - at > stale_after => Some(StaleReason::SyncOlderThanThreshold),
            Some(_) => None,
        };
        Self {
            is_stale: stale_reason.is_some(),
            stale_reason,
            last_sync_time,
        }
    }
}

/// View-ready row: one todo on one occurrence date, joined with its
/// completion and category display fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedItem {
    pub todo_id: Uuid,
    pub title: String,
    pub occurrence_date: CalendarDate,
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_all_day: bool,
    pub is_recurring: bool,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
    pub completion_key: String,
    pub completion_id: Option<Uuid>,
    pub completed: bool,
}
