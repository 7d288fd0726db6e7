#![allow(dead_code)]

use calq_core::date::CalendarDate;
use calq_core::db::{establish_connection, DbPool};
use calq_core::models::{CompletionCandidate, TodoCandidate};
use calq_core::repository::SqliteCandidateStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Helper function to create a test database
pub async fn setup_test_db() -> (Arc<SqliteCandidateStore>, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("calendar.db");

    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    (Arc::new(SqliteCandidateStore::new(pool)), temp_dir)
}

pub fn d(s: &str) -> CalendarDate {
    CalendarDate::parse(s).expect("test date should parse")
}

pub fn single_todo(title: &str, date: &str) -> TodoCandidate {
    TodoCandidate {
        title: title.to_string(),
        date: Some(date.to_string()),
        ..Default::default()
    }
}

pub fn period_todo(title: &str, start: &str, end: &str) -> TodoCandidate {
    TodoCandidate {
        title: title.to_string(),
        start_date: Some(start.to_string()),
        end_date: Some(end.to_string()),
        ..Default::default()
    }
}

pub fn recurring_todo(title: &str, anchor: &str, rule: &str) -> TodoCandidate {
    TodoCandidate {
        title: title.to_string(),
        date: Some(anchor.to_string()),
        recurrence: Some(rule.to_string()),
        ..Default::default()
    }
}

pub async fn insert_category(pool: &DbPool, name: &str, color: &str) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO categories (id, name, color) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(color)
        .execute(pool)
        .await
        .expect("Failed to insert category");
    id
}

pub async fn insert_todo(pool: &DbPool, todo: &TodoCandidate) {
    sqlx::query(
        r#"
        INSERT INTO todos (
            id, title, date, start_date, end_date, start_time, end_time,
            is_all_day, recurrence, recurrence_end_date, category_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(todo.id)
    .bind(&todo.title)
    .bind(&todo.date)
    .bind(&todo.start_date)
    .bind(&todo.end_date)
    .bind(&todo.start_time)
    .bind(&todo.end_time)
    .bind(todo.is_all_day)
    .bind(&todo.recurrence)
    .bind(&todo.recurrence_end_date)
    .bind(todo.category_id)
    .execute(pool)
    .await
    .expect("Failed to insert todo");
}

pub async fn insert_completion(pool: &DbPool, completion: &CompletionCandidate) {
    sqlx::query("INSERT INTO completions (id, key, todo_id, date) VALUES (?, ?, ?, ?)")
        .bind(completion.id)
        .bind(&completion.key)
        .bind(completion.todo_id)
        .bind(&completion.date)
        .execute(pool)
        .await
        .expect("Failed to insert completion");
}

pub async fn delete_completion(pool: &DbPool, key: &str) {
    sqlx::query("DELETE FROM completions WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await
        .expect("Failed to delete completion");
}

pub async fn set_last_sync(pool: &DbPool, at: DateTime<Utc>) {
    sqlx::query(
        "INSERT INTO sync_state (id, last_sync_time) VALUES (1, ?) \
         ON CONFLICT(id) DO UPDATE SET last_sync_time = excluded.last_sync_time",
    )
    .bind(at)
    .execute(pool)
    .await
    .expect("Failed to record sync time");
}
