use crate::date::DateRange;
use crate::repository::CandidateFilter;
use sqlx::{QueryBuilder, Sqlite};

const TODO_COLUMNS: &str = r#"SELECT
    t.id, t.title, t.date, t.start_date, t.end_date, t.start_time, t.end_time, t.is_all_day,
    t.recurrence, t.recurrence_end_date, t.category_id,
    c.name AS category_name, c.color AS category_color
FROM todos t
LEFT JOIN categories c ON t.category_id = c.id"#;

/// Treats NULL, blank and literal `null` recurrence text alike.
const HAS_RECURRENCE: &str =
    "(NULLIF(NULLIF(TRIM(COALESCE(t.recurrence, '')), ''), 'null') IS NOT NULL)";

/// Utility functions for building candidate SQL from a [`CandidateFilter`]
pub struct SqlCandidateBuilder;

impl SqlCandidateBuilder {
    /// Full todo candidate query for a filter.
    pub fn todo_query(filter: &CandidateFilter) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(TODO_COLUMNS);
        qb.push(" WHERE ");
        Self::build_todo_predicate(filter, &mut qb);
        qb.push(" ORDER BY t.start_time, t.title, t.id");
        qb
    }

    /// Dated completions inside the span plus all date-less completions.
    pub fn completion_query(filter: &CandidateFilter) -> QueryBuilder<'static, Sqlite> {
        let span = filter.span();
        let mut qb = QueryBuilder::new("SELECT id, key, todo_id, date FROM completions WHERE date IS NULL OR ");
        Self::push_between("date", span, &mut qb);
        qb
    }

    /// Build the superset predicate for todos touching the filter's span.
    ///
    /// Stored dates are compared in canonical form, so ISO date-times and
    /// compact `YYYYMMDD` values match like plain dates. A period end earlier
    /// than its start counts as the start day.
    pub fn build_todo_predicate(filter: &CandidateFilter, qb: &mut QueryBuilder<'static, Sqlite>) {
        let span = filter.span();

        qb.push("((NOT ");
        qb.push(HAS_RECURRENCE);
        qb.push(" AND (");
        Self::push_between("t.date", span, qb);
        qb.push(format!(" OR ({} <= ", day_of("t.start_date")));
        qb.push_bind(span.end().to_string());
        qb.push(format!(
            " AND MAX(COALESCE(NULLIF({end}, ''), {start}), {start}) >= ",
            end = day_of("t.end_date"),
            start = day_of("t.start_date"),
        ));
        qb.push_bind(span.start().to_string());
        qb.push("))) OR (");
        qb.push(HAS_RECURRENCE);
        qb.push(format!(
            " AND COALESCE(NULLIF({}, ''), {}) <= ",
            day_of("t.start_date"),
            day_of("t.date")
        ));
        qb.push_bind(span.end().to_string());
        qb.push(format!(
            " AND (NULLIF(TRIM(COALESCE(t.recurrence_end_date, '')), '') IS NULL OR {} >= ",
            day_of("t.recurrence_end_date")
        ));
        qb.push_bind(span.start().to_string());
        qb.push(")))");
    }

    fn push_between(column: &str, span: DateRange, qb: &mut QueryBuilder<'static, Sqlite>) {
        qb.push(format!("{} BETWEEN ", day_of(column)));
        qb.push_bind(span.start().to_string());
        qb.push(" AND ");
        qb.push_bind(span.end().to_string());
    }
}

/// Canonical `YYYY-MM-DD` text of a stored date column.
///
/// Compact `YYYYMMDD[THHMMSS]` values are dashed; everything else is cut to
/// its first ten characters after trimming.
fn day_of(column: &str) -> String {
    format!(
        "(CASE WHEN TRIM({col}) GLOB '[0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]*' \
         THEN substr(TRIM({col}), 1, 4) || '-' || substr(TRIM({col}), 5, 2) || '-' || substr(TRIM({col}), 7, 2) \
         ELSE substr(TRIM({col}), 1, 10) END)",
        col = column
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::CalendarDate;

    #[test]
    fn test_todo_query_shape() {
        let date = CalendarDate::parse("2026-03-01").unwrap();
        let qb = SqlCandidateBuilder::todo_query(&CandidateFilter::OnDate(date));
        let sql = qb.sql();
        assert!(sql.contains("LEFT JOIN categories"));
        assert!(sql.contains(&format!("{} BETWEEN ? AND ?", day_of("t.date"))));
        assert!(sql.ends_with("ORDER BY t.start_time, t.title, t.id"));
    }

    #[test]
    fn test_completion_query_includes_dateless_rows() {
        let range = DateRange::parse("2026-03-01", "2026-03-31").unwrap();
        let qb = SqlCandidateBuilder::completion_query(&CandidateFilter::InRange(range));
        assert!(qb
            .sql()
            .contains(&format!("date IS NULL OR {} BETWEEN ? AND ?", day_of("date"))));
    }

    #[test]
    fn test_day_of_handles_compact_and_iso_text() {
        let expr = day_of("t.date");
        assert!(expr.contains("GLOB '[0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]*'"));
        assert!(expr.contains("ELSE substr(TRIM(t.date), 1, 10)"));
    }
}
