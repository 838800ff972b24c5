//! Result shaping: row limit and pagination.
//!
//! Runs last in the pipeline, after caching and analytics, so both always
//! see the full result set. `total_rows` is captured before slicing and is
//! what pagination controls render against.

use vantage_common::models::QueryResult;

/// Truncate to `limit` rows, keeping `total_rows` at the pre-limit count.
pub fn apply_limit(result: &mut QueryResult, limit: usize) {
    result.total_rows = result.rows.len();
    if result.rows.len() > limit {
        result.rows.truncate(limit);
    }
    result.row_count = result.rows.len();
}

/// Slice out one page. Pages are 1-based; page 0 is treated as page 1, and a
/// page past the end yields an empty page rather than an error.
pub fn paginate(result: &mut QueryResult, page: usize, page_size: usize) {
    result.total_rows = result.rows.len();

    if page_size == 0 {
        result.rows.clear();
        result.row_count = 0;
        return;
    }

    let page = page.max(1);
    let start = (page - 1).saturating_mul(page_size);
    let end = start.saturating_add(page_size).min(result.rows.len());

    result.rows = if start < result.rows.len() {
        result.rows[start..end].to_vec()
    } else {
        Vec::new()
    };
    result.row_count = result.rows.len();
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_common::models::Value;

    fn result(n: usize) -> QueryResult {
        let rows = (0..n).map(|i| vec![Value::Int(i as i64)]).collect();
        QueryResult::new(vec!["n".to_string()], rows, 0)
    }

    #[test]
    fn test_first_page() {
        let mut r = result(10);
        paginate(&mut r, 1, 3);
        assert_eq!(r.rows, vec![
            vec![Value::Int(0)],
            vec![Value::Int(1)],
            vec![Value::Int(2)]
        ]);
        assert_eq!(r.row_count, 3);
        assert_eq!(r.total_rows, 10);
    }

    #[test]
    fn test_last_partial_page() {
        let mut r = result(10);
        paginate(&mut r, 4, 3);
        assert_eq!(r.rows, vec![vec![Value::Int(9)]]);
        assert_eq!(r.row_count, 1);
        assert_eq!(r.total_rows, 10);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let mut r = result(10);
        paginate(&mut r, 99, 3);
        assert!(r.rows.is_empty());
        assert_eq!(r.row_count, 0);
        assert_eq!(r.total_rows, 10);
    }

    #[test]
    fn test_page_zero_behaves_as_page_one() {
        let mut r = result(5);
        paginate(&mut r, 0, 2);
        assert_eq!(r.rows, vec![vec![Value::Int(0)], vec![Value::Int(1)]]);
    }

    #[test]
    fn test_zero_page_size_yields_empty_page() {
        let mut r = result(5);
        paginate(&mut r, 1, 0);
        assert!(r.rows.is_empty());
        assert_eq!(r.total_rows, 5);
    }

    #[test]
    fn test_limit_preserves_total() {
        let mut r = result(10);
        apply_limit(&mut r, 4);
        assert_eq!(r.row_count, 4);
        assert_eq!(r.total_rows, 10);
    }

    #[test]
    fn test_limit_larger_than_rows_is_noop() {
        let mut r = result(3);
        apply_limit(&mut r, 100);
        assert_eq!(r.row_count, 3);
        assert_eq!(r.total_rows, 3);
    }
}
