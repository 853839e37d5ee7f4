use crate::sql::base::requests::{FetchRowsRequest, RowFilter};
use model::core::value::Value;
use planner::query::{dialect::Dialect, scan::ScanQueries};

/// Renders the SELECT for a fetch request in the given dialect.
pub fn select_sql(dialect: &dyn Dialect, request: &FetchRowsRequest) -> (String, Vec<Value>) {
    let queries = ScanQueries::new(dialect);
    match &request.filter {
        RowFilter::All => queries.full_select(&request.table, &request.columns),
        RowFilter::Range { key, range } => queries.range_select(
            &request.table,
            &request.columns,
            key,
            range.as_ref(),
            request.limit,
        ),
        RowFilter::Point { key, value } => {
            queries.point_select(&request.table, &request.columns, key, value)
        }
    }
}
