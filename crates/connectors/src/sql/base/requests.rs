use model::{
    core::value::Value,
    pagination::query_range::QueryRange,
    scan::request::TableScanRequest,
};

/// Which rows a read selects.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    /// Every row, in source order.
    All,
    /// Rows whose `key` falls in `range`, ordered by `key` ascending. A
    /// missing range selects the whole table in key order.
    Range {
        key: String,
        range: Option<QueryRange>,
    },
    /// Rows whose `key` equals `value`.
    Point { key: String, value: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRowsRequest {
    pub table: String,
    pub columns: Vec<String>,
    /// Columns flagged as unique key columns on every returned row.
    pub unique_keys: Vec<String>,
    pub filter: RowFilter,
    pub limit: Option<usize>,
}

impl FetchRowsRequest {
    /// Read covering a scan request's remaining range: ordered by the first
    /// unique key, or a plain full read for unsplit tables.
    pub fn for_scan(request: &TableScanRequest, limit: Option<usize>) -> Self {
        let builder = FetchRowsRequestBuilder::new(request.table_name.clone())
            .columns(request.column_names.clone())
            .unique_keys(
                request
                    .unique_key_columns
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
            );

        match request.first_unique_key() {
            Some(key) if !request.is_unsplit() => builder
                .range(key.name.clone(), request.effective_range())
                .limit(limit)
                .build(),
            _ => builder.build(),
        }
    }

    /// Same columns and key flags, selecting the rows that share `value`.
    pub fn point(&self, key: &str, value: Value) -> Self {
        Self {
            filter: RowFilter::Point {
                key: key.to_string(),
                value,
            },
            limit: None,
            ..self.clone()
        }
    }

    pub fn unique_key_refs(&self) -> Vec<&str> {
        self.unique_keys.iter().map(String::as_str).collect()
    }

    /// A range whose bounds exclude every key needs no round trip.
    pub fn is_empty_range(&self) -> bool {
        matches!(&self.filter, RowFilter::Range { range: Some(r), .. } if r.is_empty())
    }
}

pub struct FetchRowsRequestBuilder {
    table: String,
    columns: Vec<String>,
    unique_keys: Vec<String>,
    filter: RowFilter,
    limit: Option<usize>,
}

impl FetchRowsRequestBuilder {
    pub fn new(table: String) -> Self {
        FetchRowsRequestBuilder {
            table,
            columns: Vec::new(),
            unique_keys: Vec::new(),
            filter: RowFilter::All,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn unique_keys(mut self, keys: Vec<String>) -> Self {
        self.unique_keys = keys;
        self
    }

    pub fn range(mut self, key: String, range: Option<QueryRange>) -> Self {
        self.filter = RowFilter::Range { key, range };
        self
    }

    pub fn point(mut self, key: String, value: Value) -> Self {
        self.filter = RowFilter::Point { key, value };
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(self) -> FetchRowsRequest {
        FetchRowsRequest {
            table: self.table,
            columns: self.columns,
            unique_keys: self.unique_keys,
            filter: self.filter,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::sql_type::SqlType,
        pagination::position::Position,
        scan::request::{TableScanRequestBuilder, UniqueKeyColumn},
    };

    fn scan(position: Position) -> TableScanRequest {
        TableScanRequestBuilder::new("t_order")
            .columns(["order_id", "status"])
            .unique_key(UniqueKeyColumn::new("order_id", SqlType::BigInt, true))
            .position(position)
            .build()
            .unwrap()
    }

    #[test]
    fn split_scan_reads_ordered_range() {
        let req = FetchRowsRequest::for_scan(&scan(Position::decode("i,10,20").unwrap()), Some(5));
        assert_eq!(req.limit, Some(5));
        match req.filter {
            RowFilter::Range { key, range } => {
                assert_eq!(key, "order_id");
                let range = range.unwrap();
                assert_eq!(range.lower, Some(Value::Int(10)));
                assert!(!range.lower_inclusive);
            }
            other => panic!("unexpected filter {other:?}"),
        }
    }

    #[test]
    fn unsplit_scan_reads_everything() {
        let req = FetchRowsRequest::for_scan(&scan(Position::Unsplit), Some(5));
        assert_eq!(req.filter, RowFilter::All);
        assert_eq!(req.limit, None);
        assert_eq!(req.unique_key_refs(), vec!["order_id"]);
    }

    #[test]
    fn reversed_range_is_detected() {
        let reversed = QueryRange::new(Some(Value::Int(20)), false, Some(Value::Int(10)));
        let request = scan(Position::decode("i,,30").unwrap()).with_query_range(reversed);
        let req = FetchRowsRequest::for_scan(&request, None);
        assert!(req.is_empty_range());
    }
}
