use crate::{
    core::sql_type::SqlType,
    pagination::{position::Position, query_range::QueryRange},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueKeyColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

impl UniqueKeyColumn {
    pub fn new(name: impl Into<String>, sql_type: SqlType, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key,
        }
    }
}

/// How rows of a range are pulled from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryStrategy {
    /// Pages of `LIMIT n` rows, each page continuing after the last key seen.
    #[default]
    RangeQuery,
    /// One ordered read over the whole range.
    OrderedQuery,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("table '{0}' has no unique key columns but its position is split")]
    MissingUniqueKey(String),

    #[error("table '{0}' selects no columns")]
    NoColumns(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableScanRequest {
    pub table_name: String,
    pub column_names: Vec<String>,
    pub unique_key_columns: Vec<UniqueKeyColumn>,
    pub query_strategy: QueryStrategy,
    pub position: Position,
    /// Explicit filter overriding the one derived from `position`.
    pub query_range: Option<QueryRange>,
}

impl TableScanRequest {
    pub fn first_unique_key(&self) -> Option<&UniqueKeyColumn> {
        self.unique_key_columns.first()
    }

    pub fn is_unsplit(&self) -> bool {
        matches!(self.position, Position::Unsplit)
    }

    /// Key filter for the read. `None` means the whole table.
    pub fn effective_range(&self) -> Option<QueryRange> {
        self.query_range
            .clone()
            .or_else(|| QueryRange::from_position(&self.position))
    }

    pub fn with_position(&self, position: Position) -> Self {
        Self {
            position,
            query_range: None,
            ..self.clone()
        }
    }

    pub fn with_query_range(&self, range: QueryRange) -> Self {
        Self {
            query_range: Some(range),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.column_names.is_empty() {
            return Err(RequestError::NoColumns(self.table_name.clone()));
        }
        // A finished range is never read, so a keyless table may record one.
        let reads_by_key = !self.is_unsplit() && !self.position.is_finished();
        if self.unique_key_columns.is_empty() && reads_by_key {
            return Err(RequestError::MissingUniqueKey(self.table_name.clone()));
        }
        Ok(())
    }
}

pub struct TableScanRequestBuilder {
    table_name: String,
    column_names: Vec<String>,
    unique_key_columns: Vec<UniqueKeyColumn>,
    query_strategy: QueryStrategy,
    position: Position,
    query_range: Option<QueryRange>,
}

impl TableScanRequestBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            column_names: Vec::new(),
            unique_key_columns: Vec::new(),
            query_strategy: QueryStrategy::default(),
            position: Position::Unsplit,
            query_range: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn unique_key(mut self, column: UniqueKeyColumn) -> Self {
        self.unique_key_columns.push(column);
        self
    }

    pub fn strategy(mut self, strategy: QueryStrategy) -> Self {
        self.query_strategy = strategy;
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn query_range(mut self, range: QueryRange) -> Self {
        self.query_range = Some(range);
        self
    }

    pub fn build(self) -> Result<TableScanRequest, RequestError> {
        let request = TableScanRequest {
            table_name: self.table_name,
            column_names: self.column_names,
            unique_key_columns: self.unique_key_columns,
            query_strategy: self.query_strategy,
            position: self.position,
            query_range: self.query_range,
        };
        request.validate()?;
        Ok(request)
    }
}
