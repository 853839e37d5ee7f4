use model::{
    core::sql_type::KeyKind,
    pagination::position::{Position, PositionError},
    scan::request::{QueryStrategy, RequestError, TableScanRequest, TableScanRequestBuilder, UniqueKeyColumn},
};

/// One table of a job item: what to read and which column orders it.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub table: String,
    /// Table name on the target side when it differs from `table`.
    pub target_table: Option<String>,
    pub columns: Vec<String>,
    pub unique_key: Option<UniqueKeyColumn>,
}

impl TableSpec {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            target_table: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique_key: None,
        }
    }

    /// Sets the ordering key. The key column is always read, so it is added
    /// to the column list when missing.
    pub fn with_unique_key(mut self, key: UniqueKeyColumn) -> Self {
        if !self.columns.iter().any(|c| c.eq_ignore_ascii_case(&key.name)) {
            self.columns.insert(0, key.name.clone());
        }
        self.unique_key = Some(key);
        self
    }

    pub fn with_target_table(mut self, table: impl Into<String>) -> Self {
        self.target_table = Some(table.into());
        self
    }

    pub fn target_table(&self) -> &str {
        self.target_table.as_deref().unwrap_or(&self.table)
    }

    pub fn key_kind(&self) -> KeyKind {
        self.unique_key
            .as_ref()
            .map_or(KeyKind::Unsupported, |k| k.sql_type.key_kind())
    }

    /// Position spanning the whole key domain; `Unsplit` without a usable key.
    pub fn full_position(&self) -> Result<Position, PositionError> {
        match self.key_kind() {
            KeyKind::Integer => Position::integer_range(None, None),
            KeyKind::String => Position::string_range(None, None),
            KeyKind::Unsupported => Ok(Position::Unsplit),
        }
    }

    pub fn request(
        &self,
        position: Position,
        strategy: QueryStrategy,
    ) -> Result<TableScanRequest, RequestError> {
        self.request_for(&self.table, position, strategy)
    }

    pub fn target_request(
        &self,
        position: Position,
        strategy: QueryStrategy,
    ) -> Result<TableScanRequest, RequestError> {
        self.request_for(self.target_table(), position, strategy)
    }

    fn request_for(
        &self,
        table: &str,
        position: Position,
        strategy: QueryStrategy,
    ) -> Result<TableScanRequest, RequestError> {
        let mut builder = TableScanRequestBuilder::new(table)
            .columns(self.columns.iter().cloned())
            .strategy(strategy)
            .position(position);
        if let Some(key) = &self.unique_key {
            builder = builder.unique_key(key.clone());
        }
        builder.build()
    }
}
