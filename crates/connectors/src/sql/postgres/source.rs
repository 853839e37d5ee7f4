use crate::{
    error::AdapterError,
    source::{KeyBounds, RowSource, RowStream},
    sql::{
        base::{
            error::{ConnectorError, DbError},
            query::select_sql,
            requests::FetchRowsRequest,
        },
        postgres::{connect::connect_client, params::PgParamStore, row::to_row_data},
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use model::{
    consistency::checksum::ChecksumSummary, pagination::query_range::QueryRange,
    records::row::RowData,
};
use planner::query::{
    dialect,
    scan::{MAX_KEY_ALIAS, MIN_KEY_ALIAS, ScanQueries},
};
use std::sync::Arc;
use tokio_postgres::Client;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PgSource {
    name: String,
    client: Arc<Client>,
    dialect: dialect::Postgres,
}

impl PgSource {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = connect_client(url).await?;
        // Drop credentials from the name used in logs.
        let host = url.rsplit('@').next().unwrap_or(url);
        let host = host
            .trim_start_matches("postgresql://")
            .trim_start_matches("postgres://");
        let name = format!("postgres://{host}");
        info!(source = %name, "Connected to Postgres");
        Ok(Self::from_client(name, Arc::new(client)))
    }

    pub fn from_client(name: impl Into<String>, client: Arc<Client>) -> Self {
        Self {
            name: name.into(),
            client,
            dialect: dialect::Postgres,
        }
    }

    async fn prepare(
        &self,
        request: &FetchRowsRequest,
    ) -> Result<(tokio_postgres::Statement, PgParamStore), DbError> {
        let (sql, values) = select_sql(&self.dialect, request);
        debug!(source = %self.name, %sql, params = ?values, "Preparing read");
        let statement = self.client.prepare(&sql).await?;
        let params = PgParamStore::for_types(&values, statement.params())?;
        Ok((statement, params))
    }
}

#[async_trait]
impl RowSource for PgSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRowsRequest) -> Result<Vec<RowData>, AdapterError> {
        if request.is_empty_range() {
            return Ok(Vec::new());
        }
        let (statement, params) = self.prepare(request).await?;
        let rows = self
            .client
            .query(&statement, &params.as_refs())
            .await
            .map_err(DbError::from)?;

        let keys = request.unique_key_refs();
        let rows = rows
            .iter()
            .map(|row| to_row_data(&request.table, row, &keys))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn stream(&self, request: &FetchRowsRequest) -> Result<RowStream, AdapterError> {
        if request.is_empty_range() {
            return Ok(stream::empty().boxed());
        }
        let (statement, params) = self.prepare(request).await?;
        let rows = self
            .client
            .query_raw(&statement, params.as_refs())
            .await
            .map_err(DbError::from)?;

        let table = request.table.clone();
        let keys = request.unique_keys.clone();
        let rows = rows.map_err(DbError::from).and_then(move |row| {
            let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            futures_util::future::ready(to_row_data(&table, &row, &key_refs))
        });
        Ok(rows.map_err(AdapterError::from).boxed())
    }

    async fn key_bounds(&self, table: &str, key: &str) -> Result<KeyBounds, AdapterError> {
        let sql = ScanQueries::new(&self.dialect).key_domain(table, key);
        let row = self
            .client
            .query_opt(&sql, &[])
            .await
            .map_err(DbError::from)?;
        let Some(row) = row else {
            return Ok(KeyBounds::default());
        };
        let row = to_row_data(table, &row, &[])?;
        Ok(KeyBounds {
            min: row.get(MIN_KEY_ALIAS).and_then(|f| f.value.clone()),
            max: row.get(MAX_KEY_ALIAS).and_then(|f| f.value.clone()),
        })
    }

    fn supports_crc32(&self) -> bool {
        false
    }

    async fn crc32_checksum(
        &self,
        _table: &str,
        _column: &str,
        _key: Option<&str>,
        _range: Option<&QueryRange>,
    ) -> Result<ChecksumSummary, AdapterError> {
        Err(AdapterError::Unsupported {
            source_name: self.name.clone(),
            operation: "CRC32 checksum".into(),
        })
    }
}
