use crate::{
    error::AdapterError,
    source::{CRC32_ALGORITHM, KeyBounds, RowSource, RowStream},
    sql::{
        base::{
            error::{ConnectorError, DbError},
            query::select_sql,
            requests::FetchRowsRequest,
        },
        mysql::{params::positional, row::to_row_data},
    },
};
use async_trait::async_trait;
use futures_util::{StreamExt, pin_mut, stream};
use model::{
    consistency::checksum::ChecksumSummary, core::value::Value,
    pagination::query_range::QueryRange, records::row::RowData,
};
use mysql_async::{Opts, Pool, Row, prelude::Queryable};
use planner::query::{
    dialect,
    scan::{CHECKSUM_ALIAS, COUNT_ALIAS, MAX_KEY_ALIAS, MIN_KEY_ALIAS, ScanQueries},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Rows buffered between the streaming connection task and the consumer.
const STREAM_BUFFER: usize = 1024;

#[derive(Clone)]
pub struct MySqlSource {
    name: String,
    pool: Pool,
    dialect: dialect::MySql,
}

impl MySqlSource {
    pub fn connect(url: &str) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        let name = format!(
            "mysql://{}:{}/{}",
            opts.ip_or_hostname(),
            opts.tcp_port(),
            opts.db_name().unwrap_or_default()
        );
        info!(source = %name, "Opening MySQL pool");
        Ok(Self::from_pool(name, Pool::new(opts)))
    }

    pub fn from_pool(name: impl Into<String>, pool: Pool) -> Self {
        Self {
            name: name.into(),
            pool,
            dialect: dialect::MySql,
        }
    }

    pub async fn disconnect(self) -> Result<(), DbError> {
        self.pool.disconnect().await?;
        Ok(())
    }

    async fn first_row(&self, sql: String, params: Vec<Value>) -> Result<Option<RowData>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn.exec_first(sql, positional(&params)).await?;
        row.map(|r| to_row_data("", &r, &[])).transpose()
    }
}

#[async_trait]
impl RowSource for MySqlSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRowsRequest) -> Result<Vec<RowData>, AdapterError> {
        if request.is_empty_range() {
            return Ok(Vec::new());
        }
        let (sql, params) = select_sql(&self.dialect, request);
        debug!(source = %self.name, %sql, ?params, "Fetching rows");

        let mut conn = self.pool.get_conn().await.map_err(DbError::from)?;
        let rows: Vec<Row> = conn
            .exec(sql, positional(&params))
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
        let (sql, params) = select_sql(&self.dialect, request);
        debug!(source = %self.name, %sql, ?params, "Streaming rows");

        // The result set borrows its connection, so a task owns both and hands
        // rows over a bounded channel.
        let pool = self.pool.clone();
        let table = request.table.clone();
        let keys = request.unique_keys.clone();
        let (tx, rx) = mpsc::channel::<Result<RowData, AdapterError>>(STREAM_BUFFER);

        tokio::spawn(async move {
            let result = async {
                let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                let mut conn = pool.get_conn().await?;
                let rows = conn.exec_stream::<Row, _, _>(sql, positional(&params)).await?;
                pin_mut!(rows);
                while let Some(row) = rows.next().await {
                    let row = to_row_data(&table, &row?, &key_refs)?;
                    if tx.send(Ok(row)).await.is_err() {
                        // Consumer went away.
                        break;
                    }
                }
                Ok::<(), DbError>(())
            }
            .await;

            if let Err(err) = result {
                error!(table = %table, error = %err, "MySQL stream failed");
                let _ = tx.send(Err(err.into())).await;
            }
        });

        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }

    async fn key_bounds(&self, table: &str, key: &str) -> Result<KeyBounds, AdapterError> {
        let sql = ScanQueries::new(&self.dialect).key_domain(table, key);
        let row = self.first_row(sql, Vec::new()).await?;
        Ok(row
            .map(|r| KeyBounds {
                min: r.get(MIN_KEY_ALIAS).and_then(|f| f.value.clone()),
                max: r.get(MAX_KEY_ALIAS).and_then(|f| f.value.clone()),
            })
            .unwrap_or_default())
    }

    fn supports_crc32(&self) -> bool {
        true
    }

    async fn crc32_checksum(
        &self,
        table: &str,
        column: &str,
        key: Option<&str>,
        range: Option<&QueryRange>,
    ) -> Result<ChecksumSummary, AdapterError> {
        let (sql, params) = ScanQueries::new(&self.dialect)
            .crc32_checksum(table, column, key, range)
            .ok_or_else(|| AdapterError::Unsupported {
                source_name: self.name.clone(),
                operation: "CRC32 checksum".into(),
            })?;
        debug!(source = %self.name, %sql, "Computing column checksum");

        let row = self.first_row(sql, params).await?;
        let (checksum, count) = checksum_totals(row.as_ref())?;
        Ok(ChecksumSummary::new(CRC32_ALGORITHM, column, checksum, count))
    }
}

/// Checksum and row count of a checksum row. Only SQL NULL reads as absent;
/// anything else must fit the target width.
fn checksum_totals(row: Option<&RowData>) -> Result<(Option<u32>, u64), DbError> {
    let Some(row) = row else {
        return Ok((None, 0));
    };
    let checksum = match row.get_value(CHECKSUM_ALIAS) {
        Value::Null => None,
        value => Some(
            value
                .as_bigint()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| out_of_range(CHECKSUM_ALIAS, &value, "u32"))?,
        ),
    };
    let count = match row.get_value(COUNT_ALIAS) {
        Value::Null => 0,
        value => value
            .as_bigint()
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| out_of_range(COUNT_ALIAS, &value, "u64"))?,
    };
    Ok((checksum, count))
}

fn out_of_range(column: &str, value: &Value, width: &str) -> DbError {
    DbError::Decode {
        column: column.to_string(),
        reason: format!("{value} does not fit {width}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::row::FieldValue;

    fn checksum_row(checksum: Value, count: Value) -> RowData {
        RowData::new(
            "t_order",
            vec![
                FieldValue::new(CHECKSUM_ALIAS, checksum, false),
                FieldValue::new(COUNT_ALIAS, count, false),
            ],
        )
    }

    #[test]
    fn reads_checksum_and_count() {
        let row = checksum_row(Value::Uint(u32::MAX as u64), Value::Int(12));
        assert_eq!(checksum_totals(Some(&row)).unwrap(), (Some(u32::MAX), 12));

        let empty = checksum_row(Value::Null, Value::Int(0));
        assert_eq!(checksum_totals(Some(&empty)).unwrap(), (None, 0));
        assert_eq!(checksum_totals(None).unwrap(), (None, 0));
    }

    #[test]
    fn checksum_outside_u32_is_an_error() {
        let row = checksum_row(Value::Uint(u32::MAX as u64 + 1), Value::Int(3));
        let err = checksum_totals(Some(&row)).unwrap_err();
        assert!(
            matches!(&err, DbError::Decode { column, .. } if column == CHECKSUM_ALIAS),
            "unexpected error {err:?}"
        );

        let negative = checksum_row(Value::Int(7), Value::Int(-1));
        assert!(checksum_totals(Some(&negative)).is_err());
    }
}
