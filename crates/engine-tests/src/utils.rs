use async_trait::async_trait;
use connectors::{
    memory::MemorySource,
    source::RowSource,
    sql::base::requests::FetchRowsRequestBuilder,
};
use engine_config::settings::ValidatedSettings;
use engine_core::{
    progress::ProgressService,
    retry::RetryPolicy,
    state::{StateStore, sled_store::SledStateStore},
};
use engine_processing::{error::SinkError, scan::sink::Sink};
use engine_runtime::{JobContext, TableSpec};
use model::{
    core::{sql_type::SqlType, value::Value},
    records::batch::Batch,
    scan::request::UniqueKeyColumn,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const ORDERS: &str = "t_order";
pub const ORDER_COLUMNS: [&str; 3] = ["order_id", "user_id", "status"];

pub const LOGS: &str = "t_log";
pub const LOG_COLUMNS: [&str; 2] = ["message", "level"];

pub fn status_of(id: i64) -> &'static str {
    match id % 3 {
        0 => "PAID",
        1 => "NEW",
        _ => "SHIPPED",
    }
}

pub fn order_row(id: i64) -> Vec<Value> {
    vec![
        Value::Int(id),
        Value::Int(id % 7),
        Value::String(status_of(id).to_string()),
    ]
}

/// Creates `t_order` on `source` with ids `1..=rows`, inserted out of key order.
pub async fn seed_orders(source: &MemorySource, rows: i64) {
    source.create_table(ORDERS, ORDER_COLUMNS).await;
    for id in (1..=rows).rev() {
        source.insert(ORDERS, order_row(id)).await.expect("insert order");
    }
}

/// Creates the keyless `t_log` table on `source`.
pub async fn seed_logs(source: &MemorySource, rows: i64) {
    source.create_table(LOGS, LOG_COLUMNS).await;
    for n in 0..rows {
        source
            .insert(
                LOGS,
                vec![
                    Value::String(format!("event {n}")),
                    Value::String(if n % 2 == 0 { "INFO" } else { "WARN" }.into()),
                ],
            )
            .await
            .expect("insert log");
    }
}

pub fn order_spec() -> TableSpec {
    TableSpec::new(ORDERS, ORDER_COLUMNS).with_unique_key(UniqueKeyColumn::new(
        "order_id",
        SqlType::BigInt,
        true,
    ))
}

pub fn log_spec() -> TableSpec {
    TableSpec::new(LOGS, LOG_COLUMNS)
}

pub fn settings(algorithm: &str) -> ValidatedSettings {
    ValidatedSettings::builder()
        .batch_size(7)
        .worker_count(2)
        .partitions(3)
        .algorithm(algorithm)
        .algorithm_property("chunk-size", "10")
        .retry(RetryPolicy::immediate(2))
        .build()
        .expect("valid settings")
}

/// Job context whose progress lives in a sled database under `dir`.
pub fn context(dir: &TempDir, settings: ValidatedSettings) -> JobContext {
    let store: Arc<dyn StateStore> =
        Arc::new(SledStateStore::open(dir.path()).expect("open sled"));
    JobContext::new(settings, ProgressService::new(store))
}

/// Order ids currently stored in `table` of `source`, ascending.
pub async fn stored_ids(source: &MemorySource, table: &str, key: &str) -> Vec<i64> {
    let request = FetchRowsRequestBuilder::new(table.to_string())
        .columns(vec![key.to_string()])
        .build();
    let mut ids: Vec<i64> = source
        .fetch(&request)
        .await
        .expect("read target")
        .iter()
        .filter_map(|row| match row.get_value(key) {
            Value::Int(id) => Some(id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    ids
}

pub async fn row_count(source: &MemorySource, table: &str, column: &str) -> usize {
    let request = FetchRowsRequestBuilder::new(table.to_string())
        .columns(vec![column.to_string()])
        .build();
    source.fetch(&request).await.expect("read target").len()
}

/// Writes delivered batches into a table of the same name on a
/// [`MemorySource`]. Keyed rows are upserted, so replayed batches after a
/// resume leave no duplicates.
#[derive(Clone)]
pub struct TableSink {
    target: MemorySource,
    batches: Arc<AtomicUsize>,
    cancel_after: Option<(usize, CancellationToken)>,
    failing_table: Option<Arc<Rejection>>,
}

struct Rejection {
    table: String,
    accepted: AtomicUsize,
    remaining: AtomicUsize,
}

impl TableSink {
    pub fn new(target: MemorySource) -> Self {
        Self {
            target,
            batches: Arc::new(AtomicUsize::new(0)),
            cancel_after: None,
            failing_table: None,
        }
    }

    /// Cancels `token` once `batches` data batches were written.
    pub fn cancel_after(mut self, batches: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((batches, token));
        self
    }

    /// Rejects the next `times` batches of `table`.
    pub fn failing(self, table: &str, times: usize) -> Self {
        self.failing_after(table, 0, times)
    }

    /// Lets `accepted` batches of `table` through, then rejects `times`.
    pub fn failing_after(mut self, table: &str, accepted: usize, times: usize) -> Self {
        self.failing_table = Some(Arc::new(Rejection {
            table: table.to_string(),
            accepted: AtomicUsize::new(accepted),
            remaining: AtomicUsize::new(times),
        }));
        self
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn should_fail(&self, batch: &Batch) -> bool {
        let Some(rejection) = &self.failing_table else {
            return false;
        };
        if !batch.range_key.starts_with(&format!("{}#", rejection.table)) {
            return false;
        }
        let take = |counter: &AtomicUsize| {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        };
        !take(&rejection.accepted) && take(&rejection.remaining)
    }
}

#[async_trait]
impl Sink for TableSink {
    async fn accept(&self, batch: Batch) -> Result<(), SinkError> {
        if self.should_fail(&batch) {
            return Err(SinkError::Other(format!(
                "write rejected for {}",
                batch.range_key
            )));
        }
        if batch.is_finished() {
            return Ok(());
        }

        for row in &batch.rows {
            let key = row.field_values.iter().find(|f| f.unique_key);
            if let Some(key) = key {
                let value = key.value.clone().unwrap_or(Value::Null);
                self.target
                    .delete(&row.entity, &key.name, &value)
                    .await
                    .map_err(|e| SinkError::Other(e.to_string()))?;
            }
            self.target
                .insert(&row.entity, row.values())
                .await
                .map_err(|e| SinkError::Other(e.to_string()))?;
        }

        let written = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after
            && written >= *limit
        {
            token.cancel();
        }
        Ok(())
    }
}
