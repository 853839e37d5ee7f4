use crate::{
    error::ScanError,
    scan::{event::ScanEvent, reader::RangeReader, sink::Sink},
};
use connectors::{error::AdapterError, sql::base::requests::FetchRowsRequest};
use engine_core::{metrics::ScanMetrics, retry::RetryError};
use futures::StreamExt;
use model::{
    core::value::Value,
    pagination::{
        position::{Position, PositionError},
        query_range::QueryRange,
    },
    records::{
        batch::{Batch, manifest_for},
        row::RowData,
    },
    scan::request::{QueryStrategy, TableScanRequest},
};
use std::{cmp::Ordering, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Scanning,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { rows: u64 },
    /// Stopped at a batch boundary; `position` is the last checkpoint.
    Cancelled { position: Position, rows: u64 },
}

/// Which range of which job item a worker owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeIdentity {
    pub job_id: String,
    pub item: u32,
    pub range_key: String,
}

impl RangeIdentity {
    pub fn new(job_id: impl Into<String>, item: u32, range_key: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            item,
            range_key: range_key.into(),
        }
    }
}

/// Copies one range of a table into a sink, checkpointing after every batch.
///
/// The worker only ever reports its own range key, and only after the sink
/// accepted the rows the new position covers. A crash therefore replays at
/// most the batch in flight.
pub struct InventoryScanWorker {
    identity: RangeIdentity,
    request: TableScanRequest,
    reader: RangeReader,
    sink: Arc<dyn Sink>,
    events: mpsc::Sender<ScanEvent>,
    cancel: CancellationToken,
    batch_size: usize,
    state: WorkerState,
    batches: u64,
    rows: u64,
}

impl InventoryScanWorker {
    pub fn new(
        identity: RangeIdentity,
        request: TableScanRequest,
        reader: RangeReader,
        sink: Arc<dyn Sink>,
        events: mpsc::Sender<ScanEvent>,
        batch_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            request,
            reader,
            sink,
            events,
            cancel,
            batch_size: batch_size.max(1),
            state: WorkerState::Idle,
            batches: 0,
            rows: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn range_key(&self) -> &str {
        &self.identity.range_key
    }

    pub async fn run(&mut self) -> Result<ScanOutcome, ScanError> {
        if self.state != WorkerState::Idle {
            return Err(ScanError::AlreadyStarted(self.identity.range_key.clone()));
        }

        if self.request.position.is_finished() {
            info!(
                table = %self.request.table_name,
                range = %self.identity.range_key,
                "Range already finished; skipping"
            );
            self.state = WorkerState::Completed;
            return Ok(ScanOutcome::Completed { rows: 0 });
        }

        self.state = WorkerState::Scanning;
        let result = self.scan().await;

        match result {
            Ok(outcome) => {
                self.state = match outcome {
                    ScanOutcome::Completed { .. } => WorkerState::Completed,
                    ScanOutcome::Cancelled { .. } => WorkerState::Cancelled,
                };
                Ok(outcome)
            }
            Err(err) => {
                self.state = WorkerState::Failed;
                self.metrics().increment_failures(1);
                error!(
                    table = %self.request.table_name,
                    range = %self.identity.range_key,
                    error = %err,
                    "Inventory range failed"
                );
                // The receiver may be gone already; the error is returned either way.
                let _ = self
                    .events
                    .send(ScanEvent::Failed {
                        range_key: self.identity.range_key.clone(),
                        error: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn scan(&mut self) -> Result<ScanOutcome, ScanError> {
        self.request.validate()?;
        self.emit(ScanEvent::Started {
            range_key: self.identity.range_key.clone(),
            position: self.request.position.encode(),
        })
        .await?;

        if self.request.is_unsplit() {
            let read = FetchRowsRequest::for_scan(&self.request, None);
            return self.scan_stream(read, false).await;
        }

        match self.request.query_strategy {
            QueryStrategy::RangeQuery => self.scan_pages().await,
            QueryStrategy::OrderedQuery => {
                let read = FetchRowsRequest::for_scan(&self.request, None);
                self.scan_stream(read, true).await
            }
        }
    }

    /// `LIMIT` pages, each continuing after the last key of the previous one.
    async fn scan_pages(&mut self) -> Result<ScanOutcome, ScanError> {
        let key = match self.request.first_unique_key() {
            Some(column) => column.name.clone(),
            None => return Err(ScanError::MissingKey(self.identity.range_key.clone())),
        };
        // Reads follow the last key delivered; `position` only moves when
        // that key can be recorded.
        let mut position = self.request.position.clone();
        let mut cursor = self
            .request
            .effective_range()
            .unwrap_or_else(QueryRange::full);

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(position));
            }

            let scan = self.request.with_query_range(cursor.clone());
            let page = FetchRowsRequest::for_scan(&scan, Some(self.batch_size));
            let mut rows = self
                .reader
                .fetch(&page)
                .await
                .map_err(|e| self.read_error(e))?;

            // A page holding a single key value may have cut that key's rows
            // short; read all of them before moving past the key.
            if let Some(value) = single_key_page(&rows) {
                debug!(
                    table = %self.request.table_name,
                    range = %self.identity.range_key,
                    key = %value,
                    "Page holds one key; switching to point query"
                );
                self.metrics().increment_point_queries();
                rows = self
                    .reader
                    .fetch(&page.point(&key, value))
                    .await
                    .map_err(|e| self.read_error(e))?;
            }

            let Some(last) = rows.last().and_then(RowData::unique_key_value).cloned() else {
                if rows.is_empty() {
                    return self.finish().await;
                }
                return Err(ScanError::MissingKey(self.identity.range_key.clone()));
            };
            position = self.flush(rows, &position, true).await?;
            cursor = cursor.after(last);
        }
    }

    /// One forward-only read split into batches. Unkeyed reads keep the
    /// starting position, so resuming them restarts the table.
    async fn scan_stream(
        &mut self,
        read: FetchRowsRequest,
        keyed: bool,
    ) -> Result<ScanOutcome, ScanError> {
        let mut position = self.request.position.clone();
        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(position));
        }

        let mut stream = self
            .reader
            .open(&read)
            .await
            .map_err(|e| self.read_error(e))?;
        let mut buffer = Vec::with_capacity(self.batch_size);

        while let Some(row) = stream.next().await {
            let row = row.map_err(|source| ScanError::Read {
                table: self.request.table_name.clone(),
                range_key: self.identity.range_key.clone(),
                source,
            })?;
            buffer.push(row);

            if buffer.len() >= self.batch_size {
                let rows = std::mem::replace(&mut buffer, Vec::with_capacity(self.batch_size));
                position = self.flush(rows, &position, keyed).await?;
                if self.cancel.is_cancelled() {
                    return Ok(self.cancelled(position));
                }
            }
        }

        if !buffer.is_empty() {
            self.flush(buffer, &position, keyed).await?;
        }
        self.finish().await
    }

    /// Delivers `rows` and checkpoints the position after them.
    async fn flush(
        &mut self,
        rows: Vec<RowData>,
        position: &Position,
        keyed: bool,
    ) -> Result<Position, ScanError> {
        let next = if keyed {
            let last = rows
                .last()
                .and_then(RowData::unique_key_value)
                .ok_or_else(|| ScanError::MissingKey(self.identity.range_key.clone()))?;
            match position.advance_to(last) {
                Ok(next) => next,
                // Text keys holding ',' or nothing at all have no encoding.
                // The range keeps its last checkpoint and replays from there.
                Err(PositionError::InvalidBound { reason, .. })
                    if matches!(last, Value::String(_)) =>
                {
                    warn!(
                        table = %self.request.table_name,
                        range = %self.identity.range_key,
                        key = %last,
                        %reason,
                        "Key cannot be recorded; keeping last checkpoint"
                    );
                    position.clone()
                }
                Err(source) => {
                    return Err(ScanError::Position {
                        range_key: self.identity.range_key.clone(),
                        source,
                    });
                }
            }
        } else {
            position.clone()
        };

        let count = rows.len() as u64;
        let bytes: usize = rows.iter().map(RowData::size_bytes).sum();
        let batch_id = self.make_batch_id(&next);
        let batch = Batch {
            id: batch_id.clone(),
            range_key: self.identity.range_key.clone(),
            manifest: manifest_for(&rows),
            rows,
            next: next.clone(),
            ts: chrono::Utc::now(),
        };

        self.sink
            .accept(batch)
            .await
            .map_err(|source| ScanError::Sink {
                batch_id: batch_id.clone(),
                source,
            })?;

        self.batches += 1;
        self.rows += count;
        let metrics = self.metrics();
        metrics.increment_rows(count);
        metrics.increment_bytes(bytes as u64);
        metrics.increment_batches(1);

        if let Some(encoded) = next.encode() {
            metrics.increment_checkpoints();
            self.emit(ScanEvent::Checkpoint {
                range_key: self.identity.range_key.clone(),
                position: encoded,
                rows: count,
            })
            .await?;
        }

        debug!(
            table = %self.request.table_name,
            range = %self.identity.range_key,
            batch_id = %batch_id,
            rows = count,
            "Delivered batch"
        );
        Ok(next)
    }

    async fn finish(&mut self) -> Result<ScanOutcome, ScanError> {
        let batch_id = self.make_batch_id(&Position::Finished);
        self.sink
            .accept(Batch::finished(
                batch_id.clone(),
                self.identity.range_key.clone(),
            ))
            .await
            .map_err(|source| ScanError::Sink { batch_id, source })?;

        self.emit(ScanEvent::Finished {
            range_key: self.identity.range_key.clone(),
            rows: self.rows,
        })
        .await?;

        info!(
            table = %self.request.table_name,
            range = %self.identity.range_key,
            rows = self.rows,
            batches = self.batches,
            "Inventory range done"
        );
        Ok(ScanOutcome::Completed { rows: self.rows })
    }

    fn cancelled(&self, position: Position) -> ScanOutcome {
        info!(
            table = %self.request.table_name,
            range = %self.identity.range_key,
            rows = self.rows,
            "Cancellation requested; stopping at last checkpoint"
        );
        ScanOutcome::Cancelled {
            position,
            rows: self.rows,
        }
    }

    async fn emit(&self, event: ScanEvent) -> Result<(), ScanError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ScanError::ProgressClosed)
    }

    fn metrics(&self) -> &ScanMetrics {
        self.reader.metrics()
    }

    fn read_error(&self, err: RetryError<AdapterError>) -> ScanError {
        let table = self.request.table_name.clone();
        let range_key = self.identity.range_key.clone();
        match err {
            RetryError::Fatal(source) => ScanError::Read {
                table,
                range_key,
                source,
            },
            RetryError::AttemptsExceeded(source) => ScanError::RetriesExhausted {
                table,
                range_key,
                source,
            },
        }
    }

    fn make_batch_id(&self, next: &Position) -> String {
        let mut h = blake3::Hasher::new();
        h.update(self.identity.job_id.as_bytes());
        h.update(&self.identity.item.to_le_bytes());
        h.update(self.identity.range_key.as_bytes());
        h.update(&self.batches.to_le_bytes());
        h.update(next.encode().unwrap_or_default().as_bytes());
        h.finalize().to_hex().to_string()
    }
}

/// The shared key of a page whose first and last rows have equal keys.
fn single_key_page(rows: &[RowData]) -> Option<Value> {
    if rows.len() < 2 {
        return None;
    }
    let first = rows.first()?.unique_key_value()?;
    let last = rows.last()?.unique_key_value()?;
    (first.compare(last) == Some(Ordering::Equal)).then(|| first.clone())
}
