use crate::{
    actor::{
        actor::{Actor, ActorContext, ActorRef},
        messages::{Reply, TrackerMsg},
        spawn::spawn_actor,
    },
    error::{ActorError, JobError},
};
use async_trait::async_trait;
use chrono::Utc;
use engine_core::{
    progress::ProgressService,
    state::models::{JobEvent, SaveOutcome},
};
use engine_processing::scan::event::ScanEvent;
use model::{
    consistency::result::{CheckOutcome, TableCheckResult},
    progress::job_item::{IncrementalProgress, JobItemProgress, JobStatus},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Single writer of one job item's [`JobItemProgress`].
///
/// Workers never touch the progress value; they send events and the tracker
/// applies them in arrival order, persisting a new versioned snapshot after
/// every change.
pub struct ProgressTracker {
    job_id: String,
    item: u32,
    progress: JobItemProgress,
    version: u64,
    service: ProgressService,
    check_results: Vec<TableCheckResult>,
}

impl ProgressTracker {
    pub fn new(
        job_id: impl Into<String>,
        item: u32,
        progress: JobItemProgress,
        version: u64,
        service: ProgressService,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            item,
            progress,
            version,
            service,
            check_results: Vec::new(),
        }
    }

    async fn persist(&mut self) -> Result<(), JobError> {
        let next = self.version + 1;
        match self
            .service
            .persist(&self.job_id, self.item, next, &self.progress)
            .await?
        {
            SaveOutcome::Applied => self.version = next,
            SaveOutcome::Stale { current } => warn!(
                job_id = %self.job_id,
                item = self.item,
                version = next,
                current,
                "Progress was written by another tracker; snapshot dropped"
            ),
        }
        Ok(())
    }

    async fn record(&self, event: JobEvent) -> Result<(), JobError> {
        Ok(self.service.record_event(event).await?)
    }

    /// Whether `range_key` was planned and has not finished yet.
    fn accepts(&self, range_key: &str) -> bool {
        match self.progress.position_of(range_key) {
            Some(position) if position.is_empty() => {
                warn!(range = %range_key, "Event for a finished range ignored");
                false
            }
            Some(_) => true,
            None => {
                warn!(range = %range_key, "Event for an unknown range ignored");
                false
            }
        }
    }

    async fn apply_scan(&mut self, event: ScanEvent) -> Result<(), JobError> {
        if !self.accepts(event.range_key()) {
            return Ok(());
        }

        match event {
            ScanEvent::Started {
                range_key,
                position,
            } => {
                let replayed = self.progress.restart_range(&range_key);
                if replayed > 0 {
                    debug!(range = %range_key, replayed, "Range restarts; its rows are counted again");
                    self.persist().await?;
                }
                self.record(JobEvent::RangeStarted {
                    job_id: self.job_id.clone(),
                    item: self.item,
                    range_key,
                    position: position.unwrap_or_default(),
                })
                .await
            }
            ScanEvent::Checkpoint {
                range_key,
                position,
                rows,
            } => {
                debug!(range = %range_key, %position, rows, "Checkpoint");
                self.progress.record_checkpoint(range_key, position, rows);
                self.persist().await
            }
            ScanEvent::Finished { range_key, rows } => {
                self.progress.finish_range(range_key.clone());
                self.persist().await?;
                self.record(JobEvent::RangeFinished {
                    job_id: self.job_id.clone(),
                    item: self.item,
                    range_key,
                    rows,
                })
                .await
            }
            ScanEvent::Failed { range_key, error } => {
                self.progress.error_message = Some(format!("{range_key}: {error}"));
                self.persist().await?;
                self.record(JobEvent::RangeFailed {
                    job_id: self.job_id.clone(),
                    item: self.item,
                    range_key,
                    error,
                })
                .await
            }
        }
    }

    async fn transition(&mut self, status: JobStatus, error: Option<String>) -> Result<(), JobError> {
        let from = self.progress.status;
        self.progress.transition(status)?;
        if error.is_some() {
            self.progress.error_message = error;
        }
        self.persist().await?;
        info!(job_id = %self.job_id, item = self.item, %from, to = %status, "Job item status changed");

        if status.is_terminal() {
            self.record(JobEvent::ItemDone {
                job_id: self.job_id.clone(),
                item: self.item,
                status,
            })
            .await?;
        }
        Ok(())
    }

    async fn table_checked(&mut self, result: TableCheckResult) -> Result<(), JobError> {
        self.progress.checked_records_count += result.source_records as i64;
        if matches!(result.outcome, CheckOutcome::Ignored(_)) {
            self.progress
                .ignored_table_names
                .insert(result.table.clone());
        }
        self.record(JobEvent::CheckFinished {
            job_id: self.job_id.clone(),
            item: self.item,
            table: result.table.clone(),
            matched: result.is_matched(),
        })
        .await?;
        self.check_results.push(result);
        self.persist().await
    }

    async fn check_finished(&mut self) -> Result<(), JobError> {
        self.progress.check_end_time_millis = Some(Utc::now().timestamp_millis());
        self.service
            .save_check_results(&self.job_id, self.item, self.check_results.clone())
            .await?;
        self.persist().await
    }

    async fn handle_msg(&mut self, msg: TrackerMsg) -> Result<(), JobError> {
        match msg {
            TrackerMsg::Scan(event) => self.apply_scan(event).await,
            TrackerMsg::RangesPlanned(ranges) => {
                for (range_key, position) in ranges {
                    self.progress
                        .per_table_position
                        .entry(range_key)
                        .or_insert(position);
                }
                self.persist().await
            }
            TrackerMsg::Transition {
                status,
                error,
                reply,
            } => {
                let result = self.transition(status, error).await;
                send_reply(reply, result);
                Ok(())
            }
            TrackerMsg::CheckStarted { total_records } => {
                self.progress.total_records_count = total_records;
                self.progress.checked_records_count = 0;
                self.progress.check_begin_time_millis = Some(Utc::now().timestamp_millis());
                self.progress.check_end_time_millis = None;
                self.progress.ignored_table_names.clear();
                self.check_results.clear();
                self.persist().await
            }
            TrackerMsg::TableChecked(result) => self.table_checked(result).await,
            TrackerMsg::CheckFinished(reply) => {
                let result = self.check_finished().await;
                send_reply(reply, result);
                Ok(())
            }
            TrackerMsg::Incremental(incremental) => {
                self.progress.incremental = Some(incremental);
                self.persist().await
            }
            TrackerMsg::Heartbeat => {
                self.record(JobEvent::Heartbeat {
                    job_id: self.job_id.clone(),
                    item: self.item,
                    at: Utc::now(),
                })
                .await
            }
            TrackerMsg::Snapshot(reply) => {
                let _ = reply.send(self.progress.clone());
                Ok(())
            }
            TrackerMsg::Flush(reply) => {
                let result = self.persist().await;
                send_reply(reply, result);
                Ok(())
            }
        }
    }
}

fn send_reply(reply: Reply, result: Result<(), JobError>) {
    if let Err(Err(err)) = reply.send(result) {
        warn!(error = %err, "Caller went away before the tracker replied");
    }
}

#[async_trait]
impl Actor<TrackerMsg> for ProgressTracker {
    async fn on_start(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        info!(
            actor = ctx.name(),
            job_id = %self.job_id,
            item = self.item,
            version = self.version,
            status = %self.progress.status,
            "Progress tracker started"
        );
        if self.version == 0 {
            self.record(JobEvent::ItemScheduled {
                job_id: self.job_id.clone(),
                item: self.item,
                tables: self.progress.table_names.iter().cloned().collect(),
            })
            .await
            .map_err(|e| ActorError::Internal(e.to_string()))?;
            self.persist()
                .await
                .map_err(|e| ActorError::Internal(e.to_string()))?;
        }
        Ok(())
    }

    async fn handle(&mut self, msg: TrackerMsg, _ctx: &ActorContext) -> Result<(), ActorError> {
        self.handle_msg(msg)
            .await
            .map_err(|e| ActorError::Internal(e.to_string()))
    }

    async fn on_stop(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        info!(
            actor = ctx.name(),
            job_id = %self.job_id,
            item = self.item,
            version = self.version,
            "Progress tracker stopped"
        );
        Ok(())
    }
}

/// Typed front of a running [`ProgressTracker`].
#[derive(Clone)]
pub struct TrackerHandle {
    actor: ActorRef<TrackerMsg>,
}

impl TrackerHandle {
    /// Reloads the item's last snapshot (or starts a fresh one) and spawns its
    /// tracker.
    pub async fn open<I, S>(
        job_id: &str,
        item: u32,
        tables: I,
        service: ProgressService,
        mailbox_capacity: usize,
    ) -> Result<(Self, JoinHandle<()>), JobError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
        let (mut progress, version) = match service.reload(job_id, item).await? {
            Some(record) => {
                info!(job_id, item, version = record.version, status = %record.progress.status, "Reloaded progress");
                (record.progress, record.version)
            }
            None => (JobItemProgress::new(tables.iter().cloned()), 0),
        };
        progress.table_names.extend(tables);
        if progress.status == JobStatus::Failed {
            // A rerun of a failed item resumes from its last checkpoints.
            info!(job_id, item, error = ?progress.error_message, "Retrying failed job item");
            progress.status = JobStatus::Preparing;
            progress.error_message = None;
        }

        let tracker = ProgressTracker::new(job_id, item, progress, version, service);
        let (actor, handle) = spawn_actor(
            format!("progress-{job_id}-{item}"),
            mailbox_capacity,
            tracker,
        );
        Ok((Self { actor }, handle))
    }

    pub async fn report(&self, event: ScanEvent) -> Result<(), ActorError> {
        self.actor.send(TrackerMsg::Scan(event)).await
    }

    /// A channel for scan workers plus the task relaying it into the
    /// tracker's mailbox. The task ends once every sender is dropped and all
    /// events were delivered.
    pub fn event_channel(&self, capacity: usize) -> (mpsc::Sender<ScanEvent>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ScanEvent>(capacity.max(1));
        let actor = self.actor.clone();
        let relay = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if actor.send(TrackerMsg::Scan(event)).await.is_err() {
                    warn!(actor = actor.name(), "Tracker gone; dropping scan events");
                    break;
                }
            }
        });
        (tx, relay)
    }

    pub async fn plan_ranges(&self, ranges: Vec<(String, String)>) -> Result<(), ActorError> {
        self.actor.send(TrackerMsg::RangesPlanned(ranges)).await
    }

    pub async fn transition(&self, status: JobStatus) -> Result<(), JobError> {
        self.actor
            .ask(|reply| TrackerMsg::Transition {
                status,
                error: None,
                reply,
            })
            .await?
    }

    /// Moves the item to `Failed`, recording `error` as its message.
    pub async fn fail(&self, error: impl Into<String>) -> Result<(), JobError> {
        let error = Some(error.into());
        self.actor
            .ask(|reply| TrackerMsg::Transition {
                status: JobStatus::Failed,
                error,
                reply,
            })
            .await?
    }

    pub async fn check_started(&self, total_records: i64) -> Result<(), ActorError> {
        self.actor
            .send(TrackerMsg::CheckStarted { total_records })
            .await
    }

    pub async fn table_checked(&self, result: TableCheckResult) -> Result<(), ActorError> {
        self.actor.send(TrackerMsg::TableChecked(result)).await
    }

    pub async fn check_finished(&self) -> Result<(), JobError> {
        self.actor.ask(TrackerMsg::CheckFinished).await?
    }

    pub async fn incremental(&self, progress: IncrementalProgress) -> Result<(), ActorError> {
        self.actor.send(TrackerMsg::Incremental(progress)).await
    }

    pub async fn heartbeat(&self) -> Result<(), ActorError> {
        self.actor.send(TrackerMsg::Heartbeat).await
    }

    pub async fn snapshot(&self) -> Result<JobItemProgress, ActorError> {
        self.actor.ask(TrackerMsg::Snapshot).await
    }

    pub async fn flush(&self) -> Result<(), JobError> {
        self.actor.ask(TrackerMsg::Flush).await?
    }
}
