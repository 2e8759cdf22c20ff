//! Projection replay: rebuild a read model from the global event log.
//!
//! Each run is a `ProjectionReplay` aggregate, so its lifecycle and progress
//! are durable and readable after the fact. The run itself happens on a
//! spawned task:
//!
//! 1. Snapshot the log head and record it as the run's total
//! 2. Clear the projection's read model
//! 3. Fold the log in batches; after each batch record progress, then honor cancellation
//!
//! Any failure along the way is recorded on the aggregate (`Fail`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use perfrev_core::{Aggregate, AggregateId, UserId};
use perfrev_events::{Projection, ProjectionError};
use perfrev_replay::{
    CancelReplay, FailReplay, ProjectionReplay, ReplayCommand, ReplayEvent, ReplayId,
    ReplayStatus, ReportProgress, SetTotalEvents, StartReplay,
};

use crate::config::InfraConfig;
use crate::event_store::{EventLog, EventStore, EventStoreError};
use crate::repository::{AggregateRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("projection '{projection}' already has a running replay ({replay_id})")]
    AlreadyRunning {
        projection: String,
        replay_id: ReplayId,
    },

    #[error("unknown projection: {0}")]
    UnknownProjection(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("event store error: {0}")]
    Store(#[from] EventStoreError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("event log ended at position {position}, before head {head}")]
    LogTruncated { position: u64, head: u64 },

    #[error("replay task failed: {0}")]
    Task(String),

    #[error("replay registry lock poisoned")]
    Poisoned,
}

/// Cooperative cancellation flag shared by a run and its handle.
#[derive(Debug, Default)]
struct CancelSignal {
    requested: AtomicBool,
    requested_by: Mutex<Option<UserId>>,
}

impl CancelSignal {
    fn request(&self, by: UserId) {
        self.requested_by
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(by);
        self.requested.store(true, Ordering::Release);
    }

    fn requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    fn requested_by(&self) -> Option<UserId> {
        *self.requested_by.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for controlling and awaiting one replay run.
#[derive(Debug)]
pub struct ReplayHandle {
    replay_id: ReplayId,
    signal: Arc<CancelSignal>,
    task: JoinHandle<Result<ReplayStatus, ReplayError>>,
}

impl ReplayHandle {
    pub fn replay_id(&self) -> ReplayId {
        self.replay_id
    }

    /// Ask the run to stop after the batch in flight.
    pub fn cancel(&self, cancelled_by: UserId) {
        self.signal.request(cancelled_by);
    }

    /// Wait for the run to finish; returns the terminal status it recorded.
    pub async fn wait(self) -> Result<ReplayStatus, ReplayError> {
        self.task
            .await
            .map_err(|e| ReplayError::Task(e.to_string()))?
    }
}

/// Starts, tracks and cancels projection replays.
///
/// At most one non-terminal replay exists per projection name. The rule is
/// checked against the durable `ProjectionReplay` streams in the log, so it
/// holds across coordinators sharing a store and across restarts:
///
/// 1. Refuse if a non-terminal replay for the projection is already recorded
/// 2. Record `Start`
/// 3. Re-check; if an earlier non-terminal replay won a concurrent race,
///    record `Fail` on ours and refuse
pub struct ReplayCoordinator<S> {
    store: Arc<S>,
    repository: Arc<AggregateRepository<Arc<S>>>,
    projections: HashMap<String, Arc<dyn Projection>>,
    signals: Mutex<HashMap<ReplayId, Arc<CancelSignal>>>,
    batch_size: usize,
}

impl<S> ReplayCoordinator<S>
where
    S: EventStore + EventLog + 'static,
{
    pub fn new(store: Arc<S>, batch_size: usize) -> Self {
        Self {
            repository: Arc::new(AggregateRepository::new(Arc::clone(&store))),
            store,
            projections: HashMap::new(),
            signals: Mutex::new(HashMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(store: Arc<S>, config: &InfraConfig) -> Self {
        Self::new(store, config.replay_batch_size)
    }

    pub fn with_projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projections.insert(projection.name().to_string(), projection);
        self
    }

    pub fn projection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.projections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Start rebuilding `projection` on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(
        &self,
        projection: &str,
        initiated_by: UserId,
        reason: impl Into<String>,
    ) -> Result<ReplayHandle, ReplayError> {
        let target = self
            .projections
            .get(projection)
            .cloned()
            .ok_or_else(|| ReplayError::UnknownProjection(projection.to_string()))?;

        if let Some(&replay_id) = self.unfinished_replays(projection).await?.first() {
            return Err(ReplayError::AlreadyRunning {
                projection: projection.to_string(),
                replay_id,
            });
        }

        let replay_id = ReplayId::new(AggregateId::new());
        self.repository.execute::<ProjectionReplay>(
            replay_id,
            &ReplayCommand::Start(StartReplay {
                replay_id,
                projection: projection.to_string(),
                initiated_by,
                reason: reason.into(),
                occurred_at: Utc::now(),
            }),
        )?;

        let winner = self.unfinished_replays(projection).await?.first().copied();
        if let Some(winner) = winner.filter(|w| *w != replay_id) {
            warn!(
                replay_id = %replay_id,
                running = %winner,
                projection,
                "concurrent replay start lost the race"
            );
            self.repository.execute::<ProjectionReplay>(
                replay_id,
                &ReplayCommand::Fail(FailReplay {
                    replay_id,
                    error: format!("replay {winner} of '{projection}' was started first"),
                    occurred_at: Utc::now(),
                }),
            )?;
            return Err(ReplayError::AlreadyRunning {
                projection: projection.to_string(),
                replay_id: winner,
            });
        }

        let signal = Arc::new(CancelSignal::default());
        self.signals
            .lock()
            .map_err(|_| ReplayError::Poisoned)?
            .insert(replay_id, Arc::clone(&signal));

        info!(
            replay_id = %replay_id,
            projection,
            initiated_by = %initiated_by,
            "projection replay started"
        );

        let run = ReplayRun {
            replay_id,
            initiated_by,
            projection: target,
            log: Arc::clone(&self.store),
            repository: Arc::clone(&self.repository),
            signal: Arc::clone(&signal),
            batch_size: self.batch_size,
        };
        let task = tokio::spawn(run.supervise());

        Ok(ReplayHandle {
            replay_id,
            signal,
            task,
        })
    }

    /// Cancel a replay by id.
    ///
    /// A run this coordinator is driving is signalled and stops after its
    /// current batch. Otherwise (another process, or a run that died without
    /// finishing) the cancel is recorded directly, which is a no-op for an
    /// already cancelled replay and an error for other terminal ones.
    pub fn cancel(&self, replay_id: ReplayId, cancelled_by: UserId) -> Result<(), ReplayError> {
        let signal = self
            .signals
            .lock()
            .map_err(|_| ReplayError::Poisoned)?
            .get(&replay_id)
            .cloned();

        if let Some(signal) = signal {
            if !self.status(replay_id)?.is_terminal() {
                signal.request(cancelled_by);
                return Ok(());
            }
        }

        self.repository.execute::<ProjectionReplay>(
            replay_id,
            &ReplayCommand::Cancel(CancelReplay {
                replay_id,
                cancelled_by,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Current durable state of a replay.
    pub fn replay(&self, replay_id: ReplayId) -> Result<ProjectionReplay, ReplayError> {
        Ok(self.repository.load::<ProjectionReplay>(replay_id)?.aggregate)
    }

    pub fn status(&self, replay_id: ReplayId) -> Result<ReplayStatus, ReplayError> {
        Ok(self.replay(replay_id)?.status())
    }

    /// Non-terminal replays of `projection` recorded in the log, earliest start first.
    async fn unfinished_replays(&self, projection: &str) -> Result<Vec<ReplayId>, ReplayError> {
        let mut started = Vec::new();
        let mut position = 0u64;

        loop {
            let batch = self.store.read_global(position + 1, self.batch_size).await?;
            let Some(last) = batch.last() else {
                break;
            };
            position = last.global_position;

            for stored in &batch {
                if stored.aggregate_type != ProjectionReplay::AGGREGATE_TYPE {
                    continue;
                }
                let event: ReplayEvent =
                    serde_json::from_value(stored.payload.clone()).map_err(|e| {
                        RepositoryError::Corrupt {
                            aggregate_id: stored.aggregate_id,
                            reason: format!("undecodable '{}' payload: {e}", stored.event_type),
                        }
                    })?;
                if let ReplayEvent::ReplayStarted(e) = event {
                    if e.projection == projection {
                        started.push(e.replay_id);
                    }
                }
            }
        }

        let mut unfinished = Vec::new();
        for replay_id in started {
            if !self.status(replay_id)?.is_terminal() {
                unfinished.push(replay_id);
            }
        }
        Ok(unfinished)
    }
}

struct ReplayRun<S> {
    replay_id: ReplayId,
    initiated_by: UserId,
    projection: Arc<dyn Projection>,
    log: Arc<S>,
    repository: Arc<AggregateRepository<Arc<S>>>,
    signal: Arc<CancelSignal>,
    batch_size: usize,
}

impl<S> ReplayRun<S>
where
    S: EventStore + EventLog + 'static,
{
    /// Drive the run on its own task so a panic inside a projection is still
    /// recorded as `Fail` instead of leaving the replay Running.
    async fn supervise(self) -> Result<ReplayStatus, ReplayError> {
        let replay_id = self.replay_id;
        let repository = Arc::clone(&self.repository);

        match tokio::spawn(self.run()).await {
            Ok(result) => result,
            Err(join) => {
                let reason = if join.is_panic() {
                    "replay task panicked"
                } else {
                    "replay task was aborted"
                };
                error!(replay_id = %replay_id, error = %join, reason, "replay task did not finish");
                repository.execute::<ProjectionReplay>(
                    replay_id,
                    &ReplayCommand::Fail(FailReplay {
                        replay_id,
                        error: reason.to_string(),
                        occurred_at: Utc::now(),
                    }),
                )?;
                Ok(ReplayStatus::Failed)
            }
        }
    }

    async fn run(self) -> Result<ReplayStatus, ReplayError> {
        match self.drive().await {
            Ok(status) => {
                info!(replay_id = %self.replay_id, status = %status, "projection replay finished");
                Ok(status)
            }
            Err(err) => {
                error!(replay_id = %self.replay_id, error = %err, "projection replay failed");
                self.record(ReplayCommand::Fail(FailReplay {
                    replay_id: self.replay_id,
                    error: err.to_string(),
                    occurred_at: Utc::now(),
                }))?;
                Ok(ReplayStatus::Failed)
            }
        }
    }

    async fn drive(&self) -> Result<ReplayStatus, ReplayError> {
        let head = self.log.head_position().await?;
        self.record(ReplayCommand::SetTotalEvents(SetTotalEvents {
            replay_id: self.replay_id,
            total_events: head,
            occurred_at: Utc::now(),
        }))?;

        self.projection.clear()?;

        let mut position = 0u64;
        while position < head {
            let batch = self.log.read_global(position + 1, self.batch_size).await?;
            let mut advanced = false;
            for stored in batch.iter().take_while(|e| e.global_position <= head) {
                if self.projection.subscribes_to(&stored.aggregate_type) {
                    self.projection.apply(&stored.to_envelope())?;
                }
                position = stored.global_position;
                advanced = true;
            }
            if !advanced {
                return Err(ReplayError::LogTruncated { position, head });
            }

            self.record(ReplayCommand::ReportProgress(ReportProgress {
                replay_id: self.replay_id,
                processed_events: position,
                occurred_at: Utc::now(),
            }))?;
            debug!(replay_id = %self.replay_id, processed = position, total = head, "replay batch applied");

            if position >= head {
                return Ok(ReplayStatus::Completed);
            }

            if self.signal.requested() {
                let cancelled_by = self.signal.requested_by().unwrap_or(self.initiated_by);
                self.record(ReplayCommand::Cancel(CancelReplay {
                    replay_id: self.replay_id,
                    cancelled_by,
                    occurred_at: Utc::now(),
                }))?;
                warn!(replay_id = %self.replay_id, processed = position, "projection replay cancelled");
                return Ok(ReplayStatus::Cancelled);
            }
        }

        // Empty log: nothing to fold, completion is a zero-progress report.
        self.record(ReplayCommand::ReportProgress(ReportProgress {
            replay_id: self.replay_id,
            processed_events: 0,
            occurred_at: Utc::now(),
        }))?;
        Ok(ReplayStatus::Completed)
    }

    fn record(&self, command: ReplayCommand) -> Result<(), ReplayError> {
        self.repository
            .execute::<ProjectionReplay>(self.replay_id, &command)?;
        Ok(())
    }
}
