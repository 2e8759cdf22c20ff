use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use perfrev_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use perfrev_events::Event;

use crate::status::ReplayStatus;

/// Projection replay identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayId(pub AggregateId);

impl ReplayId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl From<ReplayId> for AggregateId {
    fn from(value: ReplayId) -> Self {
        value.0
    }
}

impl core::fmt::Display for ReplayId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: one replay run of one projection.
///
/// Completion has no event of its own: applying a `ProgressUpdated` whose
/// processed count reaches the known total moves the run to `Completed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionReplay {
    id: ReplayId,
    status: ReplayStatus,
    projection: String,
    initiated_by: Option<UserId>,
    reason: String,
    started_at: Option<DateTime<Utc>>,
    total_events: Option<u64>,
    processed_events: u64,
    last_progress_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    cancelled_by: Option<UserId>,
    error: Option<String>,
    version: u64,
}

/// Read-side view of a replay run, suitable for operator dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayProgress {
    pub replay_id: ReplayId,
    pub projection: String,
    pub status: ReplayStatus,
    pub total_events: Option<u64>,
    pub processed_events: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ReplayProgress {
    /// Completion percentage, once the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self.total_events {
            Some(0) => Some(100.0),
            Some(total) => Some(self.processed_events as f64 * 100.0 / total as f64),
            None => None,
        }
    }
}

impl ProjectionReplay {
    pub fn id_typed(&self) -> ReplayId {
        self.id
    }

    pub fn status(&self) -> ReplayStatus {
        self.status
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn initiated_by(&self) -> Option<UserId> {
        self.initiated_by
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn total_events(&self) -> Option<u64> {
        self.total_events
    }

    pub fn processed_events(&self) -> u64 {
        self.processed_events
    }

    pub fn last_progress_at(&self) -> Option<DateTime<Utc>> {
        self.last_progress_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn cancelled_by(&self) -> Option<UserId> {
        self.cancelled_by
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress(&self) -> ReplayProgress {
        ReplayProgress {
            replay_id: self.id,
            projection: self.projection.clone(),
            status: self.status,
            total_events: self.total_events,
            processed_events: self.processed_events,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error: self.error.clone(),
        }
    }
}

impl AggregateRoot for ProjectionReplay {
    type Id = ReplayId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: StartReplay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReplay {
    pub replay_id: ReplayId,
    pub projection: String,
    pub initiated_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetTotalEvents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTotalEvents {
    pub replay_id: ReplayId,
    pub total_events: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReportProgress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportProgress {
    pub replay_id: ReplayId,
    pub processed_events: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelReplay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReplay {
    pub replay_id: ReplayId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FailReplay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailReplay {
    pub replay_id: ReplayId,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayCommand {
    Start(StartReplay),
    SetTotalEvents(SetTotalEvents),
    ReportProgress(ReportProgress),
    Cancel(CancelReplay),
    Fail(FailReplay),
}

/// Event: ReplayStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStarted {
    pub replay_id: ReplayId,
    pub projection: String,
    pub initiated_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TotalEventsSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalEventsSet {
    pub replay_id: ReplayId,
    pub total_events: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProgressUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdated {
    pub replay_id: ReplayId,
    pub processed_events: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReplayCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCancelled {
    pub replay_id: ReplayId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReplayFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFailed {
    pub replay_id: ReplayId,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayEvent {
    ReplayStarted(ReplayStarted),
    TotalEventsSet(TotalEventsSet),
    ProgressUpdated(ProgressUpdated),
    ReplayCancelled(ReplayCancelled),
    ReplayFailed(ReplayFailed),
}

impl Event for ReplayEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "replay.projection.started",
        "replay.projection.total_events_set",
        "replay.projection.progress_updated",
        "replay.projection.cancelled",
        "replay.projection.failed",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            ReplayEvent::ReplayStarted(_) => "replay.projection.started",
            ReplayEvent::TotalEventsSet(_) => "replay.projection.total_events_set",
            ReplayEvent::ProgressUpdated(_) => "replay.projection.progress_updated",
            ReplayEvent::ReplayCancelled(_) => "replay.projection.cancelled",
            ReplayEvent::ReplayFailed(_) => "replay.projection.failed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReplayEvent::ReplayStarted(e) => e.occurred_at,
            ReplayEvent::TotalEventsSet(e) => e.occurred_at,
            ReplayEvent::ProgressUpdated(e) => e.occurred_at,
            ReplayEvent::ReplayCancelled(e) => e.occurred_at,
            ReplayEvent::ReplayFailed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ProjectionReplay {
    const AGGREGATE_TYPE: &'static str = "replay.projection";

    type Command = ReplayCommand;
    type Event = ReplayEvent;

    fn empty(id: ReplayId) -> Self {
        Self {
            id,
            status: ReplayStatus::NotStarted,
            projection: String::new(),
            initiated_by: None,
            reason: String::new(),
            started_at: None,
            total_events: None,
            processed_events: 0,
            last_progress_at: None,
            finished_at: None,
            cancelled_by: None,
            error: None,
            version: 0,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReplayEvent::ReplayStarted(e) => {
                self.status = ReplayStatus::Running;
                self.projection = e.projection.clone();
                self.initiated_by = Some(e.initiated_by);
                self.reason = e.reason.clone();
                self.started_at = Some(e.occurred_at);
            }
            ReplayEvent::TotalEventsSet(e) => {
                self.total_events = Some(e.total_events);
            }
            ReplayEvent::ProgressUpdated(e) => {
                self.processed_events = e.processed_events;
                self.last_progress_at = Some(e.occurred_at);
                if self.total_events == Some(e.processed_events) {
                    self.status = ReplayStatus::Completed;
                    self.finished_at = Some(e.occurred_at);
                }
            }
            ReplayEvent::ReplayCancelled(e) => {
                self.status = ReplayStatus::Cancelled;
                self.cancelled_by = Some(e.cancelled_by);
                self.finished_at = Some(e.occurred_at);
            }
            ReplayEvent::ReplayFailed(e) => {
                self.status = ReplayStatus::Failed;
                self.error = Some(e.error.clone());
                self.finished_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            ReplayCommand::Start(cmd) => self.handle_start(cmd),
            ReplayCommand::SetTotalEvents(cmd) => self.handle_set_total(cmd),
            ReplayCommand::ReportProgress(cmd) => self.handle_progress(cmd),
            ReplayCommand::Cancel(cmd) => self.handle_cancel(cmd),
            ReplayCommand::Fail(cmd) => self.handle_fail(cmd),
        }
    }
}

impl ProjectionReplay {
    /// Validate a move against the transition table.
    fn ensure_transition(&self, next: ReplayStatus, action: &str) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::transition(format!(
                "cannot {action} a replay that is {} (target: {next})",
                self.status
            )))
        }
    }

    /// Every command except `Start` operates on a running replay.
    fn ensure_running(&self, action: &str) -> Result<(), DomainError> {
        if self.status != ReplayStatus::Running {
            return Err(DomainError::transition(format!(
                "cannot {action} a replay that is {}",
                self.status
            )));
        }
        Ok(())
    }

    fn ensure_replay_id(&self, replay_id: ReplayId) -> Result<(), DomainError> {
        if self.id != replay_id {
            return Err(DomainError::invariant("replay_id mismatch"));
        }
        Ok(())
    }

    fn handle_start(&self, cmd: &StartReplay) -> Result<Vec<ReplayEvent>, DomainError> {
        self.ensure_replay_id(cmd.replay_id)?;
        self.ensure_transition(ReplayStatus::Running, "start")?;
        if self.status != ReplayStatus::NotStarted {
            return Err(DomainError::transition("replay has already been started"));
        }
        if cmd.projection.trim().is_empty() {
            return Err(DomainError::validation("projection name cannot be empty"));
        }

        Ok(vec![ReplayEvent::ReplayStarted(ReplayStarted {
            replay_id: cmd.replay_id,
            projection: cmd.projection.clone(),
            initiated_by: cmd.initiated_by,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_total(&self, cmd: &SetTotalEvents) -> Result<Vec<ReplayEvent>, DomainError> {
        self.ensure_replay_id(cmd.replay_id)?;
        self.ensure_running("set the total of")?;
        self.ensure_transition(ReplayStatus::Running, "set the total of")?;
        if self.total_events.is_some() {
            return Err(DomainError::transition("total events already set"));
        }
        if cmd.total_events < self.processed_events {
            return Err(DomainError::invariant(format!(
                "total {} is below already processed {}",
                cmd.total_events, self.processed_events
            )));
        }

        Ok(vec![ReplayEvent::TotalEventsSet(TotalEventsSet {
            replay_id: cmd.replay_id,
            total_events: cmd.total_events,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_progress(&self, cmd: &ReportProgress) -> Result<Vec<ReplayEvent>, DomainError> {
        self.ensure_replay_id(cmd.replay_id)?;

        // Counter invariants are checked before the state: a backwards report
        // is a caller bug regardless of where the run is.
        if cmd.processed_events < self.processed_events {
            return Err(DomainError::invariant(format!(
                "processed count moved backwards ({} -> {})",
                self.processed_events, cmd.processed_events
            )));
        }
        if let Some(total) = self.total_events {
            if cmd.processed_events > total {
                return Err(DomainError::invariant(format!(
                    "processed count {} exceeds total {total}",
                    cmd.processed_events
                )));
            }
        }

        let next = if self.total_events == Some(cmd.processed_events) {
            ReplayStatus::Completed
        } else {
            ReplayStatus::Running
        };
        self.ensure_running("report progress on")?;
        self.ensure_transition(next, "report progress on")?;

        Ok(vec![ReplayEvent::ProgressUpdated(ProgressUpdated {
            replay_id: cmd.replay_id,
            processed_events: cmd.processed_events,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelReplay) -> Result<Vec<ReplayEvent>, DomainError> {
        self.ensure_replay_id(cmd.replay_id)?;
        if self.status == ReplayStatus::Cancelled {
            return Ok(vec![]);
        }
        self.ensure_running("cancel")?;
        self.ensure_transition(ReplayStatus::Cancelled, "cancel")?;

        Ok(vec![ReplayEvent::ReplayCancelled(ReplayCancelled {
            replay_id: cmd.replay_id,
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fail(&self, cmd: &FailReplay) -> Result<Vec<ReplayEvent>, DomainError> {
        self.ensure_replay_id(cmd.replay_id)?;
        self.ensure_running("fail")?;
        self.ensure_transition(ReplayStatus::Failed, "fail")?;

        Ok(vec![ReplayEvent::ReplayFailed(ReplayFailed {
            replay_id: cmd.replay_id,
            error: cmd.error.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
