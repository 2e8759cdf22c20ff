//! Employee directory read model.
//!
//! Folds `org.employee` events into one record per employee. It doubles as
//! the default `EmployeeDirectory` the hierarchy cache rebuilds from.

use serde::Serialize;
use serde_json::Value as JsonValue;

use perfrev_core::{Aggregate, EmployeeId};
use perfrev_events::{Event, EventEnvelope, Projection, ProjectionError};
use perfrev_org::{DirectoryError, Employee, EmployeeDirectory, EmployeeEvent, ManagerEdge};

use crate::projections::cursor::StreamCursors;
use crate::read_model::ReadModelStore;

pub const EMPLOYEE_DIRECTORY_PROJECTION: &str = "org.employee_directory";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeRecord {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub manager_id: Option<EmployeeId>,
    pub active: bool,
}

#[derive(Debug)]
pub struct EmployeeDirectoryProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> EmployeeDirectoryProjection<S>
where
    S: ReadModelStore<EmployeeId, EmployeeRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, employee_id: &EmployeeId) -> Option<EmployeeRecord> {
        self.store.get(EMPLOYEE_DIRECTORY_PROJECTION, employee_id)
    }

    pub fn list(&self) -> Vec<EmployeeRecord> {
        self.store.list(EMPLOYEE_DIRECTORY_PROJECTION)
    }

    fn existing(&self, employee_id: EmployeeId) -> Result<EmployeeRecord, ProjectionError> {
        self.get(&employee_id).ok_or_else(|| {
            ProjectionError::Store(format!("no directory record for employee {employee_id}"))
        })
    }

    fn upsert(&self, record: EmployeeRecord) -> Result<(), ProjectionError> {
        self.store
            .upsert(EMPLOYEE_DIRECTORY_PROJECTION, record.employee_id, record)
            .map_err(|e| ProjectionError::Store(e.to_string()))
    }
}

impl<S> Projection for EmployeeDirectoryProjection<S>
where
    S: ReadModelStore<EmployeeId, EmployeeRecord>,
{
    fn name(&self) -> &str {
        EMPLOYEE_DIRECTORY_PROJECTION
    }

    fn subscribes_to(&self, aggregate_type: &str) -> bool {
        aggregate_type == Employee::AGGREGATE_TYPE
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if !self.subscribes_to(envelope.aggregate_type()) {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if !self.cursors.admit(aggregate_id, seq)? {
            return Ok(());
        }

        let decode_error = |message: String| ProjectionError::Decode {
            event_type: envelope.event_type().to_string(),
            message,
        };
        if !EmployeeEvent::is_known_type(envelope.event_type()) {
            return Err(decode_error("unknown employee event type".to_string()));
        }
        let ev: EmployeeEvent = envelope.decode().map_err(|e| decode_error(e.to_string()))?;
        if perfrev_core::AggregateId::from(ev.employee_id()) != aggregate_id {
            return Err(decode_error(
                "payload employee_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            EmployeeEvent::EmployeeHired(e) => {
                self.upsert(EmployeeRecord {
                    employee_id: e.employee_id,
                    full_name: e.full_name,
                    manager_id: e.manager_id,
                    active: true,
                })?;
            }
            EmployeeEvent::ManagerAssigned(e) => {
                let mut record = self.existing(e.employee_id)?;
                record.manager_id = Some(e.manager_id);
                self.upsert(record)?;
            }
            EmployeeEvent::ManagerRemoved(e) => {
                let mut record = self.existing(e.employee_id)?;
                record.manager_id = None;
                self.upsert(record)?;
            }
            EmployeeEvent::EmployeeTerminated(e) => {
                let mut record = self.existing(e.employee_id)?;
                record.active = false;
                self.upsert(record)?;
            }
        }

        self.cursors.advance(aggregate_id, seq)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ProjectionError> {
        self.store
            .clear(EMPLOYEE_DIRECTORY_PROJECTION)
            .map_err(|e| ProjectionError::Store(e.to_string()))?;
        self.cursors.clear()?;
        Ok(())
    }
}

/// Every known employee contributes one edge, terminated ones included, so a
/// departed manager does not silently cut their reports off from the chain above.
impl<S> EmployeeDirectory for EmployeeDirectoryProjection<S>
where
    S: ReadModelStore<EmployeeId, EmployeeRecord>,
{
    fn manager_edges(&self) -> Result<Vec<ManagerEdge>, DirectoryError> {
        Ok(self
            .list()
            .into_iter()
            .map(|record| ManagerEdge::new(record.employee_id, record.manager_id))
            .collect())
    }
}
