use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use perfrev_core::EmployeeId;

/// Raw `report -> manager` relationship as supplied by a directory source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerEdge {
    pub employee_id: EmployeeId,
    pub manager_id: Option<EmployeeId>,
}

impl ManagerEdge {
    pub fn new(employee_id: EmployeeId, manager_id: Option<EmployeeId>) -> Self {
        Self {
            employee_id,
            manager_id,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("employee directory unavailable: {0}")]
    Unavailable(String),
}

/// Source of manager edges the hierarchy index is built from.
pub trait EmployeeDirectory: Send + Sync {
    fn manager_edges(&self) -> Result<Vec<ManagerEdge>, DirectoryError>;
}

impl<D> EmployeeDirectory for Arc<D>
where
    D: EmployeeDirectory + ?Sized,
{
    fn manager_edges(&self) -> Result<Vec<ManagerEdge>, DirectoryError> {
        (**self).manager_edges()
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    edges: RwLock<BTreeMap<EmployeeId, Option<EmployeeId>>>,
}

impl InMemoryEmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later edges for the same employee replace earlier ones.
    pub fn from_edges(edges: impl IntoIterator<Item = ManagerEdge>) -> Self {
        Self {
            edges: RwLock::new(
                edges
                    .into_iter()
                    .map(|edge| (edge.employee_id, edge.manager_id))
                    .collect(),
            ),
        }
    }

    pub fn set_manager(
        &self,
        employee_id: EmployeeId,
        manager_id: Option<EmployeeId>,
    ) -> Result<(), DirectoryError> {
        self.edges
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(employee_id, manager_id);
        Ok(())
    }

    fn poisoned() -> DirectoryError {
        DirectoryError::Unavailable("lock poisoned".to_string())
    }
}

impl EmployeeDirectory for InMemoryEmployeeDirectory {
    fn manager_edges(&self) -> Result<Vec<ManagerEdge>, DirectoryError> {
        let edges = self
            .edges
            .read()
            .map_err(|_| Self::poisoned())?;
        Ok(edges
            .iter()
            .map(|(employee_id, manager_id)| ManagerEdge::new(*employee_id, *manager_id))
            .collect())
    }
}
