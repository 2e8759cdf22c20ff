use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use perfrev_core::{Aggregate, AggregateRoot, DomainError, EmployeeId};
use perfrev_events::Event;

/// Aggregate root: an employee's position in the org chart.
///
/// Manager changes are recorded as events; the employee-directory projection
/// folds them into the edge set the hierarchy index is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    id: EmployeeId,
    full_name: String,
    manager_id: Option<EmployeeId>,
    active: bool,
    version: u64,
    created: bool,
}

impl Employee {
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn manager_id(&self) -> Option<EmployeeId> {
        self.manager_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: HireEmployee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireEmployee {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub manager_id: Option<EmployeeId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignManager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignManager {
    pub employee_id: EmployeeId,
    pub manager_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveManager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveManager {
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TerminateEmployee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateEmployee {
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeCommand {
    HireEmployee(HireEmployee),
    AssignManager(AssignManager),
    RemoveManager(RemoveManager),
    TerminateEmployee(TerminateEmployee),
}

/// Event: EmployeeHired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeHired {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub manager_id: Option<EmployeeId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ManagerAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAssigned {
    pub employee_id: EmployeeId,
    pub manager_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ManagerRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerRemoved {
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EmployeeTerminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTerminated {
    pub employee_id: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeEvent {
    EmployeeHired(EmployeeHired),
    ManagerAssigned(ManagerAssigned),
    ManagerRemoved(ManagerRemoved),
    EmployeeTerminated(EmployeeTerminated),
}

impl Event for EmployeeEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "org.employee.hired",
        "org.employee.manager_assigned",
        "org.employee.manager_removed",
        "org.employee.terminated",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::EmployeeHired(_) => "org.employee.hired",
            EmployeeEvent::ManagerAssigned(_) => "org.employee.manager_assigned",
            EmployeeEvent::ManagerRemoved(_) => "org.employee.manager_removed",
            EmployeeEvent::EmployeeTerminated(_) => "org.employee.terminated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EmployeeEvent::EmployeeHired(e) => e.occurred_at,
            EmployeeEvent::ManagerAssigned(e) => e.occurred_at,
            EmployeeEvent::ManagerRemoved(e) => e.occurred_at,
            EmployeeEvent::EmployeeTerminated(e) => e.occurred_at,
        }
    }
}

impl EmployeeEvent {
    pub fn employee_id(&self) -> EmployeeId {
        match self {
            EmployeeEvent::EmployeeHired(e) => e.employee_id,
            EmployeeEvent::ManagerAssigned(e) => e.employee_id,
            EmployeeEvent::ManagerRemoved(e) => e.employee_id,
            EmployeeEvent::EmployeeTerminated(e) => e.employee_id,
        }
    }
}

impl Aggregate for Employee {
    const AGGREGATE_TYPE: &'static str = "org.employee";

    type Command = EmployeeCommand;
    type Event = EmployeeEvent;

    fn empty(id: EmployeeId) -> Self {
        Self {
            id,
            full_name: String::new(),
            manager_id: None,
            active: false,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EmployeeEvent::EmployeeHired(e) => {
                self.full_name = e.full_name.clone();
                self.manager_id = e.manager_id;
                self.active = true;
                self.created = true;
            }
            EmployeeEvent::ManagerAssigned(e) => {
                self.manager_id = Some(e.manager_id);
            }
            EmployeeEvent::ManagerRemoved(_) => {
                self.manager_id = None;
            }
            EmployeeEvent::EmployeeTerminated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            EmployeeCommand::HireEmployee(cmd) => self.handle_hire(cmd),
            EmployeeCommand::AssignManager(cmd) => self.handle_assign(cmd),
            EmployeeCommand::RemoveManager(cmd) => self.handle_remove(cmd),
            EmployeeCommand::TerminateEmployee(cmd) => self.handle_terminate(cmd),
        }
    }
}

impl Employee {
    fn ensure_active(&self, employee_id: EmployeeId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != employee_id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        if !self.active {
            return Err(DomainError::rule("employee has been terminated"));
        }
        Ok(())
    }

    fn handle_hire(&self, cmd: &HireEmployee) -> Result<Vec<EmployeeEvent>, DomainError> {
        if cmd.employee_id != self.id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        if self.created {
            return Err(DomainError::rule("employee already exists"));
        }
        if cmd.full_name.trim().is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }
        if cmd.manager_id == Some(cmd.employee_id) {
            return Err(DomainError::rule("an employee cannot manage themselves"));
        }

        Ok(vec![EmployeeEvent::EmployeeHired(EmployeeHired {
            employee_id: cmd.employee_id,
            full_name: cmd.full_name.trim().to_string(),
            manager_id: cmd.manager_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignManager) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_active(cmd.employee_id)?;
        if cmd.manager_id == cmd.employee_id {
            return Err(DomainError::rule("an employee cannot manage themselves"));
        }
        if self.manager_id == Some(cmd.manager_id) {
            return Ok(vec![]);
        }

        Ok(vec![EmployeeEvent::ManagerAssigned(ManagerAssigned {
            employee_id: cmd.employee_id,
            manager_id: cmd.manager_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveManager) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_active(cmd.employee_id)?;
        if self.manager_id.is_none() {
            return Ok(vec![]);
        }

        Ok(vec![EmployeeEvent::ManagerRemoved(ManagerRemoved {
            employee_id: cmd.employee_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_terminate(
        &self,
        cmd: &TerminateEmployee,
    ) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_active(cmd.employee_id)?;

        Ok(vec![EmployeeEvent::EmployeeTerminated(EmployeeTerminated {
            employee_id: cmd.employee_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
