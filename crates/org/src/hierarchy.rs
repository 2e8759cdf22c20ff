//! Manager/report queries over the org chart.
//!
//! The org chart is nominally a forest, but the index is built from external
//! data and may contain cycles. Every traversal carries a visited set.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::warn;

use perfrev_core::{DomainError, DomainResult, EmployeeId};

use crate::directory::ManagerEdge;

/// Read-only "who reports to whom" queries used by authorization checks.
pub trait HierarchyResolver: Send + Sync {
    /// `employee`'s manager edge points directly at `manager`.
    fn is_direct_manager_of(&self, manager: EmployeeId, employee: EmployeeId) -> bool;

    /// `lead` is reached from `employee` by following manager edges upward
    /// zero or more times.
    ///
    /// Fails with `HierarchyCycleDetected` if the chain above `employee`
    /// loops, whether or not `lead` lies on it.
    fn is_in_hierarchy_of(&self, lead: EmployeeId, employee: EmployeeId) -> DomainResult<bool>;

    /// Employees whose manager is `manager` (one hop).
    fn direct_report_ids(&self, manager: EmployeeId) -> BTreeSet<EmployeeId>;

    /// Everyone below `lead`, transitively; `lead` itself is excluded.
    /// Empty when the chain above `lead` loops.
    fn team_hierarchy_ids(&self, lead: EmployeeId) -> BTreeSet<EmployeeId>;
}

impl<R> HierarchyResolver for Arc<R>
where
    R: HierarchyResolver + ?Sized,
{
    fn is_direct_manager_of(&self, manager: EmployeeId, employee: EmployeeId) -> bool {
        (**self).is_direct_manager_of(manager, employee)
    }

    fn is_in_hierarchy_of(&self, lead: EmployeeId, employee: EmployeeId) -> DomainResult<bool> {
        (**self).is_in_hierarchy_of(lead, employee)
    }

    fn direct_report_ids(&self, manager: EmployeeId) -> BTreeSet<EmployeeId> {
        (**self).direct_report_ids(manager)
    }

    fn team_hierarchy_ids(&self, lead: EmployeeId) -> BTreeSet<EmployeeId> {
        (**self).team_hierarchy_ids(lead)
    }
}

/// Indexed manager edges: forward (`report -> manager`) and reverse
/// (`manager -> reports`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyIndex {
    managers: HashMap<EmployeeId, EmployeeId>,
    reports: HashMap<EmployeeId, BTreeSet<EmployeeId>>,
}

impl HierarchyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from directory edges.
    ///
    /// An employee listed twice with the same manager is accepted; listed with
    /// two different managers is rejected.
    pub fn from_edges(edges: impl IntoIterator<Item = ManagerEdge>) -> DomainResult<Self> {
        let mut index = Self::new();
        let mut seen: HashMap<EmployeeId, Option<EmployeeId>> = HashMap::new();

        for edge in edges {
            match seen.get(&edge.employee_id) {
                Some(existing) if *existing != edge.manager_id => {
                    return Err(DomainError::validation(format!(
                        "employee {} has conflicting manager edges",
                        edge.employee_id
                    )));
                }
                Some(_) => continue,
                None => {
                    seen.insert(edge.employee_id, edge.manager_id);
                }
            }

            if let Some(manager_id) = edge.manager_id {
                index.managers.insert(edge.employee_id, manager_id);
                index
                    .reports
                    .entry(manager_id)
                    .or_default()
                    .insert(edge.employee_id);
            }
        }

        Ok(index)
    }

    pub fn manager_of(&self, employee: EmployeeId) -> Option<EmployeeId> {
        self.managers.get(&employee).copied()
    }

    /// Number of employees that have a manager.
    pub fn edge_count(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// `employee` and everyone above it, up to the root.
    fn chain_of(&self, employee: EmployeeId) -> DomainResult<HashSet<EmployeeId>> {
        let mut visited = HashSet::from([employee]);
        let mut current = employee;

        while let Some(manager) = self.manager_of(current) {
            if !visited.insert(manager) {
                warn!(
                    employee = %employee,
                    revisited = %manager,
                    "manager chain loops back on itself"
                );
                return Err(DomainError::cycle(format!(
                    "manager chain of {employee} revisits {manager}"
                )));
            }
            current = manager;
        }

        Ok(visited)
    }
}

impl HierarchyResolver for HierarchyIndex {
    fn is_direct_manager_of(&self, manager: EmployeeId, employee: EmployeeId) -> bool {
        self.managers.get(&employee) == Some(&manager)
    }

    fn is_in_hierarchy_of(&self, lead: EmployeeId, employee: EmployeeId) -> DomainResult<bool> {
        // The whole chain is walked even when `lead` shows up early: a chain
        // that loops is never evidence of a relationship.
        Ok(self.chain_of(employee)?.contains(&lead))
    }

    fn direct_report_ids(&self, manager: EmployeeId) -> BTreeSet<EmployeeId> {
        self.reports.get(&manager).cloned().unwrap_or_default()
    }

    fn team_hierarchy_ids(&self, lead: EmployeeId) -> BTreeSet<EmployeeId> {
        // Every member's chain runs through `lead`, so a loop above `lead`
        // taints the whole team. A loop below it cannot be reached.
        if let Err(err) = self.chain_of(lead) {
            warn!(lead = %lead, error = %err, "team of a lead on a cyclic chain is empty");
            return BTreeSet::new();
        }

        let mut team = BTreeSet::new();
        let mut queue = VecDeque::from([lead]);

        while let Some(manager) = queue.pop_front() {
            let Some(reports) = self.reports.get(&manager) else {
                continue;
            };
            for &report in reports {
                if report != lead && team.insert(report) {
                    queue.push_back(report);
                }
            }
        }

        team
    }
}
