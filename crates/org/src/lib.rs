//! `perfrev-org`: organization structure and hierarchy-based access.
//!
//! This crate is intentionally decoupled from HTTP and storage: manager edges
//! arrive through the `EmployeeDirectory` trait, and every "who reports to
//! whom" question is answered by `HierarchyIndex`.

pub mod access;
pub mod cache;
pub mod directory;
pub mod employee;
pub mod hierarchy;

pub use access::{AccessBasis, AccessError, OrgRole, Principal, authorize_employee_access};
pub use cache::{HierarchyCache, HierarchyCacheError};
pub use directory::{DirectoryError, EmployeeDirectory, InMemoryEmployeeDirectory, ManagerEdge};
pub use employee::{
    AssignManager, Employee, EmployeeCommand, EmployeeEvent, EmployeeHired, EmployeeTerminated,
    HireEmployee, ManagerAssigned, ManagerRemoved, RemoveManager, TerminateEmployee,
};
pub use hierarchy::{HierarchyIndex, HierarchyResolver};
