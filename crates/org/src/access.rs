use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use perfrev_core::{DomainError, EmployeeId};

use crate::hierarchy::HierarchyResolver;

/// Organizational role a caller acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Employee,
    Manager,
    TeamLead,
    Admin,
}

/// A resolved caller for hierarchy-scoped authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub employee_id: EmployeeId,
    pub role: OrgRole,
}

impl Principal {
    pub fn new(employee_id: EmployeeId, role: OrgRole) -> Self {
        Self { employee_id, role }
    }
}

/// Why access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessBasis {
    OwnRecord,
    Admin,
    DirectReport,
    Team,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("forbidden: {principal} may not access employee {subject}")]
    Forbidden {
        principal: EmployeeId,
        subject: EmployeeId,
    },
}

/// Decide whether `principal` may see data about `subject`.
///
/// - No IO
/// - Everyone may access their own record
/// - Cycles in the hierarchy deny access
pub fn authorize_employee_access<R>(
    principal: &Principal,
    subject: EmployeeId,
    resolver: &R,
) -> Result<AccessBasis, AccessError>
where
    R: HierarchyResolver + ?Sized,
{
    if principal.employee_id == subject {
        return Ok(AccessBasis::OwnRecord);
    }

    let forbidden = AccessError::Forbidden {
        principal: principal.employee_id,
        subject,
    };

    match principal.role {
        OrgRole::Admin => Ok(AccessBasis::Admin),
        OrgRole::Employee => Err(forbidden),
        OrgRole::Manager => {
            if resolver.is_direct_manager_of(principal.employee_id, subject) {
                Ok(AccessBasis::DirectReport)
            } else {
                Err(forbidden)
            }
        }
        OrgRole::TeamLead => match resolver.is_in_hierarchy_of(principal.employee_id, subject) {
            Ok(true) => Ok(AccessBasis::Team),
            Ok(false) => Err(forbidden),
            Err(err @ DomainError::HierarchyCycleDetected(_)) => {
                warn!(
                    principal = %principal.employee_id,
                    subject = %subject,
                    error = %err,
                    "denying access over cyclic hierarchy"
                );
                Err(forbidden)
            }
            Err(err) => {
                warn!(
                    principal = %principal.employee_id,
                    subject = %subject,
                    error = %err,
                    "hierarchy lookup failed; denying access"
                );
                Err(forbidden)
            }
        },
    }
}
