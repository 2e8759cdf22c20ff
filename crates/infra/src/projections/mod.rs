//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be cleared and reconstructed from the event log
//! - **Idempotent**: Safe for at-least-once delivery (per-stream cursors)

pub mod categories;
pub mod cursor;
pub mod employee_directory;
pub mod replay;

pub use categories::{CATEGORIES_PROJECTION, CategoriesProjection, CategoryReadModel};
pub use cursor::StreamCursors;
pub use employee_directory::{
    EMPLOYEE_DIRECTORY_PROJECTION, EmployeeDirectoryProjection, EmployeeRecord,
};
pub use replay::{ReplayCoordinator, ReplayError, ReplayHandle};
