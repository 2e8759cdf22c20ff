//! Questionnaire domain module (event-sourced).
//!
//! Holds the questionnaire categories aggregate, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod category;

pub use category::{
    AddCategory, Category, CategoryAdded, CategoryCommand, CategoryDeactivated,
    CategoryDescriptionChanged, CategoryEvent, CategoryId, CategoryRenamed, CategoryReordered,
    ChangeCategoryDescription, DeactivateCategory, RenameCategory, ReorderCategory,
};
