use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use perfrev_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use perfrev_events::Event;

/// Questionnaire category identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub AggregateId);

impl CategoryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl From<CategoryId> for AggregateId {
    fn from(value: CategoryId) -> Self {
        value.0
    }
}

impl core::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: a questionnaire category (groups questions in a review form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: CategoryId,
    name: String,
    description: Option<String>,
    sort_order: i32,
    active: bool,
    version: u64,
    created: bool,
}

impl Category {
    pub fn id_typed(&self) -> CategoryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCategory {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameCategory {
    pub category_id: CategoryId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeCategoryDescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCategoryDescription {
    pub category_id: CategoryId,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReorderCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderCategory {
    pub category_id: CategoryId,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateCategory {
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryCommand {
    AddCategory(AddCategory),
    RenameCategory(RenameCategory),
    ChangeCategoryDescription(ChangeCategoryDescription),
    ReorderCategory(ReorderCategory),
    DeactivateCategory(DeactivateCategory),
}

/// Event: CategoryAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAdded {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CategoryRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRenamed {
    pub category_id: CategoryId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CategoryDescriptionChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescriptionChanged {
    pub category_id: CategoryId,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CategoryReordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReordered {
    pub category_id: CategoryId,
    pub sort_order: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CategoryDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDeactivated {
    pub category_id: CategoryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryEvent {
    CategoryAdded(CategoryAdded),
    CategoryRenamed(CategoryRenamed),
    CategoryDescriptionChanged(CategoryDescriptionChanged),
    CategoryReordered(CategoryReordered),
    CategoryDeactivated(CategoryDeactivated),
}

impl Event for CategoryEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "questionnaire.category.added",
        "questionnaire.category.renamed",
        "questionnaire.category.description_changed",
        "questionnaire.category.reordered",
        "questionnaire.category.deactivated",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::CategoryAdded(_) => "questionnaire.category.added",
            CategoryEvent::CategoryRenamed(_) => "questionnaire.category.renamed",
            CategoryEvent::CategoryDescriptionChanged(_) => {
                "questionnaire.category.description_changed"
            }
            CategoryEvent::CategoryReordered(_) => "questionnaire.category.reordered",
            CategoryEvent::CategoryDeactivated(_) => "questionnaire.category.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CategoryEvent::CategoryAdded(e) => e.occurred_at,
            CategoryEvent::CategoryRenamed(e) => e.occurred_at,
            CategoryEvent::CategoryDescriptionChanged(e) => e.occurred_at,
            CategoryEvent::CategoryReordered(e) => e.occurred_at,
            CategoryEvent::CategoryDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Category {
    const AGGREGATE_TYPE: &'static str = "questionnaire.category";

    type Command = CategoryCommand;
    type Event = CategoryEvent;

    fn empty(id: CategoryId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            sort_order: 0,
            active: false,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CategoryEvent::CategoryAdded(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.sort_order = e.sort_order;
                self.active = true;
                self.created = true;
            }
            CategoryEvent::CategoryRenamed(e) => {
                self.name = e.name.clone();
            }
            CategoryEvent::CategoryDescriptionChanged(e) => {
                self.description = e.description.clone();
            }
            CategoryEvent::CategoryReordered(e) => {
                self.sort_order = e.sort_order;
            }
            CategoryEvent::CategoryDeactivated(_) => {
                self.active = false;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            CategoryCommand::AddCategory(cmd) => self.handle_add(cmd),
            CategoryCommand::RenameCategory(cmd) => self.handle_rename(cmd),
            CategoryCommand::ChangeCategoryDescription(cmd) => self.handle_describe(cmd),
            CategoryCommand::ReorderCategory(cmd) => self.handle_reorder(cmd),
            CategoryCommand::DeactivateCategory(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl Category {
    fn ensure_exists(&self, category_id: CategoryId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != category_id {
            return Err(DomainError::invariant("category_id mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.active {
            return Err(DomainError::rule("category is deactivated"));
        }
        Ok(())
    }

    fn validate_name(name: &str) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(())
    }

    fn handle_add(&self, cmd: &AddCategory) -> Result<Vec<CategoryEvent>, DomainError> {
        if cmd.category_id != self.id {
            return Err(DomainError::invariant("category_id mismatch"));
        }
        if self.created {
            return Err(DomainError::rule("category already exists"));
        }
        Self::validate_name(&cmd.name)?;
        if cmd.sort_order < 0 {
            return Err(DomainError::validation("sort order cannot be negative"));
        }

        Ok(vec![CategoryEvent::CategoryAdded(CategoryAdded {
            category_id: cmd.category_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            sort_order: cmd.sort_order,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameCategory) -> Result<Vec<CategoryEvent>, DomainError> {
        self.ensure_exists(cmd.category_id)?;
        self.ensure_active()?;
        Self::validate_name(&cmd.name)?;

        let name = cmd.name.trim();
        if name == self.name {
            return Ok(vec![]);
        }

        Ok(vec![CategoryEvent::CategoryRenamed(CategoryRenamed {
            category_id: cmd.category_id,
            name: name.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_describe(
        &self,
        cmd: &ChangeCategoryDescription,
    ) -> Result<Vec<CategoryEvent>, DomainError> {
        self.ensure_exists(cmd.category_id)?;
        self.ensure_active()?;

        if cmd.description == self.description {
            return Ok(vec![]);
        }

        Ok(vec![CategoryEvent::CategoryDescriptionChanged(
            CategoryDescriptionChanged {
                category_id: cmd.category_id,
                description: cmd.description.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reorder(&self, cmd: &ReorderCategory) -> Result<Vec<CategoryEvent>, DomainError> {
        self.ensure_exists(cmd.category_id)?;
        self.ensure_active()?;
        if cmd.sort_order < 0 {
            return Err(DomainError::validation("sort order cannot be negative"));
        }

        if cmd.sort_order == self.sort_order {
            return Ok(vec![]);
        }

        Ok(vec![CategoryEvent::CategoryReordered(CategoryReordered {
            category_id: cmd.category_id,
            sort_order: cmd.sort_order,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateCategory,
    ) -> Result<Vec<CategoryEvent>, DomainError> {
        self.ensure_exists(cmd.category_id)?;
        if !self.active {
            return Err(DomainError::rule("category is already deactivated"));
        }

        Ok(vec![CategoryEvent::CategoryDeactivated(CategoryDeactivated {
            category_id: cmd.category_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
