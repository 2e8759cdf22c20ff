use serde::Serialize;
use serde_json::Value as JsonValue;

use perfrev_core::Aggregate;
use perfrev_events::{Event, EventEnvelope, Projection, ProjectionError};
use perfrev_questionnaire::{Category, CategoryEvent, CategoryId};

use crate::projections::cursor::StreamCursors;
use crate::read_model::ReadModelStore;

pub const CATEGORIES_PROJECTION: &str = "questionnaire.categories";

/// Queryable category read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReadModel {
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub active: bool,
}

#[derive(Debug)]
pub struct CategoriesProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> CategoriesProjection<S>
where
    S: ReadModelStore<CategoryId, CategoryReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, category_id: &CategoryId) -> Option<CategoryReadModel> {
        self.store.get(CATEGORIES_PROJECTION, category_id)
    }

    /// All categories ordered for display (`sort_order`, then name).
    pub fn list(&self) -> Vec<CategoryReadModel> {
        let mut all = self.store.list(CATEGORIES_PROJECTION);
        all.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        all
    }

    pub fn list_active(&self) -> Vec<CategoryReadModel> {
        self.list().into_iter().filter(|c| c.active).collect()
    }

    fn existing(&self, category_id: CategoryId) -> Result<CategoryReadModel, ProjectionError> {
        self.get(&category_id).ok_or_else(|| {
            ProjectionError::Store(format!("no category read model for {category_id}"))
        })
    }

    fn upsert(&self, rm: CategoryReadModel) -> Result<(), ProjectionError> {
        self.store
            .upsert(CATEGORIES_PROJECTION, rm.category_id, rm)
            .map_err(|e| ProjectionError::Store(e.to_string()))
    }
}

impl<S> Projection for CategoriesProjection<S>
where
    S: ReadModelStore<CategoryId, CategoryReadModel>,
{
    fn name(&self) -> &str {
        CATEGORIES_PROJECTION
    }

    fn subscribes_to(&self, aggregate_type: &str) -> bool {
        aggregate_type == Category::AGGREGATE_TYPE
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
        if !CategoryEvent::is_known_type(envelope.event_type()) {
            return Err(decode_error("unknown category event type".to_string()));
        }
        let ev: CategoryEvent = envelope.decode().map_err(|e| decode_error(e.to_string()))?;

        match ev {
            CategoryEvent::CategoryAdded(e) => {
                if e.category_id.0 != aggregate_id {
                    return Err(decode_error(
                        "payload category_id does not match envelope aggregate_id".to_string(),
                    ));
                }
                self.upsert(CategoryReadModel {
                    category_id: e.category_id,
                    name: e.name,
                    description: e.description,
                    sort_order: e.sort_order,
                    active: true,
                })?;
            }
            CategoryEvent::CategoryRenamed(e) => {
                let mut rm = self.existing(e.category_id)?;
                rm.name = e.name;
                self.upsert(rm)?;
            }
            CategoryEvent::CategoryDescriptionChanged(e) => {
                let mut rm = self.existing(e.category_id)?;
                rm.description = e.description;
                self.upsert(rm)?;
            }
            CategoryEvent::CategoryReordered(e) => {
                let mut rm = self.existing(e.category_id)?;
                rm.sort_order = e.sort_order;
                self.upsert(rm)?;
            }
            CategoryEvent::CategoryDeactivated(e) => {
                let mut rm = self.existing(e.category_id)?;
                rm.active = false;
                self.upsert(rm)?;
            }
        }

        self.cursors.advance(aggregate_id, seq)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ProjectionError> {
        self.store
            .clear(CATEGORIES_PROJECTION)
            .map_err(|e| ProjectionError::Store(e.to_string()))?;
        self.cursors.clear()?;
        Ok(())
    }
}
