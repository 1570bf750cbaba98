//! Secondary views over the primary map.
//!
//! Built from scratch at the end of each pass and published behind an
//! `Arc` swap, so a reader sees either the previous index or the new one,
//! never a half-built one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::{Entity, EntityType};

#[derive(Debug, Default)]
pub struct EntityIndex {
    pub(crate) valid: Vec<Arc<Entity>>,
    pub(crate) invalid: Vec<Arc<Entity>>,
    pub(crate) valid_by_type: HashMap<EntityType, Vec<Arc<Entity>>>,
}

impl EntityIndex {
    /// Partition `entities` by their current validity and type.
    pub fn build(entities: impl IntoIterator<Item = Arc<Entity>>) -> Self {
        let mut index = Self::default();
        for entity in entities {
            if entity.is_valid() {
                index
                    .valid_by_type
                    .entry(entity.entity_type())
                    .or_default()
                    .push(Arc::clone(&entity));
                index.valid.push(entity);
            } else {
                index.invalid.push(entity);
            }
        }
        index
    }

    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.valid.len()
    }

    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.invalid.len()
    }

    #[must_use]
    pub fn valid_of_type(&self, entity_type: EntityType) -> &[Arc<Entity>] {
        self.valid_by_type.get(&entity_type).map_or(&[], Vec::as_slice)
    }
}
