//! Entity notifications.
//!
//! Listeners are plain closures invoked synchronously, in registration
//! order, on the thread running the pass. `added_any` always fires before
//! `added` for the same record, and `removed` fires while the record is
//! still in the primary map.
//!
//! Listeners must not register further listeners or start a pass / area
//! reset from inside a callback.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::Entity;

pub type EntityListener = Box<dyn Fn(&Arc<Entity>) + Send + Sync>;

#[derive(Default)]
pub struct EntityEvents {
    added: RwLock<Vec<EntityListener>>,
    added_any: RwLock<Vec<EntityListener>>,
    removed: RwLock<Vec<EntityListener>>,
    player_updated: RwLock<Vec<EntityListener>>,
}

impl EntityEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First successful insertion of a gameplay-relevant record.
    pub fn on_added(&self, listener: impl Fn(&Arc<Entity>) + Send + Sync + 'static) {
        self.added.write().push(Box::new(listener));
    }

    /// First successful insertion of any record, before type filtering.
    pub fn on_added_any(&self, listener: impl Fn(&Arc<Entity>) + Send + Sync + 'static) {
        self.added_any.write().push(Box::new(listener));
    }

    pub fn on_removed(&self, listener: impl Fn(&Arc<Entity>) + Send + Sync + 'static) {
        self.removed.write().push(Box::new(listener));
    }

    /// The reference record changed identity.
    pub fn on_player_updated(&self, listener: impl Fn(&Arc<Entity>) + Send + Sync + 'static) {
        self.player_updated.write().push(Box::new(listener));
    }

    pub(crate) fn fire_added(&self, entity: &Arc<Entity>) {
        Self::fire(&self.added, entity);
    }

    pub(crate) fn fire_added_any(&self, entity: &Arc<Entity>) {
        Self::fire(&self.added_any, entity);
    }

    pub(crate) fn fire_removed(&self, entity: &Arc<Entity>) {
        Self::fire(&self.removed, entity);
    }

    pub(crate) fn fire_player_updated(&self, entity: &Arc<Entity>) {
        Self::fire(&self.player_updated, entity);
    }

    fn fire(listeners: &RwLock<Vec<EntityListener>>, entity: &Arc<Entity>) {
        for listener in listeners.read().iter() {
            listener(entity);
        }
    }
}

impl std::fmt::Debug for EntityEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityEvents")
            .field("added", &self.added.read().len())
            .field("added_any", &self.added_any.read().len())
            .field("removed", &self.removed.read().len())
            .field("player_updated", &self.player_updated.read().len())
            .finish()
    }
}
