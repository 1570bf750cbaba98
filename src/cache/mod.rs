// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity cache.
//!
//! The [`EntityCache`] owns every [`Entity`] record discovered in the
//! observed process and reconciles them against the live entity list once
//! per collection pass.
//!
//! # Pass
//!
//! ```text
//!  ┌───────────┐   ┌────────────┐   ┌────────────────┐   ┌──────────┐   ┌─────────┐
//!  │ read root │──▶│ walk list  │──▶│ reconcile each │──▶│ evict    │──▶│ publish │
//!  │ (context) │   │ candidates │   │ candidate      │   │ unseen   │   │ indices │
//!  └───────────┘   └────────────┘   └────────────────┘   └──────────┘   └─────────┘
//!                                    new id → insert        policy →
//!                                    known id → confirm     deletion queue
//!                                    moved id → repoint     drained here
//! ```
//!
//! # Concurrency
//!
//! - The primary map is a `DashMap` so lookups by id never wait on a pass.
//! - Secondary views ([`valid_entities`](EntityCache::valid_entities) and
//!   friends) are rebuilt at the end of a pass and swapped in whole.
//! - A pass and an area reset are mutually exclusive; a reset started during
//!   a pass waits for it to finish.
//! - Queries share the reset gate; an area reset holds it exclusively while
//!   it empties the map and the views, so a query sees either the old area
//!   or the empty cache, never a mix.
//!
//! Records are handed out as `Arc<Entity>`. A record keeps its identity for
//! as long as its id stays in the cache, even when the target moves it.

mod area;
mod events;
mod index;
mod reconcile;
mod types;

pub use events::{EntityEvents, EntityListener};
pub use index::EntityIndex;
pub use reconcile::COLLECT_JOB_NAME;
pub use types::{AreaInstance, CollectError, PassStats};

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::config::EngineConfig;
use crate::entity::{Entity, EntityResolver, EntityType};
use crate::eviction::ProximityPolicy;
use crate::memory::{Address, GameContext, MemoryReader};
use crate::walker::{find_in_chain, EntityListWalker};

/// Offset of the entity address inside a label chain node
const LABEL_MATCH_OFFSET: u64 = 0x10;
/// Offset of the label object inside a label chain node
const LABEL_OBJECT_OFFSET: u64 = 0x18;

/// Decides whether a server-side id (at or above the threshold) is admitted.
pub type ServerEntityFilter = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// State owned by whoever is running a pass or an area reset.
#[derive(Debug)]
pub(super) struct PassState {
    pub(super) walker: EntityListWalker,
    /// Ids confirmed by the pass in progress
    pub(super) confirmed: HashSet<u32>,
    pub(super) deletions: VecDeque<u32>,
}

/// Id-keyed cache of entity records.
///
/// # Thread Safety
///
/// `Send + Sync`. Queries may run on any thread at any time. Passes are
/// serialized internally.
pub struct EntityCache {
    pub(super) config: EngineConfig,
    pub(super) memory: Arc<dyn MemoryReader>,
    pub(super) context: Arc<dyn GameContext>,
    pub(super) resolver: Arc<dyn EntityResolver>,
    pub(super) policy: ProximityPolicy,

    /// Primary map: id → record
    pub(super) entities: Arc<DashMap<u32, Arc<Entity>>>,

    /// Secondary views, swapped in whole at the end of a pass
    pub(super) index: RwLock<Arc<EntityIndex>>,

    /// Shared by queries, exclusive for an area reset
    pub(super) reset_gate: Arc<RwLock<()>>,

    /// Reference record (local player), kept outside the primary map
    pub(super) player: RwLock<Option<Arc<Entity>>>,

    pub(super) events: EntityEvents,

    /// Pass/area-reset fence
    pub(super) pass: Mutex<PassState>,

    /// Incremented at the start of every pass
    pub(super) version: AtomicU32,

    pub(super) parse_server_entities: AtomicBool,
    pub(super) server_entity_filter: Option<ServerEntityFilter>,

    pub(super) last_pass: RwLock<Option<PassStats>>,
}

impl EntityCache {
    /// Create an empty cache reading through `memory`.
    ///
    /// `context` locates the entity list and the local player; `resolver`
    /// decodes payloads into [`EntityDetails`](crate::entity::EntityDetails).
    pub fn new(
        config: EngineConfig,
        memory: Arc<dyn MemoryReader>,
        context: Arc<dyn GameContext>,
        resolver: Arc<dyn EntityResolver>,
    ) -> Self {
        let pass = PassState {
            walker: EntityListWalker::new(&config),
            confirmed: HashSet::with_capacity(1024),
            deletions: VecDeque::new(),
        };
        Self {
            policy: ProximityPolicy::from_config(&config.eviction),
            parse_server_entities: AtomicBool::new(config.parse_server_entities),
            config,
            memory,
            context,
            resolver,
            entities: Arc::new(DashMap::new()),
            index: RwLock::new(Arc::new(EntityIndex::default())),
            reset_gate: Arc::new(RwLock::new(())),
            player: RwLock::new(None),
            events: EntityEvents::new(),
            pass: Mutex::new(pass),
            version: AtomicU32::new(0),
            server_entity_filter: None,
            last_pass: RwLock::new(None),
        }
    }

    /// Replace the boolean server-entity switch with a per-id predicate.
    #[must_use]
    pub fn with_server_entity_filter(mut self, filter: impl Fn(u32) -> bool + Send + Sync + 'static) -> Self {
        self.server_entity_filter = Some(Arc::new(filter));
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Record for `id`, valid or not.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<Arc<Entity>> {
        let _gate = self.reset_gate.read();
        self.entities.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Every record in the primary map, in no particular order.
    #[must_use]
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        let _gate = self.reset_gate.read();
        self.entities.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Records confirmed by the last published pass.
    #[must_use]
    pub fn valid_entities(&self) -> Vec<Arc<Entity>> {
        let _gate = self.reset_gate.read();
        self.index.read().valid.clone()
    }

    /// Records the last published pass did not see but did not evict.
    #[must_use]
    pub fn invalid_entities(&self) -> Vec<Arc<Entity>> {
        let _gate = self.reset_gate.read();
        self.index.read().invalid.clone()
    }

    #[must_use]
    pub fn valid_by_type(&self, entity_type: EntityType) -> Vec<Arc<Entity>> {
        let _gate = self.reset_gate.read();
        self.index.read().valid_of_type(entity_type).to_vec()
    }

    /// The last published index.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EntityIndex> {
        let _gate = self.reset_gate.read();
        Arc::clone(&*self.index.read())
    }

    /// The reference record, if one has been established.
    #[must_use]
    pub fn player(&self) -> Option<Arc<Entity>> {
        self.player.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let _gate = self.reset_gate.read();
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let _gate = self.reset_gate.read();
        self.entities.is_empty()
    }

    /// Version of the most recent pass (0 before the first).
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn last_pass_stats(&self) -> Option<PassStats> {
        *self.last_pass.read()
    }

    #[must_use]
    pub fn events(&self) -> &EntityEvents {
        &self.events
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cheap, cloneable id lookup for code that does not own the cache.
    #[must_use]
    pub fn lookup(&self) -> EntityLookup {
        EntityLookup { entities: Arc::clone(&self.entities), reset_gate: Arc::clone(&self.reset_gate) }
    }

    pub fn set_parse_server_entities(&self, enabled: bool) {
        self.parse_server_entities.store(enabled, Ordering::Release);
    }

    #[must_use]
    pub fn parse_server_entities(&self) -> bool {
        self.parse_server_entities.load(Ordering::Acquire)
    }

    /// Find the label object attached to `entity` in the chain starting at
    /// `label_map_head`.
    #[must_use]
    pub fn label_node_for(&self, entity: &Entity, label_map_head: Address) -> Option<Address> {
        find_in_chain(
            self.memory.as_ref(),
            label_map_head,
            entity.address(),
            LABEL_MATCH_OFFSET,
            self.config.walk_iteration_limit,
        )
        .map(|node| node.offset(LABEL_OBJECT_OFFSET))
    }

    pub(super) fn admits_id(&self, id: u32) -> bool {
        if id == 0 {
            return false;
        }
        if id < self.config.server_entity_threshold {
            return true;
        }
        match &self.server_entity_filter {
            Some(filter) => filter(id),
            None => self.parse_server_entities(),
        }
    }

    pub(super) fn publish_index(&self) -> Arc<EntityIndex> {
        let index = Arc::new(EntityIndex::build(self.entities.iter().map(|e| Arc::clone(e.value()))));
        *self.index.write() = Arc::clone(&index);
        crate::metrics::set_cache_entities(index.valid_count(), index.invalid_count());
        index
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("entities", &self.entities.len())
            .field("version", &self.version())
            .field("player", &self.player.read().as_ref().map(|p| p.id()))
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Read-only id lookup sharing the cache's primary map.
#[derive(Clone)]
pub struct EntityLookup {
    entities: Arc<DashMap<u32, Arc<Entity>>>,
    reset_gate: Arc<RwLock<()>>,
}

impl EntityLookup {
    #[must_use]
    pub fn get(&self, id: u32) -> Option<Arc<Entity>> {
        let _gate = self.reset_gate.read();
        self.entities.get(&id).map(|e| Arc::clone(e.value()))
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        let _gate = self.reset_gate.read();
        self.entities.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let _gate = self.reset_gate.read();
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let _gate = self.reset_gate.read();
        self.entities.is_empty()
    }
}

impl std::fmt::Debug for EntityLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLookup").field("entities", &self.entities.len()).finish()
    }
}
