// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cached entity records.
//!
//! An [`Entity`] is shared as `Arc<Entity>` between the cache, the published
//! indices and any subscriber that kept a handle from a notification. When
//! the same id shows up again at a new address the existing record is
//! re-pointed and refreshed in place, so those handles stay live.
//!
//! Decoding typed fields from raw bytes is the job of an [`EntityResolver`]
//! supplied by the host; the engine only needs the handful of attributes in
//! [`EntityDetails`].

mod types;

pub use types::{EntityType, GridPos, LeagueType, REAL_ENTITY_THRESHOLD};

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::memory::{Address, MemoryReadExt, MemoryReader, ReadError};

/// Attributes the engine reads from an entity payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDetails {
    /// Metadata path, e.g. `Metadata/Monsters/...`
    pub path: String,
    pub entity_type: EntityType,
    pub league: LeagueType,
    pub is_alive: bool,
    pub grid_pos: GridPos,
}

impl Default for EntityDetails {
    fn default() -> Self {
        Self {
            path: String::new(),
            entity_type: EntityType::Error,
            league: LeagueType::General,
            is_alive: false,
            grid_pos: GridPos::default(),
        }
    }
}

/// Decodes [`EntityDetails`] from a payload address.
pub trait EntityResolver: Send + Sync {
    fn resolve(&self, memory: &dyn MemoryReader, address: Address) -> Result<EntityDetails, ReadError>;
}

/// One cached entity.
#[derive(Debug)]
pub struct Entity {
    id: u32,
    address: AtomicU64,
    is_valid: AtomicBool,
    version: AtomicU32,
    details: RwLock<EntityDetails>,
}

impl Entity {
    #[must_use]
    pub fn new(id: u32, address: Address, details: EntityDetails) -> Self {
        Self {
            id,
            address: AtomicU64::new(address.raw()),
            is_valid: AtomicBool::new(false),
            version: AtomicU32::new(0),
            details: RwLock::new(details),
        }
    }

    /// Read the id at `address + id_offset` and resolve the details.
    pub fn load(
        memory: &dyn MemoryReader,
        resolver: &dyn EntityResolver,
        address: Address,
        id_offset: u64,
    ) -> Result<Self, ReadError> {
        let id = memory.read::<u32>(address.offset(id_offset))?;
        let details = resolver.resolve(memory, address)?;
        Ok(Self::new(id, address, details))
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn address(&self) -> Address {
        Address::new(self.address.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid.load(Ordering::Acquire)
    }

    /// Pass version of the last confirmation.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Copy of the current details.
    #[must_use]
    pub fn details(&self) -> EntityDetails {
        self.details.read().clone()
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.details.read().entity_type
    }

    #[must_use]
    pub fn league(&self) -> LeagueType {
        self.details.read().league
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.details.read().is_alive
    }

    #[must_use]
    pub fn grid_pos(&self) -> GridPos {
        self.details.read().grid_pos
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.details.read().path.clone()
    }

    /// Grid distance to another record.
    #[must_use]
    pub fn distance_to(&self, other: &Entity) -> f32 {
        self.grid_pos().distance(other.grid_pos())
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.is_valid.store(valid, Ordering::Release);
    }

    /// Mark confirmed for pass `version`.
    pub(crate) fn confirm(&self, version: u32) {
        self.version.store(version, Ordering::Release);
        self.set_valid(true);
    }

    pub(crate) fn repoint(&self, address: Address) {
        self.address.store(address.raw(), Ordering::Release);
    }

    /// Validate the record at its current address.
    ///
    /// Succeeds when the id stored in the payload still equals `expected_id`
    /// and the resolver can decode the details, which are then stored.
    pub fn check(
        &self,
        memory: &dyn MemoryReader,
        resolver: &dyn EntityResolver,
        expected_id: u32,
        id_offset: u64,
    ) -> bool {
        let address = self.address();
        match memory.read::<u32>(address.offset(id_offset)) {
            Ok(id) if id == expected_id => {}
            Ok(id) => {
                debug!(expected = expected_id, found = id, address = %address, "Entity id mismatch");
                return false;
            }
            Err(e) => {
                debug!(id = expected_id, address = %address, error = %e, "Entity id unreadable");
                return false;
            }
        }
        self.refresh_details(memory, resolver)
    }

    /// Best-effort re-read of the details; keeps the old ones on failure.
    pub(crate) fn refresh_details(&self, memory: &dyn MemoryReader, resolver: &dyn EntityResolver) -> bool {
        match resolver.resolve(memory, self.address()) {
            Ok(details) => {
                *self.details.write() = details;
                true
            }
            Err(e) => {
                debug!(id = self.id, error = %e, "Entity details unreadable");
                false
            }
        }
    }
}
