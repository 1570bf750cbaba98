//! In-process stand-in for an observed target.
//!
//! [`SimulatedMemory`] is a sparse region map that fails reads outside
//! written regions, the same way a real cross-process read fails on an
//! unmapped page. [`SimulatedProcess`] lays an entity list and entity
//! payloads out in that memory using the engine's configured offsets, so the
//! walker and cache run against it unchanged.
//!
//! Payload format read by [`SimulatedResolver`] (offsets from the payload
//! address; the id lives at the configured `entity_id_offset`):
//!
//! ```text
//! 0x60  u16  entity type discriminant
//! 0x62  u8   league
//! 0x63  u8   alive flag
//! 0x64  f32  grid x
//! 0x68  f32  grid y
//! 0x6C  u32  path length (max 64)
//! 0x70  ..   path bytes
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::{Address, GameContext, MemoryReadExt, MemoryReader, ReadError};
use crate::config::{EngineConfig, ListLayout};
use crate::entity::{EntityDetails, EntityResolver, EntityType, GridPos, LeagueType};

const TYPE_OFFSET: u64 = 0x60;
const LEAGUE_OFFSET: u64 = 0x62;
const ALIVE_OFFSET: u64 = 0x63;
const GRID_X_OFFSET: u64 = 0x64;
const GRID_Y_OFFSET: u64 = 0x68;
const PATH_LEN_OFFSET: u64 = 0x6C;
const PATH_OFFSET: u64 = 0x70;
const MAX_PATH_LEN: usize = 64;
const PAYLOAD_SIZE: usize = 0x100;
const NODE_SIZE: usize = 0x40;

const NODE_ARENA: u64 = 0x1000_0000;
const PAYLOAD_ARENA: u64 = 0x2_0000_0000;

/// Sparse, thread-safe memory image.
#[derive(Debug, Default)]
pub struct SimulatedMemory {
    regions: RwLock<BTreeMap<u64, Vec<u8>>>,
}

impl SimulatedMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `bytes` at `address`.
    ///
    /// Writes fully inside an existing region patch it; anything else maps a
    /// new region starting at `address`.
    pub fn write(&self, address: Address, bytes: &[u8]) {
        let start = address.raw();
        let mut regions = self.regions.write();
        if let Some((&base, region)) = regions.range_mut(..=start).next_back() {
            let from = (start - base) as usize;
            if from + bytes.len() <= region.len() {
                region[from..from + bytes.len()].copy_from_slice(bytes);
                return;
            }
        }
        regions.insert(start, bytes.to_vec());
    }

    pub fn write_u64(&self, address: Address, value: u64) {
        self.write(address, &value.to_le_bytes());
    }

    /// Drop the region starting at `address` (simulates a free).
    pub fn unmap(&self, address: Address) -> bool {
        self.regions.write().remove(&address.raw()).is_some()
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }
}

impl MemoryReader for SimulatedMemory {
    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<(), ReadError> {
        let start = address.raw();
        let unmapped = ReadError::Unmapped { address, len: buf.len() };
        let regions = self.regions.read();
        let (&base, region) = regions.range(..=start).next_back().ok_or_else(|| unmapped.clone())?;
        let from = (start - base) as usize;
        let to = from.checked_add(buf.len()).ok_or_else(|| unmapped.clone())?;
        if to > region.len() {
            return Err(unmapped);
        }
        buf.copy_from_slice(&region[from..to]);
        Ok(())
    }
}

/// Resolver for the payload format documented at module level.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedResolver;

impl SimulatedResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode one payload (id + details) at `address`.
    pub fn write_payload(memory: &SimulatedMemory, address: Address, id_offset: u64, id: u32, details: &EntityDetails) {
        let mut bytes = vec![0u8; PAYLOAD_SIZE];
        let mut put = |offset: u64, data: &[u8]| {
            let at = offset as usize;
            bytes[at..at + data.len()].copy_from_slice(data);
        };
        put(id_offset, &id.to_le_bytes());
        put(TYPE_OFFSET, &details.entity_type.discriminant().to_le_bytes());
        put(LEAGUE_OFFSET, &[details.league as u8]);
        put(ALIVE_OFFSET, &[u8::from(details.is_alive)]);
        put(GRID_X_OFFSET, &details.grid_pos.x.to_le_bytes());
        put(GRID_Y_OFFSET, &details.grid_pos.y.to_le_bytes());
        let path = &details.path.as_bytes()[..details.path.len().min(MAX_PATH_LEN)];
        put(PATH_LEN_OFFSET, &(path.len() as u32).to_le_bytes());
        put(PATH_OFFSET, path);
        memory.write(address, &bytes);
    }
}

impl EntityResolver for SimulatedResolver {
    fn resolve(&self, memory: &dyn MemoryReader, address: Address) -> Result<EntityDetails, ReadError> {
        let raw_type = memory.read::<u16>(address.offset(TYPE_OFFSET))?;
        let league = memory.read::<u8>(address.offset(LEAGUE_OFFSET))?;
        let alive = memory.read::<u8>(address.offset(ALIVE_OFFSET))?;
        let x = memory.read::<f32>(address.offset(GRID_X_OFFSET))?;
        let y = memory.read::<f32>(address.offset(GRID_Y_OFFSET))?;
        let path_len = (memory.read::<u32>(address.offset(PATH_LEN_OFFSET))? as usize).min(MAX_PATH_LEN);
        let path = memory.read_string(address.offset(PATH_OFFSET), path_len)?;
        Ok(EntityDetails {
            path,
            entity_type: EntityType::from_raw(raw_type),
            league: LeagueType::from_raw(league),
            is_alive: alive != 0,
            grid_pos: GridPos::new(x, y),
        })
    }
}

#[derive(Debug, Clone)]
struct Spawned {
    node: Address,
    payload: Address,
    details: EntityDetails,
    listed: bool,
}

/// A fake target process: an entity list plus a local player handle.
#[derive(Debug)]
pub struct SimulatedProcess {
    memory: SimulatedMemory,
    layout: ListLayout,
    id_offset: u64,
    root: Address,
    local_player: RwLock<Address>,
    next_node: AtomicU64,
    next_payload: AtomicU64,
    spawned: Mutex<BTreeMap<u32, Spawned>>,
}

impl SimulatedProcess {
    /// Empty list laid out with `config`'s offsets.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        let process = Self {
            memory: SimulatedMemory::new(),
            layout: config.layout,
            id_offset: config.entity_id_offset,
            root: Address::new(NODE_ARENA),
            local_player: RwLock::new(Address::NULL),
            next_node: AtomicU64::new(NODE_ARENA + NODE_SIZE as u64),
            next_payload: AtomicU64::new(PAYLOAD_ARENA),
            spawned: Mutex::new(BTreeMap::new()),
        };
        process.memory.write(process.root, &[0u8; NODE_SIZE]);
        process.relink(&process.spawned.lock());
        process
    }

    #[must_use]
    pub fn memory(&self) -> &SimulatedMemory {
        &self.memory
    }

    #[must_use]
    pub fn root(&self) -> Address {
        self.root
    }

    /// Allocate a payload and a list node for `id`. Returns the payload address.
    pub fn spawn(&self, id: u32, details: EntityDetails) -> Address {
        let payload = Address::new(self.next_payload.fetch_add(PAYLOAD_SIZE as u64 * 16, Ordering::Relaxed));
        self.spawn_at(id, payload, details)
    }

    /// Like [`spawn`](Self::spawn) with a caller-chosen payload address.
    pub fn spawn_at(&self, id: u32, payload: Address, details: EntityDetails) -> Address {
        let node = Address::new(self.next_node.fetch_add(NODE_SIZE as u64, Ordering::Relaxed));
        self.memory.write(node, &[0u8; NODE_SIZE]);
        SimulatedResolver::write_payload(&self.memory, payload, self.id_offset, id, &details);
        let mut spawned = self.spawned.lock();
        spawned.insert(id, Spawned { node, payload, details, listed: true });
        self.relink(&spawned);
        payload
    }

    /// Spawn a player-like actor that is not in the entity list and make it
    /// the local player.
    pub fn spawn_local_player(&self, id: u32, details: EntityDetails) -> Address {
        let payload = self.spawn(id, details);
        self.unlist(id);
        *self.local_player.write() = payload;
        payload
    }

    pub fn set_local_player(&self, address: Address) {
        *self.local_player.write() = address;
    }

    /// Remove `id` from the list; its payload stays readable.
    pub fn unlist(&self, id: u32) {
        let mut spawned = self.spawned.lock();
        if let Some(entry) = spawned.get_mut(&id) {
            entry.listed = false;
        }
        self.relink(&spawned);
    }

    /// Put a previously unlisted `id` back in the list.
    pub fn relist(&self, id: u32) {
        let mut spawned = self.spawned.lock();
        if let Some(entry) = spawned.get_mut(&id) {
            entry.listed = true;
        }
        self.relink(&spawned);
    }

    /// Remove `id` from the list and unmap its payload.
    pub fn despawn(&self, id: u32) {
        let mut spawned = self.spawned.lock();
        if let Some(entry) = spawned.remove(&id) {
            self.memory.unmap(entry.payload);
        }
        self.relink(&spawned);
    }

    /// Rewrite the details of `id` in place.
    pub fn update(&self, id: u32, f: impl FnOnce(&mut EntityDetails)) {
        let mut spawned = self.spawned.lock();
        if let Some(entry) = spawned.get_mut(&id) {
            f(&mut entry.details);
            SimulatedResolver::write_payload(&self.memory, entry.payload, self.id_offset, id, &entry.details);
        }
    }

    /// Whether `id` has a live payload (spawned and not despawned).
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.spawned.lock().contains_key(&id)
    }

    /// Move `id`'s payload to a fresh address. Returns the new address.
    pub fn relocate(&self, id: u32) -> Option<Address> {
        let fresh = Address::new(self.next_payload.fetch_add(PAYLOAD_SIZE as u64 * 16, Ordering::Relaxed));
        let mut spawned = self.spawned.lock();
        let entry = spawned.get_mut(&id)?;
        self.memory.unmap(entry.payload);
        entry.payload = fresh;
        SimulatedResolver::write_payload(&self.memory, fresh, self.id_offset, id, &entry.details);
        self.relink(&spawned);
        Some(fresh)
    }

    /// Rebuild the doubly-linked ring: root -> n0 -> n1 -> ... -> root.
    fn relink(&self, spawned: &BTreeMap<u32, Spawned>) {
        let mut ring = vec![(self.root, Address::NULL)];
        ring.extend(spawned.values().filter(|s| s.listed).map(|s| (s.node, s.payload)));
        let len = ring.len();
        for (i, &(node, payload)) in ring.iter().enumerate() {
            let next = ring[(i + 1) % len].0;
            let prev = ring[(i + len - 1) % len].0;
            self.memory.write_u64(node.offset(self.layout.next_offset), next.raw());
            self.memory.write_u64(node.offset(self.layout.prev_offset), prev.raw());
            self.memory.write_u64(node.offset(self.layout.payload_offset), payload.raw());
        }
    }
}

impl MemoryReader for SimulatedProcess {
    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<(), ReadError> {
        self.memory.read_bytes(address, buf)
    }
}

impl GameContext for SimulatedProcess {
    fn entity_list_root(&self) -> Result<Address, ReadError> {
        Ok(self.root)
    }

    fn local_player(&self) -> Result<Address, ReadError> {
        let player = *self.local_player.read();
        if player.is_null() {
            return Err(ReadError::NullPointer);
        }
        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monster(x: f32, y: f32) -> EntityDetails {
        EntityDetails {
            path: "Metadata/Monsters/Zombie".into(),
            entity_type: EntityType::Monster,
            league: LeagueType::General,
            is_alive: true,
            grid_pos: GridPos::new(x, y),
        }
    }

    #[test]
    fn test_region_reads_fail_outside_mapping() {
        let memory = SimulatedMemory::new();
        memory.write(Address::new(0x100), &[1, 2, 3, 4]);

        let mut buf = [0u8; 4];
        assert!(memory.read_bytes(Address::new(0x100), &mut buf).is_ok());
        assert_eq!(buf, [1, 2, 3, 4]);

        let mut wide = [0u8; 8];
        assert!(memory.read_bytes(Address::new(0x100), &mut wide).is_err(), "read past region end");
        assert!(memory.read_bytes(Address::new(0x50), &mut buf).is_err(), "read before any region");
    }

    #[test]
    fn test_patch_inside_region_keeps_region_count() {
        let memory = SimulatedMemory::new();
        memory.write(Address::new(0x100), &[0u8; 16]);
        memory.write(Address::new(0x108), &[9u8; 4]);
        assert_eq!(memory.region_count(), 1);
        assert_eq!(memory.read::<u8>(Address::new(0x109)).unwrap(), 9);
    }

    #[test]
    fn test_unmap_simulates_free() {
        let memory = SimulatedMemory::new();
        memory.write(Address::new(0x100), &[1u8; 8]);
        assert!(memory.unmap(Address::new(0x100)));
        assert!(memory.read::<u64>(Address::new(0x100)).is_err());
    }

    #[test]
    fn test_payload_roundtrip_through_resolver() {
        let memory = SimulatedMemory::new();
        let addr = Address::new(0x2_0000_0000);
        let details = monster(12.5, -3.0);
        SimulatedResolver::write_payload(&memory, addr, 0x58, 77, &details);

        assert_eq!(memory.read::<u32>(addr.offset(0x58)).unwrap(), 77);
        assert_eq!(SimulatedResolver.resolve(&memory, addr).unwrap(), details);
    }

    #[test]
    fn test_ring_links_back_to_root() {
        let config = EngineConfig::default();
        let process = SimulatedProcess::new(&config);
        process.spawn(1, monster(1.0, 1.0));
        process.spawn(2, monster(2.0, 2.0));

        let root = process.root();
        let first = process.read_address(root.offset(config.layout.next_offset)).unwrap();
        let second = process.read_address(first.offset(config.layout.next_offset)).unwrap();
        let back = process.read_address(second.offset(config.layout.next_offset)).unwrap();
        assert_eq!(back, root);
        let last = process.read_address(root.offset(config.layout.prev_offset)).unwrap();
        assert_eq!(last, second);
    }

    #[test]
    fn test_local_player_requires_spawn() {
        let process = SimulatedProcess::new(&EngineConfig::default());
        assert_eq!(process.local_player(), Err(ReadError::NullPointer));
        let addr = process.spawn_local_player(1, monster(0.0, 0.0));
        assert_eq!(process.local_player(), Ok(addr));
    }
}
