//! Configuration for the entity engine.
//!
//! # Example
//!
//! ```
//! use entity_engine::EngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = EngineConfig::default();
//! assert_eq!(config.walk_iteration_limit, 10_000);
//! assert_eq!(config.entity_id_offset, 0x58);
//!
//! // Tuned config
//! let config = EngineConfig {
//!     parse_server_entities: true,
//!     worker_threads: 2,
//!     collect_every_n_ticks: 5,
//!     ..Default::default()
//! };
//! assert!(config.parse_server_entities);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::entity::{EntityType, LeagueType};

/// Configuration for the entity engine.
///
/// All fields have defaults matching the observed target's current layout.
/// Offsets are byte offsets into the target's structures.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Accept entity ids at or above `server_entity_threshold`
    #[serde(default)]
    pub parse_server_entities: bool,

    /// Ids at or above this value are server-side entities
    #[serde(default = "default_server_entity_threshold")]
    pub server_entity_threshold: u32,

    /// Hard ceiling on walker steps per pass
    #[serde(default = "default_walk_iteration_limit")]
    pub walk_iteration_limit: usize,

    /// Plausible payload address window (exclusive on both ends)
    #[serde(default = "default_min_entity_address")]
    pub min_entity_address: u64,
    #[serde(default = "default_max_entity_address")]
    pub max_entity_address: u64,

    /// Offset of the u32 id inside an entity payload
    #[serde(default = "default_entity_id_offset")]
    pub entity_id_offset: u64,

    /// Entity list node layout
    #[serde(default)]
    pub layout: ListLayout,

    /// Path prefix a local actor must carry to become the reference record
    #[serde(default = "default_player_path_prefix")]
    pub player_path_prefix: String,

    /// Fire `added` for structural (non-gameplay) entity types too
    #[serde(default)]
    pub notify_structural_added: bool,

    /// Eviction radii
    #[serde(default)]
    pub eviction: EvictionConfig,

    /// Job worker pool size (also the concurrency bound)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Finished jobs retained for diagnostics
    #[serde(default = "default_job_history_capacity")]
    pub job_history_capacity: usize,

    /// Jobs slower than this are logged
    #[serde(default = "default_slow_job_ms")]
    pub slow_job_ms: u64,

    /// Submit the collect job every N ticks
    #[serde(default = "default_collect_every_n_ticks")]
    pub collect_every_n_ticks: u64,

    /// Upper bound on the tick barrier wait (None = wait for completion)
    #[serde(default)]
    pub barrier_timeout_ms: Option<u64>,
}

/// Byte offsets inside one entity list node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ListLayout {
    #[serde(default = "default_next_offset")]
    pub next_offset: u64,
    #[serde(default = "default_prev_offset")]
    pub prev_offset: u64,
    #[serde(default = "default_payload_offset")]
    pub payload_offset: u64,
}

/// Distance thresholds for the proximity eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EvictionConfig {
    /// Below this distance a vanished record is deleted outright
    #[serde(default = "default_near_radius")]
    pub near_radius: f32,
    /// Below this distance live monsters are deleted
    #[serde(default = "default_outer_radius")]
    pub outer_radius: f32,
    /// Tighter radius for league resource nodes
    #[serde(default = "default_resource_radius")]
    pub resource_radius: f32,
    /// Beyond this distance a record is considered stale
    #[serde(default = "default_far_distance")]
    pub far_distance: f32,
    #[serde(default = "default_resource_type")]
    pub resource_type: EntityType,
    #[serde(default = "default_resource_league")]
    pub resource_league: LeagueType,
}

fn default_server_entity_threshold() -> u32 { i32::MAX as u32 }
fn default_walk_iteration_limit() -> usize { 10_000 }
fn default_min_entity_address() -> u64 { 0x1_0000_0000 }
fn default_max_entity_address() -> u64 { 0x7F00_0000_0000 }
fn default_entity_id_offset() -> u64 { 0x58 }
fn default_player_path_prefix() -> String { "Meta".to_string() }
fn default_worker_threads() -> usize { 4 }
fn default_job_history_capacity() -> usize { 4096 }
fn default_slow_job_ms() -> u64 { 33 } // ~30 fps frame budget
fn default_collect_every_n_ticks() -> u64 { 1 }

fn default_next_offset() -> u64 { 0x0 }
fn default_prev_offset() -> u64 { 0x8 }
fn default_payload_offset() -> u64 { 0x28 }

fn default_near_radius() -> f32 { 75.0 }
fn default_outer_radius() -> f32 { 100.0 }
fn default_resource_radius() -> f32 { 30.0 }
fn default_far_distance() -> f32 { 1_000_000.0 }
fn default_resource_type() -> EntityType { EntityType::Chest }
fn default_resource_league() -> LeagueType { LeagueType::Delve }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parse_server_entities: false,
            server_entity_threshold: default_server_entity_threshold(),
            walk_iteration_limit: default_walk_iteration_limit(),
            min_entity_address: default_min_entity_address(),
            max_entity_address: default_max_entity_address(),
            entity_id_offset: default_entity_id_offset(),
            layout: ListLayout::default(),
            player_path_prefix: default_player_path_prefix(),
            notify_structural_added: false,
            eviction: EvictionConfig::default(),
            worker_threads: default_worker_threads(),
            job_history_capacity: default_job_history_capacity(),
            slow_job_ms: default_slow_job_ms(),
            collect_every_n_ticks: default_collect_every_n_ticks(),
            barrier_timeout_ms: None,
        }
    }
}

impl Default for ListLayout {
    fn default() -> Self {
        Self {
            next_offset: default_next_offset(),
            prev_offset: default_prev_offset(),
            payload_offset: default_payload_offset(),
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            near_radius: default_near_radius(),
            outer_radius: default_outer_radius(),
            resource_radius: default_resource_radius(),
            far_distance: default_far_distance(),
            resource_type: default_resource_type(),
            resource_league: default_resource_league(),
        }
    }
}

impl EngineConfig {
    /// Barrier timeout as a `Duration`, if one is configured.
    #[must_use]
    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn slow_job_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_job_ms)
    }
}
