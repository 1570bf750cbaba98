//! # Entity Engine
//!
//! Per-frame entity discovery and caching for an overlay observing another
//! process, plus the cooperative job scheduler that drives it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Engine (frame loop)                     │
//! │  • tick(): collect every N frames, then plugin jobs         │
//! │  • Barrier per phase, optional timeout                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       JobScheduler                          │
//! │  • Named jobs, one in flight per name                       │
//! │  • Bounded worker pool, failures and panics captured        │
//! │  • History ring of finished jobs                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (collect_entities job)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       EntityCache                           │
//! │  • DashMap id → Arc<Entity>, records repointed in place     │
//! │  • Proximity eviction, deferred deletion queue              │
//! │  • Added / removed / player-updated notifications           │
//! │  • Reset on area change                                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    EntityListWalker                         │
//! │  • Cycle-safe BFS over the remote list, step ceiling        │
//! │  • Payload address window                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                 MemoryReader / GameContext (host)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use entity_engine::{Engine, EngineConfig, EntityDetails, EntityType, GridPos};
//! use entity_engine::memory::simulated::{SimulatedProcess, SimulatedResolver};
//!
//! let config = EngineConfig::default();
//! let process = Arc::new(SimulatedProcess::new(&config));
//! process.spawn(42, EntityDetails {
//!     path: "Metadata/Monsters/Rat".into(),
//!     entity_type: EntityType::Monster,
//!     is_alive: true,
//!     grid_pos: GridPos::new(10.0, 12.0),
//!     ..Default::default()
//! });
//!
//! let mut engine = Engine::new(
//!     config,
//!     process.clone(),
//!     process.clone(),
//!     Arc::new(SimulatedResolver::new()),
//! )
//! .expect("scheduler starts");
//! engine.cache().events().on_added(|e| println!("added {}", e.id()));
//!
//! engine.tick(Vec::new());
//! let rat = engine.cache().get(42).expect("discovered");
//! assert!(rat.is_valid());
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: The [`Engine`] tick driver
//! - [`scheduler`]: Named jobs on a bounded pool
//! - [`cache`]: The [`EntityCache`] and its notifications
//! - [`walker`]: Remote linked-list traversal
//! - [`eviction`]: Proximity eviction policy
//! - [`entity`]: Entity records and classification
//! - [`memory`]: Read abstraction over the observed process
//! - [`metrics`]: `metrics` crate instrumentation

pub mod config;
pub mod memory;
pub mod entity;
pub mod walker;
pub mod eviction;
pub mod cache;
pub mod scheduler;
pub mod engine;
pub mod metrics;

pub use config::{EngineConfig, EvictionConfig, ListLayout};
pub use memory::{Address, GameContext, MemoryReadExt, MemoryReader, ReadError};
pub use entity::{Entity, EntityDetails, EntityResolver, EntityType, GridPos, LeagueType};
pub use walker::{EntityListWalker, WalkError, WalkReport};
pub use eviction::{EvictionDecision, EvictionReason, ProximityPolicy};
pub use cache::{AreaInstance, CollectError, EntityCache, EntityEvents, EntityLookup, PassStats};
pub use scheduler::{Job, JobError, JobHandle, JobKind, JobRecord, JobScheduler, JobStatus, SchedulerError};
pub use engine::{Engine, TickReport};
pub use metrics::PassTimer;
