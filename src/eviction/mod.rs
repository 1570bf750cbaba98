//! Eviction policy for the entity cache.
//!
//! Every record not reconfirmed during a reconciliation pass is handed to
//! the policy, which decides whether the record stays (stale but
//! addressable, a candidate for later revalidation) or goes onto the
//! deletion queue.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  proximity.rs   - Distance/type decision rules               │
//! │  └─ ProximityPolicy: EvictionCandidate → EvictionDecision    │
//! │  └─ EvictionReason: which rule fired (metrics label)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deletion is conservative near the reference record (fresh, high-value
//! context) and aggressive far away or for structural records.

pub mod proximity;

pub use proximity::{EvictionCandidate, EvictionDecision, EvictionReason, ProximityPolicy};
