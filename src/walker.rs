// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote linked-list traversal.
//!
//! The target keeps its entities in a doubly-threaded list of nodes. Each
//! node holds two successor links and a payload pointer. The list lives in
//! another process and may be mid-mutation, freed, or corrupt while we read
//! it, so the walk is defensive:
//!
//! - a visited set keyed by node address breaks cycles
//! - a hard step ceiling bounds the cost of a runaway structure
//! - payload pointers outside a plausible window are dropped silently
//! - a node that cannot be read is logged and skipped
//!
//! ```text
//!            ┌────────────── prev ──────────────┐
//!            ▼                                  │
//!   [root] ──next──▶ [n0] ──next──▶ [n1] ──next──┘
//!                     │              │
//!                  payload        payload
//!                     ▼              ▼
//!                  entity         entity
//! ```
//!
//! Buffers are owned by the walker and cleared between passes rather than
//! reallocated.

use std::collections::{HashSet, VecDeque};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{EngineConfig, ListLayout};
use crate::memory::{Address, MemoryReadExt, MemoryReader, ReadError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    #[error("entity list root is null")]
    NullRoot,
    #[error("entity list root unreadable: {0}")]
    Root(#[source] ReadError),
    #[error("walk aborted after {steps} steps (iteration ceiling)")]
    IterationLimit { steps: usize },
}

/// Counters from one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Queue pops, including already-visited and null entries
    pub steps: usize,
    /// Distinct nodes read successfully
    pub nodes: usize,
    pub read_failures: usize,
    /// Payloads dropped by the address window
    pub rejected_payloads: usize,
}

/// Breadth-first walker over the entity list.
#[derive(Debug)]
pub struct EntityListWalker {
    layout: ListLayout,
    iteration_limit: usize,
    min_address: u64,
    max_address: u64,
    queue: VecDeque<Address>,
    visited: HashSet<Address>,
    seen_payloads: HashSet<Address>,
    scratch: Vec<Address>,
    candidates: Vec<Address>,
    last_report: WalkReport,
}

impl EntityListWalker {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            layout: config.layout,
            iteration_limit: config.walk_iteration_limit,
            min_address: config.min_entity_address,
            max_address: config.max_entity_address,
            queue: VecDeque::with_capacity(256),
            visited: HashSet::with_capacity(256),
            seen_payloads: HashSet::with_capacity(1024),
            scratch: Vec::with_capacity(1024),
            candidates: Vec::with_capacity(1024),
            last_report: WalkReport::default(),
        }
    }

    /// Candidate payload addresses from the last completed walk.
    #[must_use]
    pub fn candidates(&self) -> &[Address] {
        &self.candidates
    }

    #[must_use]
    pub fn last_report(&self) -> WalkReport {
        self.last_report
    }

    /// Forget everything, including the previous candidate set.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.visited.clear();
        self.seen_payloads.clear();
        self.scratch.clear();
        self.candidates.clear();
        self.last_report = WalkReport::default();
    }

    /// Walk the list hanging off `root` (the sentinel node).
    ///
    /// On success [`candidates`](Self::candidates) holds the fresh set. On
    /// [`WalkError::IterationLimit`] the previous set is left in place so the
    /// caller can reuse it for this tick.
    pub fn walk(&mut self, memory: &dyn MemoryReader, root: Address) -> Result<WalkReport, WalkError> {
        if root.is_null() {
            return Err(WalkError::NullRoot);
        }
        let (next, prev) = self.read_links(memory, root).map_err(WalkError::Root)?;

        self.queue.clear();
        self.visited.clear();
        self.seen_payloads.clear();
        self.scratch.clear();

        self.visited.insert(root);
        self.queue.push_back(next);
        self.queue.push_back(prev);

        let mut report = WalkReport::default();

        while let Some(node) = self.queue.pop_front() {
            if report.steps >= self.iteration_limit {
                warn!(
                    steps = report.steps,
                    pending = self.queue.len() + 1,
                    "Entity list walk hit iteration ceiling, reusing previous candidates"
                );
                crate::metrics::record_walk_aborted();
                self.last_report = report;
                return Err(WalkError::IterationLimit { steps: report.steps });
            }
            report.steps += 1;

            if node.is_null() || !self.visited.insert(node) {
                continue;
            }

            let (payload, next, prev) = match self.read_node(memory, node) {
                Ok(parts) => parts,
                Err(e) => {
                    debug!(node = %node, error = %e, "Skipping unreadable list node");
                    crate::metrics::record_read_failure("node");
                    report.read_failures += 1;
                    continue;
                }
            };
            report.nodes += 1;

            if payload.within(self.min_address, self.max_address) {
                if self.seen_payloads.insert(payload) {
                    self.scratch.push(payload);
                }
            } else {
                report.rejected_payloads += 1;
            }

            self.queue.push_back(next);
            self.queue.push_back(prev);
        }

        std::mem::swap(&mut self.scratch, &mut self.candidates);
        self.last_report = report;
        Ok(report)
    }

    fn read_links(&self, memory: &dyn MemoryReader, node: Address) -> Result<(Address, Address), ReadError> {
        let next = memory.read_address(node.offset(self.layout.next_offset))?;
        let prev = memory.read_address(node.offset(self.layout.prev_offset))?;
        Ok((next, prev))
    }

    fn read_node(&self, memory: &dyn MemoryReader, node: Address) -> Result<(Address, Address, Address), ReadError> {
        let (next, prev) = self.read_links(memory, node)?;
        let payload = memory.read_address(node.offset(self.layout.payload_offset))?;
        Ok((payload, next, prev))
    }
}

/// Search a singly-linked chain (next pointer at `+0`) for the node whose
/// word at `+match_offset` equals `target`.
///
/// Stops on a null or all-ones link, a revisited node, an unreadable node,
/// or after `limit` nodes.
pub fn find_in_chain(
    memory: &dyn MemoryReader,
    head: Address,
    target: Address,
    match_offset: u64,
    limit: usize,
) -> Option<Address> {
    let mut visited = HashSet::new();
    let mut node = head;

    while !node.is_null() && node.raw() != u64::MAX && visited.len() < limit {
        if !visited.insert(node) {
            return None;
        }
        match memory.read_address(node.offset(match_offset)) {
            Ok(found) if found == target => return Some(node),
            Ok(_) => {}
            Err(e) => {
                debug!(node = %node, error = %e, "Chain node unreadable");
                return None;
            }
        }
        node = memory.read_address(node).ok()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::simulated::SimulatedMemory;

    const PAYLOAD_BASE: u64 = 0x2_0000_0000;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    /// Write one node: next, prev, payload.
    fn node(memory: &SimulatedMemory, at: u64, next: u64, prev: u64, payload: u64) {
        let layout = ListLayout::default();
        let base = Address::new(at);
        memory.write(base, &[0u8; 0x40]);
        memory.write_u64(base.offset(layout.next_offset), next);
        memory.write_u64(base.offset(layout.prev_offset), prev);
        memory.write_u64(base.offset(layout.payload_offset), payload);
    }

    #[test]
    fn test_walks_ring_and_skips_root() {
        let memory = SimulatedMemory::new();
        node(&memory, 0x1000, 0x1100, 0x1200, 0);
        node(&memory, 0x1100, 0x1200, 0x1000, PAYLOAD_BASE);
        node(&memory, 0x1200, 0x1000, 0x1100, PAYLOAD_BASE + 0x1000);

        let mut walker = EntityListWalker::new(&config());
        let report = walker.walk(&memory, Address::new(0x1000)).unwrap();

        let mut found = walker.candidates().to_vec();
        found.sort();
        assert_eq!(found, vec![Address::new(PAYLOAD_BASE), Address::new(PAYLOAD_BASE + 0x1000)]);
        assert_eq!(report.nodes, 2);
        assert_eq!(report.read_failures, 0);
    }

    #[test]
    fn test_self_cycle_terminates() {
        let memory = SimulatedMemory::new();
        node(&memory, 0x1000, 0x1100, 0x1100, 0);
        node(&memory, 0x1100, 0x1100, 0x1100, PAYLOAD_BASE);

        let mut walker = EntityListWalker::new(&config());
        walker.walk(&memory, Address::new(0x1000)).unwrap();
        assert_eq!(walker.candidates(), &[Address::new(PAYLOAD_BASE)]);
    }

    #[test]
    fn test_out_of_window_payloads_dropped() {
        let memory = SimulatedMemory::new();
        node(&memory, 0x1000, 0x1100, 0, 0);
        node(&memory, 0x1100, 0x1200, 0x1000, 0x1234); // too low
        node(&memory, 0x1200, 0x1300, 0x1100, 0x7F00_0000_0000); // upper bound is exclusive
        node(&memory, 0x1300, 0, 0x1200, PAYLOAD_BASE);

        let mut walker = EntityListWalker::new(&config());
        let report = walker.walk(&memory, Address::new(0x1000)).unwrap();
        assert_eq!(walker.candidates(), &[Address::new(PAYLOAD_BASE)]);
        assert_eq!(report.rejected_payloads, 2);
    }

    #[test]
    fn test_unreadable_node_is_skipped_not_fatal() {
        let memory = SimulatedMemory::new();
        // 0x1100 points at 0xdead000 which is not mapped
        node(&memory, 0x1000, 0x1100, 0x1200, 0);
        node(&memory, 0x1100, 0xdead000, 0x1000, PAYLOAD_BASE);
        node(&memory, 0x1200, 0x1000, 0x1100, PAYLOAD_BASE + 0x1000);

        let mut walker = EntityListWalker::new(&config());
        let report = walker.walk(&memory, Address::new(0x1000)).unwrap();
        assert_eq!(walker.candidates().len(), 2);
        assert_eq!(report.read_failures, 1);
    }

    #[test]
    fn test_duplicate_payloads_deduplicated() {
        let memory = SimulatedMemory::new();
        node(&memory, 0x1000, 0x1100, 0x1200, 0);
        node(&memory, 0x1100, 0x1200, 0x1000, PAYLOAD_BASE);
        node(&memory, 0x1200, 0x1000, 0x1100, PAYLOAD_BASE);

        let mut walker = EntityListWalker::new(&config());
        walker.walk(&memory, Address::new(0x1000)).unwrap();
        assert_eq!(walker.candidates(), &[Address::new(PAYLOAD_BASE)]);
    }

    #[test]
    fn test_null_and_unreadable_root() {
        let memory = SimulatedMemory::new();
        let mut walker = EntityListWalker::new(&config());
        assert_eq!(walker.walk(&memory, Address::NULL), Err(WalkError::NullRoot));
        assert!(matches!(walker.walk(&memory, Address::new(0x4000)), Err(WalkError::Root(_))));
    }

    #[test]
    fn test_iteration_limit_keeps_previous_candidates() {
        let memory = SimulatedMemory::new();
        node(&memory, 0x1000, 0x1100, 0, 0);
        node(&memory, 0x1100, 0, 0x1000, PAYLOAD_BASE);

        let mut walker = EntityListWalker::new(&EngineConfig { walk_iteration_limit: 5, ..config() });
        walker.walk(&memory, Address::new(0x1000)).unwrap();
        assert_eq!(walker.candidates(), &[Address::new(PAYLOAD_BASE)]);

        // Replace with a long chain that cannot be finished in 5 steps
        for i in 0..20u64 {
            let at = 0x2000 + i * 0x100;
            node(&memory, at, at + 0x100, 0, PAYLOAD_BASE + 0x1000 * (i + 1));
        }
        node(&memory, 0x1000, 0x2000, 0, 0);

        let result = walker.walk(&memory, Address::new(0x1000));
        assert_eq!(result, Err(WalkError::IterationLimit { steps: 5 }));
        assert_eq!(walker.candidates(), &[Address::new(PAYLOAD_BASE)], "previous set retained");
    }

    #[test]
    fn test_reset_clears_previous_candidates() {
        let memory = SimulatedMemory::new();
        node(&memory, 0x1000, 0x1100, 0, 0);
        node(&memory, 0x1100, 0, 0x1000, PAYLOAD_BASE);

        let mut walker = EntityListWalker::new(&config());
        walker.walk(&memory, Address::new(0x1000)).unwrap();
        walker.reset();
        assert!(walker.candidates().is_empty());
    }

    #[test]
    fn test_find_in_chain() {
        let memory = SimulatedMemory::new();
        // chain: 0x100 -> 0x200 -> 0x300 -> null; +0x10 holds the key
        for (at, next, key) in [(0x100u64, 0x200u64, 11u64), (0x200, 0x300, 22), (0x300, 0, 33)] {
            memory.write(Address::new(at), &[0u8; 0x20]);
            memory.write_u64(Address::new(at), next);
            memory.write_u64(Address::new(at + 0x10), key);
        }

        let found = find_in_chain(&memory, Address::new(0x100), Address::new(22), 0x10, 100);
        assert_eq!(found, Some(Address::new(0x200)));
        assert_eq!(find_in_chain(&memory, Address::new(0x100), Address::new(99), 0x10, 100), None);
    }

    #[test]
    fn test_find_in_chain_stops_on_cycle() {
        let memory = SimulatedMemory::new();
        memory.write(Address::new(0x100), &[0u8; 0x20]);
        memory.write_u64(Address::new(0x100), 0x100);
        assert_eq!(find_in_chain(&memory, Address::new(0x100), Address::new(5), 0x10, 100), None);
    }
}
