// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The collection pass.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace, warn};

use super::{EntityCache, PassState, PassStats};
use super::types::CollectError;
use crate::entity::{Entity, EntityDetails};
use crate::eviction::{EvictionCandidate, EvictionDecision};
use crate::memory::{Address, MemoryReadExt};
use crate::metrics::{self, PassTimer};
use crate::scheduler::{Job, JobError};
use crate::walker::WalkError;

/// Scheduler name of the collection job. At most one runs at a time.
pub const COLLECT_JOB_NAME: &str = "collect_entities";

enum Reconciled {
    Added(u32),
    Revalidated(u32),
    Skipped,
}

impl EntityCache {
    /// Run one collection pass.
    ///
    /// Walks the entity list, confirms or inserts every plausible record,
    /// applies the eviction policy to records that were not seen, drains the
    /// deletion queue and publishes fresh indices.
    ///
    /// Errors mean the list could not be reached at all; the cache is left
    /// exactly as it was (apart from leftover deletions being drained).
    #[instrument(skip(self), fields(version))]
    pub fn collect(&self) -> Result<PassStats, CollectError> {
        let timer = PassTimer::new();
        let mut state = self.pass.lock();
        let PassState { walker, confirmed, deletions } = &mut *state;

        // Leftovers from a pass interrupted by an area reset
        self.drain_deletions(deletions);

        let root = match self.context.entity_list_root() {
            Ok(root) if root.is_null() => return Err(self.skip(CollectError::NullList)),
            Ok(root) => root,
            Err(e) => return Err(self.skip(CollectError::ListUnavailable(e))),
        };

        let version = self.version.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        tracing::Span::current().record("version", version);

        if let Some(player) = self.player() {
            player.refresh_details(self.memory.as_ref(), self.resolver.as_ref());
        }

        let walk_complete = match walker.walk(self.memory.as_ref(), root) {
            Ok(report) => {
                trace!(steps = report.steps, nodes = report.nodes, "Walk complete");
                true
            }
            Err(WalkError::IterationLimit { steps }) => {
                debug!(steps, reused = walker.candidates().len(), "Reusing previous candidates");
                false
            }
            Err(e) => return Err(self.skip(CollectError::Walk(e))),
        };

        let mut stats = PassStats {
            version,
            candidates: walker.candidates().len(),
            walk_complete,
            ..PassStats::default()
        };
        metrics::record_candidates(stats.candidates);

        confirmed.clear();
        for &address in walker.candidates() {
            match self.reconcile_candidate(address, version) {
                Reconciled::Added(id) => {
                    stats.added += 1;
                    confirmed.insert(id);
                }
                Reconciled::Revalidated(id) => {
                    stats.revalidated += 1;
                    confirmed.insert(id);
                }
                Reconciled::Skipped => {}
            }
        }

        stats.invalidated = self.evict_unconfirmed(confirmed, deletions);
        stats.deleted = self.drain_deletions(deletions);
        self.publish_index();

        if stats.added > 0 {
            metrics::record_entities_added(stats.added);
        }
        stats.elapsed = timer.elapsed();
        *self.last_pass.write() = Some(stats);

        if stats.added > 0 || stats.deleted > 0 {
            debug!(%stats, "Pass complete");
        } else {
            trace!(%stats, "Pass complete");
        }
        Ok(stats)
    }

    /// Submit-ready job running one pass under [`COLLECT_JOB_NAME`].
    pub fn collect_job(self: &Arc<Self>) -> Job {
        let cache = Arc::clone(self);
        Job::new(COLLECT_JOB_NAME, move || {
            cache.collect().map(|_| ()).map_err(|e| JobError::Failed(e.to_string()))
        })
    }

    fn skip(&self, error: CollectError) -> CollectError {
        warn!(error = %error, "Skipping entity pass");
        metrics::record_pass_skipped(error.as_str());
        error
    }

    fn reconcile_candidate(&self, address: Address, version: u32) -> Reconciled {
        let id_offset = self.config.entity_id_offset;
        let memory = self.memory.as_ref();
        let resolver = self.resolver.as_ref();

        let id = match memory.read::<u32>(address.offset(id_offset)) {
            Ok(id) => id,
            Err(e) => {
                debug!(address = %address, error = %e, "Candidate id unreadable");
                metrics::record_read_failure("entity");
                return Reconciled::Skipped;
            }
        };
        if !self.admits_id(id) {
            return Reconciled::Skipped;
        }

        if let Some(existing) = self.get(id) {
            if existing.address() != address {
                trace!(id, from = %existing.address(), to = %address, "Entity moved");
                existing.repoint(address);
                if !existing.check(memory, resolver, id, id_offset) {
                    return Reconciled::Skipped;
                }
            }
            existing.confirm(version);
            return Reconciled::Revalidated(id);
        }

        let entity = Arc::new(Entity::new(id, address, EntityDetails::default()));
        if !entity.check(memory, resolver, id, id_offset) {
            return Reconciled::Skipped;
        }
        entity.confirm(version);
        self.entities.insert(id, Arc::clone(&entity));

        self.events.fire_added_any(&entity);
        if self.config.notify_structural_added || entity.entity_type().is_real_entity() {
            self.events.fire_added(&entity);
        }
        Reconciled::Added(id)
    }

    /// Invalidate every record not confirmed this pass and queue the ones
    /// the policy deletes. Returns the number invalidated.
    fn evict_unconfirmed(&self, confirmed: &HashSet<u32>, deletions: &mut VecDeque<u32>) -> usize {
        let unconfirmed: Vec<Arc<Entity>> = self
            .entities
            .iter()
            .filter(|e| !confirmed.contains(e.key()))
            .map(|e| Arc::clone(e.value()))
            .collect();

        let reference = self.player();
        let id_offset = self.config.entity_id_offset;
        for entity in &unconfirmed {
            entity.set_valid(false);
            // Best effort: pick up the last position if the payload is still ours
            entity.check(self.memory.as_ref(), self.resolver.as_ref(), entity.id(), id_offset);

            let candidate = EvictionCandidate::from_entity(entity, reference.as_deref());
            if let EvictionDecision::Delete(reason) = self.policy.decide(&candidate) {
                trace!(id = entity.id(), %reason, "Queued for deletion");
                metrics::record_eviction(reason.as_str());
                deletions.push_back(entity.id());
            }
        }
        unconfirmed.len()
    }

    /// Remove queued ids, firing `removed` before each removal.
    pub(super) fn drain_deletions(&self, deletions: &mut VecDeque<u32>) -> usize {
        let mut removed = 0;
        while let Some(id) = deletions.pop_front() {
            let Some(entity) = self.get(id) else { continue };
            self.events.fire_removed(&entity);
            if self.entities.remove(&id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            metrics::record_entities_removed(removed);
            if removed > 100 {
                info!(removed, "Large entity eviction");
            }
        }
        removed
    }
}
