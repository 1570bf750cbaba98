//! Area change handling.
//!
//! Ids are only unique within one area instance, so an area change throws
//! the whole cache away. The reference record is re-established first so
//! listeners reacting to `player_updated` already see the new player.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::{AreaInstance, EntityCache, EntityIndex};
use crate::entity::Entity;
use crate::metrics;

impl EntityCache {
    /// Reset the cache for a new area.
    ///
    /// Waits for a pass in progress, re-checks the reference record, then
    /// clears the deletion queue and the walker state. The primary map and
    /// the indices are emptied together while queries are held off.
    #[instrument(skip(self, area), fields(area = %area))]
    pub fn on_area_change(&self, area: &AreaInstance) {
        let mut state = self.pass.lock();
        metrics::record_area_change();

        self.update_reference();

        state.deletions.clear();
        state.confirmed.clear();
        state.walker.reset();

        let gate = self.reset_gate.write();
        let dropped = self.entities.len();
        self.entities.clear();
        *self.index.write() = Arc::new(EntityIndex::default());
        drop(gate);
        metrics::set_cache_entities(0, 0);

        info!(dropped, "Entity cache reset for new area");
    }

    /// Follow area changes published on `areas` until the sender is dropped.
    ///
    /// Each change runs [`on_area_change`](Self::on_area_change) on the
    /// blocking pool so it can wait for a pass without stalling the runtime.
    /// The value present when the watch starts is treated as already handled.
    pub async fn watch_area_changes(self: Arc<Self>, mut areas: watch::Receiver<AreaInstance>) {
        while areas.changed().await.is_ok() {
            let area = areas.borrow_and_update().clone();
            let cache = Arc::clone(&self);
            if let Err(e) = tokio::task::spawn_blocking(move || cache.on_area_change(&area)).await {
                error!(error = %e, "Area change handler failed");
            }
        }
        debug!("Area change channel closed");
    }

    /// Re-read the local player and swap the reference record if its
    /// identity changed. Returns true if `player_updated` fired.
    pub(super) fn update_reference(&self) -> bool {
        let memory = self.memory.as_ref();
        let resolver = self.resolver.as_ref();

        let address = match self.context.local_player() {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Local player unavailable, keeping previous reference");
                metrics::record_read_failure("reference");
                return false;
            }
        };
        let candidate = match Entity::load(memory, resolver, address, self.config.entity_id_offset) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(address = %address, error = %e, "Local player unreadable, keeping previous reference");
                metrics::record_read_failure("reference");
                return false;
            }
        };
        if !candidate.path().starts_with(&self.config.player_path_prefix) {
            debug!(address = %address, path = %candidate.path(), "Local actor is not a player yet");
            return false;
        }

        let mut player = self.player.write();
        if let Some(current) = player.as_ref() {
            if current.address() == address && current.id() == candidate.id() {
                current.refresh_details(memory, resolver);
                return false;
            }
        }

        candidate.set_valid(true);
        let candidate = Arc::new(candidate);
        *player = Some(Arc::clone(&candidate));
        drop(player);

        info!(id = candidate.id(), address = %address, "Reference record updated");
        metrics::record_player_updated();
        self.events.fire_player_updated(&candidate);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{make_cache, monster, player_details};
    use super::*;
    use crate::config::EngineConfig;
    use crate::entity::{EntityDetails, EntityType};
    use parking_lot::Mutex;

    #[test]
    fn test_area_change_clears_everything() {
        let (process, cache) = make_cache(EngineConfig::default());
        process.spawn(1, monster(1.0, 1.0));
        process.spawn(2, monster(2.0, 2.0));
        cache.collect().unwrap();
        assert_eq!(cache.len(), 2);

        cache.on_area_change(&AreaInstance::new("hideout", 7));
        assert!(cache.is_empty());
        assert!(cache.valid_entities().is_empty());
        assert!(cache.invalid_entities().is_empty());
        assert!(cache.valid_by_type(EntityType::Monster).is_empty());

        // The next pass rediscovers them as new records
        let stats = cache.collect().unwrap();
        assert_eq!(stats.added, 2);
    }

    #[test]
    fn test_reference_established_and_event_fired() {
        let (process, cache) = make_cache(EngineConfig::default());
        let updates = Arc::new(Mutex::new(Vec::new()));
        {
            let updates = Arc::clone(&updates);
            cache.events().on_player_updated(move |p| updates.lock().push(p.id()));
        }
        process.spawn_local_player(100, player_details(3.0, 4.0));

        cache.on_area_change(&AreaInstance::new("town", 1));
        let player = cache.player().unwrap();
        assert_eq!(player.id(), 100);
        assert!(player.is_valid());
        assert_eq!(*updates.lock(), vec![100]);

        // Same player, new area: no event, same record
        cache.on_area_change(&AreaInstance::new("field", 2));
        assert!(Arc::ptr_eq(&player, &cache.player().unwrap()));
        assert_eq!(updates.lock().len(), 1);
    }

    #[test]
    fn test_reference_swapped_when_player_changes() {
        let (process, cache) = make_cache(EngineConfig::default());
        process.spawn_local_player(100, player_details(0.0, 0.0));
        cache.on_area_change(&AreaInstance::new("town", 1));

        process.spawn_local_player(200, player_details(0.0, 0.0));
        cache.on_area_change(&AreaInstance::new("town", 2));
        assert_eq!(cache.player().unwrap().id(), 200);
    }

    #[test]
    fn test_non_player_local_actor_ignored() {
        let (process, cache) = make_cache(EngineConfig::default());
        process.spawn_local_player(100, EntityDetails {
            path: "Art/Loading".to_string(),
            ..EntityDetails::default()
        });
        cache.on_area_change(&AreaInstance::new("loading", 1));
        assert!(cache.player().is_none());
    }

    #[test]
    fn test_missing_local_player_keeps_previous_reference() {
        let (process, cache) = make_cache(EngineConfig::default());
        let first = process.spawn_local_player(100, player_details(0.0, 0.0));
        cache.on_area_change(&AreaInstance::new("town", 1));

        process.memory().unmap(first);
        cache.on_area_change(&AreaInstance::new("town", 2));
        assert_eq!(cache.player().unwrap().id(), 100);
    }

    #[test]
    fn test_watch_area_changes_resets_cache() {
        let (process, cache) = make_cache(EngineConfig::default());
        process.spawn(1, monster(1.0, 1.0));
        let cache = Arc::new(cache);
        cache.collect().unwrap();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (tx, rx) = watch::channel(AreaInstance::new("town", 1));
        let watcher = runtime.spawn(Arc::clone(&cache).watch_area_changes(rx));

        tx.send(AreaInstance::new("field", 2)).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !cache.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(cache.is_empty(), "watcher should have reset the cache");

        drop(tx);
        runtime.block_on(watcher).unwrap();
    }
}
