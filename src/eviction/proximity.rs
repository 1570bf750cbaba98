// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use crate::config::EvictionConfig;
use crate::entity::{Entity, EntityType, GridPos, LeagueType};

/// Eviction-relevant view of one unconfirmed record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionCandidate {
    /// Grid distance to the reference record; `None` without a reference
    /// or when the reference position is not a number
    pub distance: Option<f32>,
    pub entity_type: EntityType,
    pub league: LeagueType,
    pub is_alive: bool,
    pub grid_pos: GridPos,
}

impl EvictionCandidate {
    #[must_use]
    pub fn from_entity(entity: &Entity, reference: Option<&Entity>) -> Self {
        let details = entity.details();
        Self {
            distance: reference
                .map(|r| details.grid_pos.distance(r.grid_pos()))
                .filter(|d| !d.is_nan()),
            entity_type: details.entity_type,
            league: details.league,
            is_alive: details.is_alive,
            grid_pos: details.grid_pos,
        }
    }
}

/// Which rule sent a record to the deletion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Vanished inside the near radius
    Vanished,
    /// League resource node vanished inside the tighter resource radius
    ResourceVanished,
    /// Live monster vanished inside the outer radius
    LiveMonsterVanished,
    /// Structural/error/misc category
    StructuralType,
    /// Implausibly far from the reference record
    OutOfRange,
    /// Grid position never resolved, or not finite
    UnresolvedPosition,
}

impl EvictionReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vanished => "vanished",
            Self::ResourceVanished => "resource_vanished",
            Self::LiveMonsterVanished => "live_monster_vanished",
            Self::StructuralType => "structural_type",
            Self::OutOfRange => "out_of_range",
            Self::UnresolvedPosition => "unresolved_position",
        }
    }
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionDecision {
    /// Keep as invalid; may be revalidated later
    Retain,
    Delete(EvictionReason),
}

impl EvictionDecision {
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete(_))
    }
}

/// Distance- and type-sensitive eviction rules. First matching rule wins:
///
/// 1. inside `outer_radius`:
///    a. inside `near_radius`: delete, except league resource nodes which
///       are only deleted inside `resource_radius`
///    b. otherwise delete live monsters (corpses stay addressable)
/// 2. structural types: delete
/// 3. beyond `far_distance`, or grid position unset or non-finite: delete
///
/// Without a reference record the distance rules never match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityPolicy {
    pub near_radius: f32,
    pub outer_radius: f32,
    pub resource_radius: f32,
    pub far_distance: f32,
    /// Resource node category that transiently vanishes near the player
    pub resource_type: EntityType,
    /// League in which `resource_type` gets the tighter radius
    pub resource_league: LeagueType,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self::from_config(&EvictionConfig::default())
    }
}

impl ProximityPolicy {
    #[must_use]
    pub fn from_config(config: &EvictionConfig) -> Self {
        Self {
            near_radius: config.near_radius,
            outer_radius: config.outer_radius,
            resource_radius: config.resource_radius,
            far_distance: config.far_distance,
            resource_type: config.resource_type,
            resource_league: config.resource_league,
        }
    }

    fn is_league_resource(&self, candidate: &EvictionCandidate) -> bool {
        candidate.entity_type == self.resource_type && candidate.league == self.resource_league
    }

    #[must_use]
    pub fn decide(&self, candidate: &EvictionCandidate) -> EvictionDecision {
        if let Some(distance) = candidate.distance {
            if distance < self.outer_radius {
                if distance < self.near_radius {
                    if !self.is_league_resource(candidate) {
                        return EvictionDecision::Delete(EvictionReason::Vanished);
                    }
                    if distance < self.resource_radius {
                        return EvictionDecision::Delete(EvictionReason::ResourceVanished);
                    }
                }

                if candidate.entity_type == EntityType::Monster && candidate.is_alive {
                    return EvictionDecision::Delete(EvictionReason::LiveMonsterVanished);
                }
            }
        }

        if !candidate.entity_type.is_real_entity() {
            return EvictionDecision::Delete(EvictionReason::StructuralType);
        }

        if candidate.distance.is_some_and(|d| d > self.far_distance) {
            return EvictionDecision::Delete(EvictionReason::OutOfRange);
        }

        if candidate.grid_pos.is_unresolved() {
            return EvictionDecision::Delete(EvictionReason::UnresolvedPosition);
        }

        EvictionDecision::Retain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candidate(distance: Option<f32>, entity_type: EntityType, league: LeagueType, is_alive: bool) -> EvictionCandidate {
        EvictionCandidate {
            distance,
            entity_type,
            league,
            is_alive,
            grid_pos: GridPos::new(500.0, 500.0),
        }
    }

    #[test]
    fn test_near_records_deleted() {
        let policy = ProximityPolicy::default();
        let npc = make_candidate(Some(20.0), EntityType::Npc, LeagueType::General, true);
        assert_eq!(policy.decide(&npc), EvictionDecision::Delete(EvictionReason::Vanished));
    }

    #[test]
    fn test_league_resource_protected_until_tighter_radius() {
        let policy = ProximityPolicy::default();

        let at_20 = make_candidate(Some(20.0), EntityType::Chest, LeagueType::Delve, false);
        assert_eq!(policy.decide(&at_20), EvictionDecision::Delete(EvictionReason::ResourceVanished));

        let at_50 = make_candidate(Some(50.0), EntityType::Chest, LeagueType::Delve, false);
        assert_eq!(policy.decide(&at_50), EvictionDecision::Retain, "resource node between 30 and 75 is retained");

        // Same chest type outside the league has no exception
        let plain_chest = make_candidate(Some(50.0), EntityType::Chest, LeagueType::General, false);
        assert_eq!(policy.decide(&plain_chest), EvictionDecision::Delete(EvictionReason::Vanished));
    }

    #[test]
    fn test_dead_monster_retained_live_monster_deleted_in_outer_band() {
        let policy = ProximityPolicy::default();

        let dead = make_candidate(Some(80.0), EntityType::Monster, LeagueType::General, false);
        assert_eq!(policy.decide(&dead), EvictionDecision::Retain);

        let alive = make_candidate(Some(80.0), EntityType::Monster, LeagueType::General, true);
        assert_eq!(policy.decide(&alive), EvictionDecision::Delete(EvictionReason::LiveMonsterVanished));
    }

    #[test]
    fn test_dead_monster_inside_near_radius_still_deleted() {
        let policy = ProximityPolicy::default();
        let dead = make_candidate(Some(10.0), EntityType::Monster, LeagueType::General, false);
        assert_eq!(policy.decide(&dead), EvictionDecision::Delete(EvictionReason::Vanished));
    }

    #[test]
    fn test_structural_types_always_deleted() {
        let policy = ProximityPolicy::default();
        for distance in [None, Some(80.0), Some(5_000.0)] {
            let effect = make_candidate(distance, EntityType::Effect, LeagueType::General, false);
            assert_eq!(policy.decide(&effect), EvictionDecision::Delete(EvictionReason::StructuralType));
        }
    }

    #[test]
    fn test_far_and_unresolved_records_deleted() {
        let policy = ProximityPolicy::default();

        let far = make_candidate(Some(2_000_000.0), EntityType::Chest, LeagueType::General, false);
        assert_eq!(policy.decide(&far), EvictionDecision::Delete(EvictionReason::OutOfRange));

        let mut unresolved = make_candidate(Some(500.0), EntityType::Chest, LeagueType::General, false);
        unresolved.grid_pos = GridPos::default();
        assert_eq!(policy.decide(&unresolved), EvictionDecision::Delete(EvictionReason::UnresolvedPosition));
    }

    #[test]
    fn test_non_finite_position_deleted() {
        let policy = ProximityPolicy::default();
        for grid_pos in [GridPos::new(f32::NAN, 3.0), GridPos::new(3.0, f32::INFINITY)] {
            let mut candidate = make_candidate(Some(f32::NAN), EntityType::Chest, LeagueType::General, false);
            candidate.grid_pos = grid_pos;
            assert_eq!(policy.decide(&candidate), EvictionDecision::Delete(EvictionReason::UnresolvedPosition));
        }
    }

    #[test]
    fn test_nan_reference_distance_is_unknown() {
        let record = Entity::new(
            1,
            crate::memory::Address::new(0x1_0000_0000),
            crate::entity::EntityDetails { grid_pos: GridPos::new(5.0, 5.0), ..Default::default() },
        );
        let reference = Entity::new(
            2,
            crate::memory::Address::new(0x1_0000_1000),
            crate::entity::EntityDetails { grid_pos: GridPos::new(f32::NAN, 0.0), ..Default::default() },
        );
        let candidate = EvictionCandidate::from_entity(&record, Some(&reference));
        assert_eq!(candidate.distance, None);
    }

    #[test]
    fn test_mid_range_gameplay_records_retained() {
        let policy = ProximityPolicy::default();
        let chest = make_candidate(Some(300.0), EntityType::Chest, LeagueType::General, false);
        assert_eq!(policy.decide(&chest), EvictionDecision::Retain);
        let monster = make_candidate(Some(300.0), EntityType::Monster, LeagueType::General, true);
        assert_eq!(policy.decide(&monster), EvictionDecision::Retain, "live monsters off-screen are kept");
    }

    #[test]
    fn test_without_reference_distance_rules_are_noop() {
        let policy = ProximityPolicy::default();
        let alive = make_candidate(None, EntityType::Monster, LeagueType::General, true);
        assert_eq!(policy.decide(&alive), EvictionDecision::Retain);

        let mut unresolved = make_candidate(None, EntityType::Monster, LeagueType::General, true);
        unresolved.grid_pos = GridPos::default();
        assert!(policy.decide(&unresolved).is_delete(), "position sentinel does not need a reference");
    }

    #[test]
    fn test_from_entity_computes_distance() {
        use crate::entity::EntityDetails;
        use crate::memory::Address;

        let player = Entity::new(1, Address::new(0x10), EntityDetails {
            grid_pos: GridPos::new(0.0, 0.0),
            entity_type: EntityType::Player,
            ..EntityDetails::default()
        });
        let chest = Entity::new(2, Address::new(0x20), EntityDetails {
            grid_pos: GridPos::new(30.0, 40.0),
            entity_type: EntityType::Chest,
            ..EntityDetails::default()
        });

        let with_ref = EvictionCandidate::from_entity(&chest, Some(&player));
        assert_eq!(with_ref.distance, Some(50.0));
        let without = EvictionCandidate::from_entity(&chest, None);
        assert_eq!(without.distance, None);
    }
}
