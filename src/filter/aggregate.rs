use crate::entity::{Appearance, Damage, EntityIdentifier, EntityMarking, EntityState, EntityType, Posture, Vector3};
use crate::state::EntityRegistry;
use crate::team::{TeamStructure, UnitId, UnitKind};
use std::collections::HashMap;
use tracing::warn;

/// Axis-aligned box around a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3,
    pub max: Vector3,
}

impl BoundingBox {
    /// Smallest box holding every point, `None` when there are no points.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vector3>,
    {
        points.into_iter().fold(None, |bounds, p| {
            Some(match bounds {
                None => BoundingBox { min: p, max: p },
                Some(BoundingBox { min, max }) => BoundingBox {
                    min: Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z)),
                    max: Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z)),
                },
            })
        })
    }

    /// Midpoint of the box on every axis.
    pub fn center(&self) -> Vector3 {
        Vector3::new(
            (self.max.x - self.min.x) / 2.0 + self.min.x,
            (self.max.y - self.min.y) / 2.0 + self.min.y,
            (self.max.z - self.min.z) / 2.0 + self.min.z,
        )
    }
}

/// Team id -> id of the first entity observed for that team.
///
/// Entries are set once and only disappear when the member is evicted.
#[derive(Debug, Default)]
pub struct PrincipalIndex {
    principals: HashMap<EntityIdentifier, EntityIdentifier>,
}

impl PrincipalIndex {
    /// Returns true when `member` became the team's principal.
    pub fn record(&mut self, team: EntityIdentifier, member: EntityIdentifier) -> bool {
        if self.principals.contains_key(&team) {
            return false;
        }
        self.principals.insert(team, member);
        true
    }

    pub fn principal(&self, team: &EntityIdentifier) -> Option<EntityIdentifier> {
        self.principals.get(team).copied()
    }

    /// Drop every team mapping that points at an evicted entity.
    pub fn forget_member(&mut self, member: &EntityIdentifier) {
        self.principals.retain(|_, principal| principal != member);
    }

    pub fn clear(&mut self) {
        self.principals.clear();
    }
}

/// Builds the synthetic states that stand in for whole teams.
#[derive(Debug, Default)]
pub struct TeamAggregator {
    principals: PrincipalIndex,
    /// Last location reported under each marking
    marking_locations: HashMap<String, Vector3>,
}

impl TeamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember where a marked entity was last seen.
    pub fn observe(&mut self, state: &EntityState) {
        if let Some(marking) = state.marking_value() {
            self.marking_locations.insert(marking.to_string(), state.location);
        }
    }

    /// Forget an evicted entity so it no longer shapes any team.
    pub fn forget(&mut self, state: &EntityState) {
        self.principals.forget_member(&state.entity_id);
        if let Some(marking) = state.marking_value() {
            self.marking_locations.remove(marking);
        }
    }

    pub fn clear(&mut self) {
        self.principals.clear();
        self.marking_locations.clear();
    }

    /// State representing `unit` (a team) built around `individual`.
    ///
    /// Returns `None` when no member location is known; nothing should be
    /// emitted for the team then. A team already in `cache` keeps its cached
    /// marking and appearance and only moves and turns.
    pub fn aggregate(
        &mut self,
        cache: &EntityRegistry,
        individual: &EntityState,
        team_id: EntityIdentifier,
        team: &TeamStructure,
        unit: UnitId,
    ) -> Option<EntityState> {
        self.principals.record(team_id, individual.entity_id);

        let location = self.team_location(cache, team, unit)?;
        let orientation = self.team_orientation(cache, team_id, team.name(unit));

        if let Some(cached) = cache.get(&team_id) {
            return Some(cached.with_location(location).with_orientation(orientation));
        }

        let echelon = match team.kind(unit) {
            UnitKind::Team(t) => t.echelon,
            UnitKind::Member(_) => None,
        };

        Some(EntityState {
            entity_id: team_id,
            marking: Some(EntityMarking::new(team.name(unit))),
            force_id: individual.force_id,
            entity_type: EntityType::lifeform().with_echelon(echelon),
            location,
            orientation,
            linear_velocity: Vector3::ZERO,
            articulation: Vec::new(),
            appearance: Appearance {
                damage: Damage::Healthy,
                posture: Some(Posture::Unused),
                active: true,
            },
        })
    }

    fn team_location(&self, cache: &EntityRegistry, team: &TeamStructure, unit: UnitId) -> Option<Vector3> {
        let locations = team.descendant_members(unit).into_iter().filter_map(|member| {
            let by_marking = match team.kind(member) {
                UnitKind::Member(m) => m.marking().and_then(|mk| self.marking_locations.get(mk)).copied(),
                UnitKind::Team(_) => None,
            };
            by_marking.or_else(|| {
                team.member_entity(member)
                    .and_then(|id| cache.get(&id))
                    .map(|state| state.location)
            })
        });

        BoundingBox::enclosing(locations).map(|bounds| bounds.center())
    }

    fn team_orientation(&self, cache: &EntityRegistry, team_id: EntityIdentifier, name: &str) -> Vector3 {
        let Some(principal) = self.principals.principal(&team_id) else {
            warn!(team = %name, "No principal member for team, using zero orientation");
            return Vector3::ZERO;
        };

        match cache.get(&principal) {
            Some(state) => state.orientation,
            None => {
                warn!(
                    team = %name,
                    principal = %principal,
                    "Principal member of team is not cached, using zero orientation"
                );
                Vector3::ZERO
            }
        }
    }
}
