//! Viewer facing representation of an entity state.

use crate::entity::{Damage, EntityState, Posture};
use crate::geo::{heading_degrees, GeoConverter, GeoError, GeodeticPoint};
use crate::symbol::SymbolCoder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies an entity across every session a viewer watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntityIdentifier {
    pub application_id: u16,
    pub host_domain_session_id: i32,
    pub entity_id: u16,
}

/// Learner controlling an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerEntityInfo {
    pub domain_session_id: i32,
    pub username: String,
}

/// Team role an entity plays, attached when the entity is part of the team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub playable: bool,
    pub learner: Option<LearnerEntityInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStateUpdate {
    pub session_entity_id: SessionEntityIdentifier,
    pub location: GeodeticPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidc: Option<String>,
    pub force_id: u8,
    pub damage: Damage,
    pub active: bool,
    /// Degrees clockwise from north
    pub heading: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(default)]
    pub playable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner: Option<LearnerEntityInfo>,
    /// Speed in metres per second
    pub velocity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posture: Option<Posture>,
}

impl EntityStateUpdate {
    /// Convert a state for display.
    ///
    /// `active` overrides the state's own flag so hide updates can be built
    /// from a still-active cached state.
    pub fn build(
        state: &EntityState,
        active: bool,
        host_domain_session_id: i32,
        role: Option<RoleInfo>,
        geo: &dyn GeoConverter,
        symbols: &dyn SymbolCoder,
    ) -> Result<Self, GeoError> {
        let location = geo.to_geodetic(state.location)?;
        let heading = heading_degrees(
            location.latitude,
            location.longitude,
            state.orientation.x,
            state.orientation.y,
        );

        let (role_name, playable, learner) = match role {
            Some(role) => (Some(role.name), role.playable, role.learner),
            None => (None, false, None),
        };

        Ok(Self {
            session_entity_id: SessionEntityIdentifier {
                application_id: state.entity_id.application_id,
                host_domain_session_id,
                entity_id: state.entity_id.entity_id,
            },
            location,
            sidc: symbols.sidc(&state.entity_type),
            force_id: state.force_id,
            damage: state.appearance.damage,
            active,
            heading,
            marking: state.marking_value().map(str::to_string),
            role_name,
            playable,
            learner,
            velocity: state.linear_velocity.length(),
            posture: state.appearance.posture,
        })
    }
}

/// Envelope pushed to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerMessage {
    pub domain_session_id: i32,
    /// Simulation time (epoch milliseconds) of the triggering update
    pub timestamp: i64,
    pub sent_at: DateTime<Utc>,
    pub update: EntityStateUpdate,
}

impl ViewerMessage {
    pub fn new(domain_session_id: i32, timestamp: i64, update: EntityStateUpdate) -> Self {
        Self {
            domain_session_id,
            timestamp,
            sent_at: Utc::now(),
            update,
        }
    }
}
