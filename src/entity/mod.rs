use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
mod tests;

/// Composite key of a simulated entity: site, application and entity number.
///
/// Two identifiers are equal only when all three fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIdentifier {
    pub site_id: u16,
    pub application_id: u16,
    pub entity_id: u16,
}

impl EntityIdentifier {
    pub fn new(site_id: u16, application_id: u16, entity_id: u16) -> Self {
        Self {
            site_id,
            application_id,
            entity_id,
        }
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.site_id, self.application_id, self.entity_id)
    }
}

/// Three component vector.
///
/// Locations are earth-centered Cartesian metres, velocities are metres per
/// second and orientations hold the DIS Euler angles (psi, theta, phi) in
/// radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Command level of a team, used to pick the echelon indicator of its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Echelon {
    FireTeam,
    Squad,
    Section,
    Platoon,
    Company,
    Battalion,
    Regiment,
    Brigade,
    Division,
    Corps,
    Army,
}

/// DIS style entity type record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityType {
    pub kind: u8,
    pub domain: u8,
    pub country: u16,
    pub category: u8,
    pub subcategory: u8,
    pub specific: u8,
    pub extra: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echelon: Option<Echelon>,
}

impl EntityType {
    pub const KIND_PLATFORM: u8 = 1;
    pub const KIND_LIFEFORM: u8 = 3;

    pub const DOMAIN_LAND: u8 = 1;
    pub const DOMAIN_AIR: u8 = 2;
    pub const DOMAIN_SURFACE: u8 = 3;

    /// Bare lifeform type, the base of every synthetic team state.
    pub fn lifeform() -> Self {
        Self {
            kind: Self::KIND_LIFEFORM,
            ..Self::default()
        }
    }

    pub fn with_echelon(self, echelon: Option<Echelon>) -> Self {
        Self { echelon, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Damage {
    #[default]
    Healthy,
    SlightDamage,
    ModerateDamage,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Unused,
    Standing,
    Walking,
    Running,
    Kneeling,
    Prone,
    Crawling,
    Swimming,
    Parachuting,
    Jumping,
    Sitting,
    Squatting,
    Crouching,
    Wading,
    Surrender,
    Detained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    #[serde(default)]
    pub damage: Damage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posture: Option<Posture>,
    pub active: bool,
}

impl Appearance {
    pub fn with_active(self, active: bool) -> Self {
        Self { active, ..self }
    }
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            damage: Damage::Healthy,
            posture: Some(Posture::Unused),
            active: true,
        }
    }
}

/// Marking text broadcast by the simulation, optionally paired with the role
/// name shown by external monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMarking {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl EntityMarking {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(self, display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticulationParameter {
    pub type_id: u32,
    pub value: f64,
}

/// Snapshot of one simulated entity.
///
/// States are values: the `with_*` methods return a modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    pub entity_id: EntityIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marking: Option<EntityMarking>,
    pub force_id: u8,
    pub entity_type: EntityType,
    pub location: Vector3,
    #[serde(default)]
    pub orientation: Vector3,
    #[serde(default)]
    pub linear_velocity: Vector3,
    #[serde(default)]
    pub articulation: Vec<ArticulationParameter>,
    #[serde(default)]
    pub appearance: Appearance,
}

impl EntityState {
    /// Marking text, if the entity broadcasts one.
    pub fn marking_value(&self) -> Option<&str> {
        self.marking.as_ref().map(|m| m.value.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.appearance.active
    }

    pub fn with_location(&self, location: Vector3) -> Self {
        Self {
            location,
            ..self.clone()
        }
    }

    pub fn with_orientation(&self, orientation: Vector3) -> Self {
        Self {
            orientation,
            ..self.clone()
        }
    }

    pub fn with_appearance(&self, appearance: Appearance) -> Self {
        Self {
            appearance,
            ..self.clone()
        }
    }

    pub fn with_marking(&self, marking: Option<EntityMarking>) -> Self {
        Self {
            marking,
            ..self.clone()
        }
    }
}
