use crate::entity::{Echelon, EntityIdentifier};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;


/// How a team member's entity is recognised in the simulation feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberIdentity {
    /// The entity broadcasts this marking text
    Marking(String),
    /// The entity uses this fixed identifier
    EntityId(EntityIdentifier),
}

/// Authored description of a team hierarchy, as supplied with a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamDefinition {
    Team {
        name: String,
        #[serde(default)]
        echelon: Option<Echelon>,
        #[serde(default)]
        units: Vec<TeamDefinition>,
    },
    Member {
        name: String,
        #[serde(default)]
        playable: bool,
        identity: MemberIdentity,
    },
}

/// Errors building a [`TeamStructure`]
#[derive(Debug, Clone, PartialEq)]
pub enum TeamModelError {
    EmptyName,
    RootNotTeam(String),
}

impl fmt::Display for TeamModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamModelError::EmptyName => write!(f, "team unit names cannot be empty"),
            TeamModelError::RootNotTeam(name) => {
                write!(f, "the root of a team structure must be a team, '{}' is a member", name)
            }
        }
    }
}

impl std::error::Error for TeamModelError {}

/// Index of a unit inside its [`TeamStructure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(usize);

#[derive(Debug)]
pub struct Team {
    pub echelon: Option<Echelon>,
    units: Vec<UnitId>,
    entity_id: OnceLock<EntityIdentifier>,
}

#[derive(Debug)]
pub struct TeamMember {
    pub playable: bool,
    pub identity: MemberIdentity,
    bound_entity: RwLock<Option<EntityIdentifier>>,
}

/// Closed set of unit kinds, decided once at lookup time.
#[derive(Debug)]
pub enum UnitKind {
    Team(Team),
    Member(TeamMember),
}

#[derive(Debug)]
struct UnitNode {
    name: String,
    parent: Option<UnitId>,
    kind: UnitKind,
}

/// Read-only team hierarchy shared by every filter watching one session.
///
/// The only mutations are recording which entity plays a member and the
/// one-time assignment of a synthetic identifier to a team.
#[derive(Debug)]
pub struct TeamStructure {
    /// Pre-order: the root is at index 0 and parents precede children
    units: Vec<UnitNode>,
    markings: HashMap<String, UnitId>,
    names: HashMap<String, UnitId>,
    next_team_entity: AtomicU16,
}

impl TeamStructure {
    pub fn from_definition(definition: &TeamDefinition) -> Result<Self, TeamModelError> {
        if let TeamDefinition::Member { name, .. } = definition {
            return Err(TeamModelError::RootNotTeam(name.clone()));
        }

        let mut structure = Self {
            units: Vec::new(),
            markings: HashMap::new(),
            names: HashMap::new(),
            next_team_entity: AtomicU16::new(0),
        };
        structure.push(definition, None)?;
        Ok(structure)
    }

    fn push(&mut self, definition: &TeamDefinition, parent: Option<UnitId>) -> Result<UnitId, TeamModelError> {
        let id = UnitId(self.units.len());

        let (name, kind) = match definition {
            TeamDefinition::Team { name, echelon, .. } => (
                name,
                UnitKind::Team(Team {
                    echelon: *echelon,
                    units: Vec::new(),
                    entity_id: OnceLock::new(),
                }),
            ),
            TeamDefinition::Member {
                name,
                playable,
                identity,
            } => {
                if let MemberIdentity::Marking(marking) = identity {
                    self.markings.entry(marking.clone()).or_insert(id);
                }
                (
                    name,
                    UnitKind::Member(TeamMember {
                        playable: *playable,
                        identity: identity.clone(),
                        bound_entity: RwLock::new(None),
                    }),
                )
            }
        };

        if name.is_empty() {
            return Err(TeamModelError::EmptyName);
        }

        self.names.entry(name.clone()).or_insert(id);
        self.units.push(UnitNode {
            name: name.clone(),
            parent,
            kind,
        });

        if let TeamDefinition::Team { units, .. } = definition {
            let mut children = Vec::with_capacity(units.len());
            for child in units {
                children.push(self.push(child, Some(id))?);
            }
            if let UnitKind::Team(team) = &mut self.units[id.0].kind {
                team.units = children;
            }
        }

        Ok(id)
    }

    pub fn root(&self) -> UnitId {
        UnitId(0)
    }

    pub fn name(&self, unit: UnitId) -> &str {
        &self.units[unit.0].name
    }

    pub fn kind(&self, unit: UnitId) -> &UnitKind {
        &self.units[unit.0].kind
    }

    pub fn parent(&self, unit: UnitId) -> Option<UnitId> {
        self.units[unit.0].parent
    }

    /// Direct children of a team; members have none.
    pub fn units_of(&self, unit: UnitId) -> &[UnitId] {
        match self.kind(unit) {
            UnitKind::Team(team) => &team.units,
            UnitKind::Member(_) => &[],
        }
    }

    /// The member recognised by a marking text.
    pub fn member_by_marking(&self, marking: &str) -> Option<UnitId> {
        self.markings.get(marking).copied()
    }

    /// The unit currently associated with an entity id: a member configured
    /// with or bound to it, or a team whose synthetic identifier it is.
    pub fn element_by_entity_id(&self, entity_id: &EntityIdentifier) -> Option<UnitId> {
        self.units
            .iter()
            .position(|node| match &node.kind {
                UnitKind::Team(team) => team.entity_id.get() == Some(entity_id),
                UnitKind::Member(member) => member.entity_id().as_ref() == Some(entity_id),
            })
            .map(UnitId)
    }

    /// First unit, in pre-order, carrying a role name.
    pub fn unit_by_name(&self, name: &str) -> Option<UnitId> {
        self.names.get(name).copied()
    }

    /// Every member below a team, at any depth.
    pub fn descendant_members(&self, unit: UnitId) -> Vec<UnitId> {
        let mut members = Vec::new();
        let mut pending = vec![unit];

        while let Some(current) = pending.pop() {
            match self.kind(current) {
                UnitKind::Member(_) => members.push(current),
                UnitKind::Team(team) => pending.extend(team.units.iter().rev()),
            }
        }

        members
    }

    pub fn team_identifier(&self, unit: UnitId) -> Option<EntityIdentifier> {
        match self.kind(unit) {
            UnitKind::Team(team) => team.entity_id.get().copied(),
            UnitKind::Member(_) => None,
        }
    }

    /// Identifier of a team, generating one on first use.
    ///
    /// Only the first caller to observe a missing identifier assigns it; the
    /// value is stable afterwards. Returns `None` for members.
    pub fn assign_team_identifier(
        &self,
        unit: UnitId,
        site_id: u16,
        application_id: u16,
    ) -> Option<EntityIdentifier> {
        match self.kind(unit) {
            UnitKind::Team(team) => Some(*team.entity_id.get_or_init(|| {
                let entity_id = self.next_team_entity.fetch_add(1, Ordering::SeqCst);
                EntityIdentifier::new(site_id, application_id, entity_id)
            })),
            UnitKind::Member(_) => None,
        }
    }

    /// Record the entity observed playing a member.
    pub fn bind_member(&self, unit: UnitId, entity_id: EntityIdentifier) {
        if let UnitKind::Member(member) = self.kind(unit) {
            *member.bound_entity.write() = Some(entity_id);
        }
    }

    pub fn member_entity(&self, unit: UnitId) -> Option<EntityIdentifier> {
        match self.kind(unit) {
            UnitKind::Member(member) => member.entity_id(),
            UnitKind::Team(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl TeamMember {
    /// Configured identifier, else the last one observed for this member.
    pub fn entity_id(&self) -> Option<EntityIdentifier> {
        match &self.identity {
            MemberIdentity::EntityId(id) => Some(*id),
            MemberIdentity::Marking(_) => *self.bound_entity.read(),
        }
    }

    pub fn marking(&self) -> Option<&str> {
        match &self.identity {
            MemberIdentity::Marking(marking) => Some(marking),
            MemberIdentity::EntityId(_) => None,
        }
    }
}
