use crate::team::{TeamDefinition, TeamModelError, TeamStructure};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Identifies a monitored simulation (domain) session by its host's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainSessionKey(pub i32);

impl fmt::Display for DomainSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A learner taking part in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMember {
    pub domain_session_id: i32,
    pub username: String,
    /// Name of the team role this learner plays, if any
    #[serde(default)]
    pub role: Option<String>,
}

/// Description of a session as registered by the surrounding system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSession {
    pub name: String,
    pub host: SessionMember,
    #[serde(default)]
    pub joined: Vec<SessionMember>,
    #[serde(default)]
    pub team: Option<TeamDefinition>,
}

impl KnowledgeSession {
    pub fn key(&self) -> DomainSessionKey {
        DomainSessionKey(self.host.domain_session_id)
    }
}

/// Registered session context consumed by the session filters.
#[derive(Debug)]
pub struct MonitoredSession {
    pub session: KnowledgeSession,
    pub team: Option<Arc<TeamStructure>>,
}

impl MonitoredSession {
    pub fn new(session: KnowledgeSession) -> Result<Self, TeamModelError> {
        let team = match &session.team {
            Some(definition) => Some(Arc::new(TeamStructure::from_definition(definition)?)),
            None => None,
        };
        Ok(Self { session, team })
    }

    pub fn key(&self) -> DomainSessionKey {
        self.session.key()
    }

    /// The learner (host or joined) playing a role.
    pub fn learner_for_role(&self, role: &str) -> Option<&SessionMember> {
        std::iter::once(&self.session.host)
            .chain(self.session.joined.iter())
            .find(|member| member.role.as_deref() == Some(role))
    }
}

/// Lookup of session context by key. A missing entry is expected while a
/// session is starting up.
pub trait SessionDirectory: Send + Sync {
    fn knowledge_session(&self, key: DomainSessionKey) -> Option<Arc<MonitoredSession>>;
}

/// In-memory session directory.
pub struct SessionCatalog {
    sessions: DashMap<DomainSessionKey, Arc<MonitoredSession>>,
}

impl SessionCatalog {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register (or replace) a session's context.
    pub fn register(&self, session: KnowledgeSession) -> Result<Arc<MonitoredSession>, TeamModelError> {
        let monitored = Arc::new(MonitoredSession::new(session)?);
        let key = monitored.key();

        info!(
            domain_session = %key,
            name = %monitored.session.name,
            has_team = monitored.team.is_some(),
            "Registered knowledge session"
        );

        self.sessions.insert(key, Arc::clone(&monitored));
        Ok(monitored)
    }

    pub fn remove(&self, key: DomainSessionKey) -> Option<Arc<MonitoredSession>> {
        self.sessions.remove(&key).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionDirectory for SessionCatalog {
    fn knowledge_session(&self, key: DomainSessionKey) -> Option<Arc<MonitoredSession>> {
        self.sessions.get(&key).map(|entry| Arc::clone(entry.value()))
    }
}

impl Default for SessionCatalog {
    fn default() -> Self {
        Self::new()
    }
}
