use crate::entity::{EntityIdentifier, EntityState, Vector3};
use crate::filter::aggregate::TeamAggregator;
use crate::filter::payload::{EntityStateUpdate, LearnerEntityInfo, RoleInfo, SessionEntityIdentifier, ViewerMessage};
use crate::filter::sink::Sink;
use crate::filter::throttle::UpdateThrottle;
use crate::filter::visibility::VisibilityFilter;
use crate::geo::GeoConverter;
use crate::session::{DomainSessionKey, MonitoredSession, SessionDirectory};
use crate::state::{EntityRegistry, Indexed, Scheduler, TimerHandle, DEFAULT_ENTITY_TIMEOUT};
use crate::symbol::SymbolCoder;
use crate::team::{TeamStructure, UnitId, UnitKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Timing knobs for every session filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub entity_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub throttle_interval: Duration,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            entity_timeout: DEFAULT_ENTITY_TIMEOUT,
            heartbeat_interval: Duration::from_secs(1),
            throttle_interval: Duration::from_millis(250),
        }
    }
}

/// Collaborators shared by every filter in the process.
#[derive(Clone)]
pub struct FilterContext {
    pub sessions: Arc<dyn SessionDirectory>,
    pub geo: Arc<dyn GeoConverter>,
    pub symbols: Arc<dyn SymbolCoder>,
    pub scheduler: Scheduler,
    pub settings: FilterSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPhase {
    /// Nothing cached and no heartbeat
    Idle,
    Active,
    /// Terminal
    Destroyed,
}

/// Everything guarded by the filter's lock.
struct FilterState {
    cache: EntityRegistry,
    visibility: VisibilityFilter,
    teams: TeamAggregator,
    throttle: UpdateThrottle,
    /// Application id given to synthetic team identifiers
    team_application_id: Option<u16>,
    /// Timestamp of the last received update, reused for replays
    last_timestamp: i64,
    heartbeat: Option<TimerHandle>,
    destroyed: bool,
}

/// Filters and aggregates the entity feed of one domain session for one
/// viewer.
///
/// Every operation runs under a single per-instance lock. Timeouts and the
/// heartbeat hold only a weak reference and take the same lock when they
/// fire, so they serialize with inbound updates.
pub struct SessionEntityFilter {
    key: DomainSessionKey,
    context: FilterContext,
    sink: Arc<dyn Sink>,
    state: Mutex<FilterState>,
    this: Weak<SessionEntityFilter>,
}

impl SessionEntityFilter {
    pub fn new(key: DomainSessionKey, context: FilterContext, sink: Arc<dyn Sink>) -> Arc<Self> {
        let settings = context.settings;

        info!(domain_session = %key, "Creating session entity filter");

        Arc::new_cyclic(|this| Self {
            key,
            context,
            sink,
            state: Mutex::new(FilterState {
                cache: EntityRegistry::new(settings.entity_timeout),
                visibility: VisibilityFilter::default(),
                teams: TeamAggregator::new(),
                throttle: UpdateThrottle::new(settings.throttle_interval),
                team_application_id: None,
                last_timestamp: 0,
                heartbeat: None,
                destroyed: false,
            }),
            this: this.clone(),
        })
    }

    pub fn key(&self) -> DomainSessionKey {
        self.key
    }

    /// Process one inbound state received at `time` (epoch milliseconds).
    pub fn handle_update(&self, time: i64, entity: EntityState) {
        let mut state = self.state.lock();
        if state.destroyed {
            warn!(domain_session = %self.key, "Ignoring entity update for destroyed filter");
            return;
        }

        self.process(&mut state, time, entity, false);
    }

    /// Replace the role visibility selection and re-evaluate every cached
    /// entity, sending explicit hides for the ones no longer shown.
    pub fn update_visibility_configuration(&self, roles: HashMap<String, bool>) {
        let mut state = self.state.lock();
        if state.destroyed {
            warn!(domain_session = %self.key, "Ignoring visibility update for destroyed filter");
            return;
        }

        let visibility = VisibilityFilter::new(roles);
        if visibility == state.visibility {
            debug!(domain_session = %self.key, "Visibility configuration unchanged");
            return;
        }

        info!(
            domain_session = %self.key,
            roles = visibility.roles().len(),
            applied = visibility.is_filter_applied(),
            "Updating visibility configuration"
        );

        state.visibility = visibility;
        self.replay(&mut state, true);
    }

    /// Replay the cache every heartbeat interval. No-op while running.
    pub fn start_heartbeat(&self) {
        let mut state = self.state.lock();
        if state.destroyed {
            warn!(domain_session = %self.key, "Cannot start heartbeat of destroyed filter");
            return;
        }
        if state.heartbeat.as_ref().is_some_and(|heartbeat| !heartbeat.is_finished()) {
            debug!(domain_session = %self.key, "Heartbeat already running");
            return;
        }

        info!(domain_session = %self.key, "Starting heartbeat");

        let filter = self.this.clone();
        state.heartbeat = Some(self.context.scheduler.schedule_with_fixed_delay(
            self.context.settings.heartbeat_interval,
            move || match filter.upgrade() {
                Some(filter) => filter.beat(),
                None => false,
            },
        ));
    }

    pub fn stop_heartbeat(&self) {
        let mut state = self.state.lock();
        if let Some(heartbeat) = state.heartbeat.take() {
            info!(domain_session = %self.key, "Stopping heartbeat");
            heartbeat.cancel();
        }
    }

    /// Stop the heartbeat and hide every cached entity.
    ///
    /// Returns false if the filter was already destroyed.
    pub fn destroy(&self) -> bool {
        let mut state = self.state.lock();
        if state.destroyed {
            return false;
        }

        info!(
            domain_session = %self.key,
            cached = state.cache.len(),
            "Destroying session entity filter"
        );

        state.destroyed = true;
        if let Some(heartbeat) = state.heartbeat.take() {
            heartbeat.cancel();
        }

        for last in state.cache.drain() {
            self.evict(&mut state, &last);
        }
        state.teams.clear();
        state.throttle.clear();
        true
    }

    pub fn phase(&self) -> FilterPhase {
        let state = self.state.lock();
        if state.destroyed {
            FilterPhase::Destroyed
        } else if state.heartbeat.is_some() || !state.cache.is_empty() {
            FilterPhase::Active
        } else {
            FilterPhase::Idle
        }
    }

    pub fn cached_entities(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn latest_location(&self, entity_id: &EntityIdentifier) -> Option<Vector3> {
        self.state.lock().cache.get(entity_id).map(|s| s.location)
    }

    pub fn latest_force_id(&self, entity_id: &EntityIdentifier) -> Option<u8> {
        self.state.lock().cache.get(entity_id).map(|s| s.force_id)
    }

    /// What a role currently looks like, whether or not it is shown.
    ///
    /// A team that was never emitted is aggregated from the first of its
    /// members with cached data.
    pub fn latest_state_for_role(&self, role: &str) -> Option<EntityState> {
        let mut state = self.state.lock();
        let session = self.knowledge_session()?;
        let team = session.team.as_deref()?;
        let unit = team.unit_by_name(role)?;

        match team.kind(unit) {
            UnitKind::Member(member) => member.entity_id().and_then(|id| state.cache.get(&id).cloned()),
            UnitKind::Team(_) => {
                let first_member = team
                    .descendant_members(unit)
                    .into_iter()
                    .filter_map(|member| team.member_entity(member))
                    .find_map(|id| state.cache.get(&id).cloned());

                let team_id = match team.team_identifier(unit) {
                    Some(id) => id,
                    None => {
                        let first = first_member.as_ref()?;
                        let application_id = state.team_application_id?;
                        team.assign_team_identifier(unit, first.entity_id.site_id, application_id)?
                    }
                };

                if let Some(cached) = state.cache.get(&team_id) {
                    return Some(cached.clone());
                }

                let first = first_member?;
                let FilterState { cache, teams, .. } = &mut *state;
                teams.aggregate(cache, &first, team_id, team, unit)
            }
        }
    }

    pub fn latest_sidc_for_role(&self, role: &str) -> Option<String> {
        let latest = self.latest_state_for_role(role)?;
        self.context.symbols.sidc(&latest.entity_type)
    }

    fn knowledge_session(&self) -> Option<Arc<MonitoredSession>> {
        let session = self.context.sessions.knowledge_session(self.key);
        if session.is_none() {
            warn!(domain_session = %self.key, "No knowledge session registered for filter");
        }
        session
    }

    fn beat(&self) -> bool {
        let mut state = self.state.lock();
        if state.destroyed {
            return false;
        }

        trace!(domain_session = %self.key, cached = state.cache.len(), "Heartbeat");
        self.replay(&mut state, false);
        true
    }

    fn replay(&self, state: &mut FilterState, send_hidden: bool) {
        let time = state.last_timestamp;
        for entity in state.cache.all_states() {
            self.process(state, time, entity, send_hidden);
        }
    }

    fn process(&self, state: &mut FilterState, time: i64, entity: EntityState, send_hidden: bool) {
        state.last_timestamp = time;
        if state.team_application_id.is_none() {
            state.team_application_id = Some(entity.entity_id.application_id.wrapping_add(1));
        }

        if !self.index(state, &entity) {
            self.refresh_teams_after_departure(state, time, &entity);
            return;
        }
        state.teams.observe(&entity);

        let Some(session) = self.knowledge_session() else {
            return;
        };

        let resolved = session
            .team
            .as_deref()
            .and_then(|team| resolve_unit(team, &entity).map(|unit| (team, unit)));

        let Some((team, unit)) = resolved else {
            if !state.visibility.is_filter_applied() {
                self.emit(state, &session, time, &entity, true);
            } else if send_hidden {
                self.emit(state, &session, time, &entity, false);
            }
            return;
        };

        let shown = match team.kind(unit) {
            UnitKind::Member(_) => {
                team.bind_member(unit, entity.entity_id);
                state.visibility.passes(team, unit)
            }
            UnitKind::Team(_) => state.visibility.is_filter_applied() && state.visibility.passes(team, unit),
        };

        if shown {
            self.emit(state, &session, time, &entity, true);
            return;
        }
        if send_hidden {
            self.emit(state, &session, time, &entity, false);
        }

        self.roll_up(state, &session, team, unit, time, &entity, send_hidden);
    }

    /// Walk the ancestors of `unit`, emitting the first team that is shown.
    ///
    /// With `send_hidden` the walk covers the whole chain and hides every
    /// ancestor that is not shown.
    #[allow(clippy::too_many_arguments)]
    fn roll_up(
        &self,
        state: &mut FilterState,
        session: &MonitoredSession,
        team: &TeamStructure,
        unit: UnitId,
        time: i64,
        individual: &EntityState,
        send_hidden: bool,
    ) {
        let application_id = state
            .team_application_id
            .unwrap_or_else(|| individual.entity_id.application_id.wrapping_add(1));

        let mut current = team.parent(unit);
        while let Some(ancestor) = current {
            current = team.parent(ancestor);

            let Some(team_id) = team.assign_team_identifier(ancestor, individual.entity_id.site_id, application_id)
            else {
                continue;
            };

            let passes = state.visibility.passes(team, ancestor);
            if !passes && !send_hidden {
                continue;
            }

            let FilterState { cache, teams, .. } = &mut *state;
            let Some(aggregate) = teams.aggregate(cache, individual, team_id, team, ancestor) else {
                debug!(
                    domain_session = %self.key,
                    team = %team.name(ancestor),
                    "No member location known for team"
                );
                if passes && !send_hidden {
                    break;
                }
                continue;
            };

            if passes {
                debug!(domain_session = %self.key, team = %team.name(ancestor), "Team passed the filter");

                if self.index(state, &aggregate) {
                    self.emit(state, session, time, &aggregate, true);
                }
                if !send_hidden {
                    break;
                }
            } else {
                self.emit(state, session, time, &aggregate, false);
            }
        }
    }

    /// Re-aggregate the teams above a member that deactivated, so a shown
    /// team moves onto the members still reporting.
    ///
    /// The walk starts at the nearest ancestor that still has a cached member,
    /// which stands in as the triggering state.
    fn refresh_teams_after_departure(&self, state: &mut FilterState, time: i64, departed: &EntityState) {
        let Some(session) = self.context.sessions.knowledge_session(self.key) else {
            return;
        };
        let Some(team) = session.team.as_deref() else {
            return;
        };
        let Some(unit) = resolve_unit(team, departed) else {
            return;
        };
        if !matches!(team.kind(unit), UnitKind::Member(_)) {
            return;
        }

        let mut start = unit;
        while let Some(ancestor) = team.parent(start) {
            let remaining = team
                .descendant_members(ancestor)
                .into_iter()
                .filter_map(|member| team.member_entity(member))
                .filter(|id| *id != departed.entity_id)
                .find_map(|id| state.cache.get(&id).cloned());

            if let Some(individual) = remaining {
                self.roll_up(state, &session, team, start, time, &individual, false);
                return;
            }
            start = ancestor;
        }

        debug!(
            domain_session = %self.key,
            entity_id = %departed.entity_id,
            "No member left to re-aggregate teams"
        );
    }

    /// Cache a state. Returns false when the state deactivated its entity.
    fn index(&self, state: &mut FilterState, entity: &EntityState) -> bool {
        let indexed = state.cache.index(entity.clone(), |entity_id, generation, delay| {
            self.arm_timeout(entity_id, generation, delay)
        });

        match indexed {
            Indexed::Tracked => true,
            Indexed::Deactivated(last) => {
                debug!(domain_session = %self.key, entity_id = %last.entity_id, "Entity deactivated");
                self.evict(state, &last);
                false
            }
        }
    }

    fn arm_timeout(&self, entity_id: EntityIdentifier, generation: u64, delay: Duration) -> TimerHandle {
        let filter = self.this.clone();
        self.context.scheduler.schedule(delay, move || {
            if let Some(filter) = filter.upgrade() {
                filter.on_timeout(entity_id, generation);
            }
        })
    }

    fn on_timeout(&self, entity_id: EntityIdentifier, generation: u64) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }

        let Some(last) = state.cache.expire(&entity_id, generation) else {
            trace!(entity_id = %entity_id, generation, "Stale timeout ignored");
            return;
        };

        info!(
            domain_session = %self.key,
            entity_id = %entity_id,
            "Entity timed out"
        );
        self.evict(&mut state, &last);
    }

    /// Hide an entity that left the cache and forget everything derived from
    /// it.
    fn evict(&self, state: &mut FilterState, last: &EntityState) {
        state.teams.forget(last);

        if let Some(session) = self.knowledge_session() {
            let time = state.last_timestamp;
            self.emit(state, &session, time, last, false);
        }

        state.throttle.forget(&SessionEntityIdentifier {
            application_id: last.entity_id.application_id,
            host_domain_session_id: self.key.0,
            entity_id: last.entity_id.entity_id,
        });
    }

    /// Forward a state to monitors and, unless throttled, to the viewer.
    ///
    /// Hides (`active == false`) are never throttled.
    fn emit(&self, state: &mut FilterState, session: &MonitoredSession, time: i64, entity: &EntityState, active: bool) {
        let role = session
            .team
            .as_deref()
            .and_then(|team| resolve_unit(team, entity).map(|unit| role_info(session, team, unit)));

        let forwarded = if active {
            entity.clone()
        } else {
            entity.with_appearance(entity.appearance.with_active(false))
        };
        match (&role, &forwarded.marking) {
            (Some(role), Some(marking)) => {
                let named = marking.clone().with_display_name(role.name.as_str());
                self.sink.forward_to_monitor(&forwarded.with_marking(Some(named)));
            }
            _ => self.sink.forward_to_monitor(&forwarded),
        }

        let update = match EntityStateUpdate::build(
            entity,
            active,
            self.key.0,
            role,
            self.context.geo.as_ref(),
            self.context.symbols.as_ref(),
        ) {
            Ok(update) => update,
            Err(e) => {
                warn!(
                    domain_session = %self.key,
                    entity_id = %entity.entity_id,
                    error = %e,
                    "Dropping update with unconvertible location"
                );
                return;
            }
        };

        if active {
            if !state.throttle.allow(&update) {
                trace!(entity_id = %entity.entity_id, "Update throttled");
                return;
            }
        } else {
            state.throttle.bypass(&update);
        }

        self.sink.send(ViewerMessage::new(self.key.0, time, update));
    }
}

/// The team unit an entity plays: by marking first, then by id.
fn resolve_unit(team: &TeamStructure, entity: &EntityState) -> Option<UnitId> {
    entity
        .marking_value()
        .and_then(|marking| team.member_by_marking(marking))
        .or_else(|| team.element_by_entity_id(&entity.entity_id))
}

fn role_info(session: &MonitoredSession, team: &TeamStructure, unit: UnitId) -> RoleInfo {
    let name = team.name(unit);

    match team.kind(unit) {
        UnitKind::Member(member) => {
            let learner = if member.playable {
                session.learner_for_role(name).map(|learner| LearnerEntityInfo {
                    domain_session_id: learner.domain_session_id,
                    username: learner.username.clone(),
                })
            } else {
                None
            };

            RoleInfo {
                name: name.to_string(),
                playable: member.playable,
                learner,
            }
        }
        UnitKind::Team(_) => RoleInfo {
            name: name.to_string(),
            playable: true,
            learner: None,
        },
    }
}
