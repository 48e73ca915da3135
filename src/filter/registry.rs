use crate::entity::{EntityIdentifier, EntityState, Vector3};
use crate::filter::session::{FilterContext, SessionEntityFilter};
use crate::filter::sink::Sink;
use crate::session::DomainSessionKey;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Filters owned by one viewer, keyed by the domain session they watch.
struct ViewerFilters {
    sink: Arc<dyn Sink>,
    filters: DashMap<DomainSessionKey, Arc<SessionEntityFilter>>,
}

/// Lifecycle container for every viewer's session filters.
///
/// Handles are cloned out of the maps before a filter is called, so no map
/// shard stays locked while a filter does its work.
pub struct FilterRegistry {
    viewers: DashMap<String, Arc<ViewerFilters>>,
    context: FilterContext,
}

impl FilterRegistry {
    pub fn new(context: FilterContext) -> Self {
        Self {
            viewers: DashMap::new(),
            context,
        }
    }

    pub fn context(&self) -> &FilterContext {
        &self.context
    }

    /// Register a viewer and the sink its updates go to.
    ///
    /// A viewer that is already attached keeps its sink. Returns true if the
    /// viewer was created.
    pub fn attach_viewer(&self, viewer: &str, sink: Arc<dyn Sink>) -> bool {
        let mut created = false;
        self.viewers.entry(viewer.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(ViewerFilters {
                sink,
                filters: DashMap::new(),
            })
        });

        if created {
            info!(viewer = %viewer, "Attached viewer");
        }
        created
    }

    pub fn has_viewer(&self, viewer: &str) -> bool {
        self.viewers.contains_key(viewer)
    }

    fn viewer(&self, viewer: &str) -> Result<Arc<ViewerFilters>, RegistryError> {
        self.viewers
            .get(viewer)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::UnknownViewer(viewer.to_string()))
    }

    /// The viewer's filter for a session, created on first call.
    pub fn create_domain_session_filter(
        &self,
        viewer: &str,
        key: DomainSessionKey,
    ) -> Result<Arc<SessionEntityFilter>, RegistryError> {
        let filters = self.viewer(viewer)?;

        let filter = filters
            .filters
            .entry(key)
            .or_insert_with(|| {
                debug!(viewer = %viewer, domain_session = %key, "Creating filter for viewer");
                SessionEntityFilter::new(key, self.context.clone(), Arc::clone(&filters.sink))
            })
            .clone();

        Ok(filter)
    }

    fn existing_filter(&self, viewer: &str, key: DomainSessionKey) -> Result<Arc<SessionEntityFilter>, RegistryError> {
        let filters = self.viewer(viewer)?;
        let filter = filters
            .filters
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::FilterNotFound {
                viewer: viewer.to_string(),
                domain_session: key,
            })?;
        Ok(filter)
    }

    pub fn destroy_domain_session_filter(&self, viewer: &str, key: DomainSessionKey) -> Result<(), RegistryError> {
        let filters = self.viewer(viewer)?;
        let (_, filter) = filters
            .filters
            .remove(&key)
            .ok_or_else(|| RegistryError::FilterNotFound {
                viewer: viewer.to_string(),
                domain_session: key,
            })?;

        filter.destroy();
        Ok(())
    }

    /// Destroy every filter of a viewer and forget the viewer.
    ///
    /// Returns the number of filters destroyed.
    pub fn destroy_viewer(&self, viewer: &str) -> Result<usize, RegistryError> {
        let (_, filters) = self
            .viewers
            .remove(viewer)
            .ok_or_else(|| RegistryError::UnknownViewer(viewer.to_string()))?;

        let owned: Vec<_> = filters.filters.iter().map(|entry| Arc::clone(entry.value())).collect();
        filters.filters.clear();

        for filter in &owned {
            filter.destroy();
        }

        info!(viewer = %viewer, filters = owned.len(), "Destroyed viewer");
        Ok(owned.len())
    }

    /// Destroy the filters of every viewer watching a session that ended.
    pub fn end_domain_session(&self, key: DomainSessionKey) -> usize {
        let viewers: Vec<_> = self.viewers.iter().map(|entry| Arc::clone(entry.value())).collect();

        let mut destroyed = 0;
        for viewer in viewers {
            if let Some((_, filter)) = viewer.filters.remove(&key) {
                filter.destroy();
                destroyed += 1;
            }
        }

        info!(domain_session = %key, filters = destroyed, "Ended domain session");
        destroyed
    }

    fn filters_for(&self, key: DomainSessionKey) -> Vec<Arc<SessionEntityFilter>> {
        self.viewers
            .iter()
            .filter_map(|entry| entry.value().filters.get(&key).map(|f| Arc::clone(f.value())))
            .collect()
    }

    /// Deliver an inbound state to every viewer watching its session.
    ///
    /// Returns the number of filters that received it.
    pub fn handle_entity_update(&self, key: DomainSessionKey, timestamp: i64, state: EntityState) -> usize {
        let filters = self.filters_for(key);
        for filter in &filters {
            filter.handle_update(timestamp, state.clone());
        }
        filters.len()
    }

    pub fn update_visibility_configuration(
        &self,
        viewer: &str,
        key: DomainSessionKey,
        roles: HashMap<String, bool>,
    ) -> Result<(), RegistryError> {
        self.existing_filter(viewer, key)?
            .update_visibility_configuration(roles);
        Ok(())
    }

    pub fn start_heartbeat(&self, viewer: &str, key: DomainSessionKey) -> Result<(), RegistryError> {
        self.existing_filter(viewer, key)?.start_heartbeat();
        Ok(())
    }

    pub fn stop_heartbeat(&self, viewer: &str, key: DomainSessionKey) -> Result<(), RegistryError> {
        self.existing_filter(viewer, key)?.stop_heartbeat();
        Ok(())
    }

    pub fn latest_location(
        &self,
        viewer: &str,
        key: DomainSessionKey,
        entity_id: &EntityIdentifier,
    ) -> Result<Option<Vector3>, RegistryError> {
        Ok(self.existing_filter(viewer, key)?.latest_location(entity_id))
    }

    pub fn latest_force_id(
        &self,
        viewer: &str,
        key: DomainSessionKey,
        entity_id: &EntityIdentifier,
    ) -> Result<Option<u8>, RegistryError> {
        Ok(self.existing_filter(viewer, key)?.latest_force_id(entity_id))
    }

    pub fn latest_state_for_role(
        &self,
        viewer: &str,
        key: DomainSessionKey,
        role: &str,
    ) -> Result<Option<EntityState>, RegistryError> {
        Ok(self.existing_filter(viewer, key)?.latest_state_for_role(role))
    }

    pub fn latest_sidc_for_role(
        &self,
        viewer: &str,
        key: DomainSessionKey,
        role: &str,
    ) -> Result<Option<String>, RegistryError> {
        Ok(self.existing_filter(viewer, key)?.latest_sidc_for_role(role))
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    pub fn filter_count(&self) -> usize {
        self.viewers.iter().map(|entry| entry.value().filters.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    UnknownViewer(String),
    FilterNotFound {
        viewer: String,
        domain_session: DomainSessionKey,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownViewer(viewer) => write!(f, "Unknown viewer '{}'", viewer),
            RegistryError::FilterNotFound { viewer, domain_session } => write!(
                f,
                "Viewer '{}' has no filter for domain session {}",
                viewer, domain_session
            ),
        }
    }
}

impl std::error::Error for RegistryError {}
