use crate::entity::{EntityIdentifier, EntityState};
use crate::state::scheduler::TimerHandle;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Seconds of silence after which an active entity is treated as deactivated.
///
/// Some simulators stop publishing an entity without ever sending a final
/// "not active" state.
pub const DEFAULT_ENTITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cached knowledge about one tracked entity.
struct EntityMetadata {
    last_state: EntityState,
    /// Present while the last known appearance was active
    timeout: Option<PendingTimeout>,
}

struct PendingTimeout {
    generation: u64,
    handle: TimerHandle,
}

impl EntityMetadata {
    fn cancel_timeout(&mut self) {
        if let Some(pending) = self.timeout.take() {
            pending.handle.cancel();
        }
    }
}

/// Result of indexing a state.
#[derive(Debug)]
pub enum Indexed {
    /// The entity is cached and its inactivity timeout was (re)armed.
    Tracked,
    /// The state reported the entity inactive; it is no longer cached and the
    /// caller owns the final state.
    Deactivated(EntityState),
}

/// Liveness-tracked cache of the last state of every entity seen by one
/// session filter.
///
/// The registry never emits anything itself: eviction paths hand the removed
/// state back so the owning filter can send the hide update.
pub struct EntityRegistry {
    entries: HashMap<EntityIdentifier, EntityMetadata>,
    timeout: Duration,
    next_generation: u64,
}

impl EntityRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
            next_generation: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Insert or refresh the cached state for `state.entity_id`.
    ///
    /// An active state replaces any pending timeout with a new one built by
    /// `arm(id, generation, timeout)`; the last update always wins. An inactive
    /// state cancels the timeout and removes the entry.
    pub fn index<F>(&mut self, state: EntityState, arm: F) -> Indexed
    where
        F: FnOnce(EntityIdentifier, u64, Duration) -> TimerHandle,
    {
        let entity_id = state.entity_id;

        if !state.is_active() {
            if let Some(mut metadata) = self.entries.remove(&entity_id) {
                metadata.cancel_timeout();
            }
            return Indexed::Deactivated(state);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let timeout = self.timeout;

        let metadata = self.entries.entry(entity_id).or_insert_with(|| {
            debug!(entity_id = %entity_id, "Tracking new entity");
            EntityMetadata {
                last_state: state.clone(),
                timeout: None,
            }
        });

        metadata.last_state = state;
        metadata.cancel_timeout();
        metadata.timeout = Some(PendingTimeout {
            generation,
            handle: arm(entity_id, generation, timeout),
        });

        Indexed::Tracked
    }

    /// Remove an entry whose timeout of `generation` fired.
    ///
    /// Returns `None` when the entry is gone or was refreshed after that
    /// timeout was armed.
    pub fn expire(&mut self, entity_id: &EntityIdentifier, generation: u64) -> Option<EntityState> {
        let current = self.entries.get(entity_id)?.timeout.as_ref()?.generation;
        if current != generation {
            return None;
        }

        self.entries.remove(entity_id).map(|metadata| metadata.last_state)
    }

    /// Remove an entry, cancelling its timeout. Absent entries are a no-op.
    pub fn remove(&mut self, entity_id: &EntityIdentifier) -> Option<EntityState> {
        let mut metadata = self.entries.remove(entity_id)?;
        metadata.cancel_timeout();
        Some(metadata.last_state)
    }

    pub fn get(&self, entity_id: &EntityIdentifier) -> Option<&EntityState> {
        self.entries.get(entity_id).map(|metadata| &metadata.last_state)
    }

    pub fn contains(&self, entity_id: &EntityIdentifier) -> bool {
        self.entries.contains_key(entity_id)
    }

    /// Generation of the pending timeout for an entity, if one is armed.
    pub fn pending_generation(&self, entity_id: &EntityIdentifier) -> Option<u64> {
        self.entries
            .get(entity_id)?
            .timeout
            .as_ref()
            .map(|pending| pending.generation)
    }

    /// Snapshot of every cached state at call time.
    pub fn all_states(&self) -> Vec<EntityState> {
        self.entries
            .values()
            .map(|metadata| metadata.last_state.clone())
            .collect()
    }

    /// Cancel every timeout and empty the cache, returning the removed states.
    pub fn drain(&mut self) -> Vec<EntityState> {
        self.entries
            .drain()
            .map(|(_, mut metadata)| {
                metadata.cancel_timeout();
                metadata.last_state
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITY_TIMEOUT)
    }
}
