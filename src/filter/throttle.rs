use crate::filter::payload::{EntityStateUpdate, SessionEntityIdentifier};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Last update let through for one entity.
struct LastSent {
    at: Instant,
    active: bool,
}

/// Per-entity frequency limit on viewer updates.
///
/// The first update for an entity always passes, as does any update that
/// flips the active flag. Otherwise an update passes once `interval` has
/// elapsed since the last one that passed.
pub struct UpdateThrottle {
    interval: Duration,
    last_sent: HashMap<SessionEntityIdentifier, LastSent>,
}

impl UpdateThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: HashMap::new(),
        }
    }

    /// Check and record an update. Returns true if it may be sent.
    pub fn allow(&mut self, update: &EntityStateUpdate) -> bool {
        let now = Instant::now();

        let allowed = match self.last_sent.get(&update.session_entity_id) {
            None => true,
            Some(last) => last.active != update.active || now.duration_since(last.at) >= self.interval,
        };

        if allowed {
            self.record(update, now);
        }
        allowed
    }

    /// Record an update that was sent without consulting the limit.
    pub fn bypass(&mut self, update: &EntityStateUpdate) {
        self.record(update, Instant::now());
    }

    fn record(&mut self, update: &EntityStateUpdate, at: Instant) {
        self.last_sent.insert(
            update.session_entity_id,
            LastSent {
                at,
                active: update.active,
            },
        );
    }

    pub fn forget(&mut self, entity: &SessionEntityIdentifier) {
        self.last_sent.remove(entity);
    }

    pub fn clear(&mut self) {
        self.last_sent.clear();
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}
