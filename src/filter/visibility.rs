use crate::team::{TeamStructure, UnitId, UnitKind};
use std::collections::HashMap;
use tracing::trace;

/// Role name to shown/hidden selection made by one viewer.
///
/// An empty selection, or one where every role has the same value, applies
/// no filtering: individual entities are shown and teams are not rolled up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityFilter {
    roles: HashMap<String, bool>,
}

impl VisibilityFilter {
    pub fn new(roles: HashMap<String, bool>) -> Self {
        Self { roles }
    }

    pub fn roles(&self) -> &HashMap<String, bool> {
        &self.roles
    }

    pub fn is_filter_applied(&self) -> bool {
        let mut values = self.roles.values();
        match values.next() {
            Some(first) => values.any(|value| value != first),
            None => false,
        }
    }

    fn is_shown(&self, role: &str) -> bool {
        self.roles.get(role).copied().unwrap_or(false)
    }

    /// Whether a unit should be forwarded to the viewer.
    ///
    /// A team only passes when it is selected and none of its direct children
    /// are, so a viewer never sees a member and its team at once.
    pub fn passes(&self, team: &TeamStructure, unit: UnitId) -> bool {
        let name = team.name(unit);

        let passed = match team.kind(unit) {
            UnitKind::Member(_) => !self.is_filter_applied() || self.is_shown(name),
            UnitKind::Team(_) => {
                self.is_filter_applied()
                    && self.is_shown(name)
                    && !team
                        .units_of(unit)
                        .iter()
                        .any(|child| self.is_shown(team.name(*child)))
            }
        };

        trace!(role = %name, passed, "Checked unit against filter");
        passed
    }
}
