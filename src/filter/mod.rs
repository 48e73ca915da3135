//! Per-viewer filtering and team roll-up of a domain session's entity feed.

mod aggregate;
mod payload;
mod registry;
mod session;
mod sink;
mod throttle;
mod visibility;

pub use aggregate::{BoundingBox, PrincipalIndex, TeamAggregator};
pub use payload::{EntityStateUpdate, LearnerEntityInfo, RoleInfo, SessionEntityIdentifier, ViewerMessage};
pub use registry::{FilterRegistry, RegistryError};
pub use session::{FilterContext, FilterPhase, FilterSettings, SessionEntityFilter};
pub use sink::{ChannelSink, Sink};
pub use throttle::UpdateThrottle;
pub use visibility::VisibilityFilter;
