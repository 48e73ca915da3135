// Viewer and monitor WebSocket connections

pub mod manager;
pub mod protocol;

pub use manager::{handle_monitor, ConnectionManager};
pub use protocol::{ClientMessage, EntityUpdateMessage, ErrorMessage, MonitorStateMessage};
