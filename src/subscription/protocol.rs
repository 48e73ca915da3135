use crate::entity::EntityState;
use crate::filter::ViewerMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Replace the role visibility selection
    #[serde(rename = "update_filter")]
    UpdateFilter { roles: HashMap<String, bool> },
    #[serde(rename = "start_heartbeat")]
    StartHeartbeat,
    #[serde(rename = "stop_heartbeat")]
    StopHeartbeat,
}

/// Server → Client: filtered entity update
#[derive(Debug, Clone, Serialize)]
pub struct EntityUpdateMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub message: ViewerMessage,
}

impl From<ViewerMessage> for EntityUpdateMessage {
    fn from(message: ViewerMessage) -> Self {
        Self {
            msg_type: "entity_update".to_string(),
            message,
        }
    }
}

/// Server → Monitor: raw state as forwarded by a filter
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStateMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub state: EntityState,
}

impl From<EntityState> for MonitorStateMessage {
    fn from(state: EntityState) -> Self {
        Self {
            msg_type: "entity_state".to_string(),
            state,
        }
    }
}

/// Server → Client: Error message
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: String) -> Self {
        Self {
            msg_type: "error".to_string(),
            error,
        }
    }
}
