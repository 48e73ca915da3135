use crate::entity::EntityState;
use crate::filter::payload::ViewerMessage;
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

/// Delivery of filter output. Implementations must not block the caller.
pub trait Sink: Send + Sync {
    /// Push an update to the viewer owning this sink.
    fn send(&self, message: ViewerMessage);

    /// Pass a raw state to attached external monitors.
    fn forward_to_monitor(&self, state: &EntityState);
}

/// Sink backed by a bounded viewer queue and an optional monitor broadcast.
pub struct ChannelSink {
    viewer: mpsc::Sender<ViewerMessage>,
    monitor: Option<broadcast::Sender<EntityState>>,
}

impl ChannelSink {
    pub fn new(viewer: mpsc::Sender<ViewerMessage>, monitor: Option<broadcast::Sender<EntityState>>) -> Self {
        Self { viewer, monitor }
    }
}

impl Sink for ChannelSink {
    fn send(&self, message: ViewerMessage) {
        match self.viewer.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    domain_session = message.domain_session_id,
                    entity_id = message.update.session_entity_id.entity_id,
                    "Viewer queue full, dropping update"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Viewer queue closed, dropping update");
            }
        }
    }

    fn forward_to_monitor(&self, state: &EntityState) {
        if let Some(monitor) = &self.monitor {
            // No receivers is the normal state
            let _ = monitor.send(state.clone());
        }
    }
}
