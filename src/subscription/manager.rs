use crate::entity::EntityState;
use crate::filter::{FilterRegistry, ViewerMessage};
use crate::session::DomainSessionKey;
use crate::subscription::protocol::{ClientMessage, EntityUpdateMessage, ErrorMessage, MonitorStateMessage};
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Manages a single viewer WebSocket watching one domain session
pub struct ConnectionManager {
    viewer: String,
    session: DomainSessionKey,
    registry: Arc<FilterRegistry>,
}

impl ConnectionManager {
    pub fn new(viewer: String, session: DomainSessionKey, registry: Arc<FilterRegistry>) -> Self {
        Self {
            viewer,
            session,
            registry,
        }
    }

    /// Handle WebSocket connection lifecycle.
    ///
    /// The viewer and its filters are destroyed when the connection ends.
    pub async fn handle(self, mut socket: WebSocket, mut updates: mpsc::Receiver<ViewerMessage>) {
        info!(viewer = %self.viewer, domain_session = %self.session, "Viewer connection established");

        loop {
            tokio::select! {
                // Handle incoming client messages
                Some(msg) = socket.recv() => {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if let Err(e) = self.handle_client_message(&text) {
                                warn!(viewer = %self.viewer, error = %e, "Rejected client message");
                                if send_json(&mut socket, &ErrorMessage::new(e.to_string())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(Message::Close(_)) => {
                            info!(viewer = %self.viewer, "Viewer disconnected");
                            break;
                        }
                        Ok(Message::Ping(data)) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Ok(_) => {
                            // Ignore binary, pong messages
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Forward filter output
                Some(update) = updates.recv() => {
                    if let Err(e) = send_json(&mut socket, &EntityUpdateMessage::from(update)).await {
                        error!(viewer = %self.viewer, error = %e, "Failed to send entity update");
                        break;
                    }
                }

                else => {
                    break;
                }
            }
        }

        if let Err(e) = self.registry.destroy_viewer(&self.viewer) {
            warn!(viewer = %self.viewer, error = %e, "Viewer already gone at disconnect");
        }
        info!(viewer = %self.viewer, "Viewer connection closed");
    }

    /// Apply a client message to this viewer's filter
    fn handle_client_message(&self, text: &str) -> anyhow::Result<()> {
        let msg: ClientMessage = serde_json::from_str(text)?;

        match msg {
            ClientMessage::UpdateFilter { roles } => {
                info!(viewer = %self.viewer, roles = roles.len(), "Viewer updated role filter");
                self.registry
                    .update_visibility_configuration(&self.viewer, self.session, roles)?;
            }
            ClientMessage::StartHeartbeat => {
                self.registry.start_heartbeat(&self.viewer, self.session)?;
            }
            ClientMessage::StopHeartbeat => {
                self.registry.stop_heartbeat(&self.viewer, self.session)?;
            }
        }

        Ok(())
    }
}

/// Stream raw forwarded states to an external monitor until it disconnects
pub async fn handle_monitor(mut socket: WebSocket, mut states: broadcast::Receiver<EntityState>) {
    info!("Monitor connection established");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "Monitor WebSocket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            result = states.recv() => {
                match result {
                    Ok(state) => {
                        if let Err(e) = send_json(&mut socket, &MonitorStateMessage::from(state)).await {
                            error!(error = %e, "Failed to send monitor state");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Monitor lagged, skipped states");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Monitor broadcast channel closed");
                        break;
                    }
                }
            }
        }
    }

    info!("Monitor connection closed");
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, message: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(message)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
