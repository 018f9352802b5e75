//! Delivery router: persist first, then push.
//!
//! Pipeline per inbound message: Received -> Persisted -> Routed ->
//! Delivered(n). Persistence always completes before any live push, so a
//! message seen over the live channel is always fetchable via history.

use std::sync::Arc;

use tracing::instrument;

use courier_core::errors::ChatError;
use courier_core::events::ServerEvent;
use courier_core::ids::{ConnectionId, MessageId, UserId};
use courier_core::message::MessageKind;
use courier_store::{Database, MessageRepo};

use crate::registry::ConnectionRegistry;

/// Outcome of a successful routing call. `delivered` counts live
/// connections reached; zero is still success (receiver offline, sender
/// gone) — durable persistence is the delivery guarantee, not the push.
#[derive(Debug)]
pub struct DeliveryReceipt {
    pub message_id: MessageId,
    pub delivered: usize,
}

pub struct DeliveryRouter {
    repo: MessageRepo,
    registry: Arc<ConnectionRegistry>,
}

impl DeliveryRouter {
    pub fn new(db: Database, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            repo: MessageRepo::new(db),
            registry,
        }
    }

    /// Route one message from the origin connection to the target identity.
    ///
    /// Pushes to every live connection of the receiver AND of the sender
    /// (self-echo is mandatory: the sending client relies on the echo to
    /// confirm persistence and to sync its other open connections). A failed
    /// send unregisters that one connection without aborting the rest; the
    /// push is never retried.
    #[instrument(skip(self, content), fields(origin = %origin, target = %target_id))]
    pub fn route(
        &self,
        origin: &ConnectionId,
        target_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<DeliveryReceipt, ChatError> {
        let sender = self
            .registry
            .identity_of(origin)
            .ok_or_else(|| ChatError::Authorization("connection is not authenticated".into()))?;

        if content.trim().is_empty() {
            return Err(ChatError::Validation("empty message content".into()));
        }
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(ChatError::Validation("missing target identity".into()));
        }
        let receiver = UserId::from_raw(target_id);

        // Persist before any push; on failure nothing is broadcast.
        let row = self
            .repo
            .append(&sender, &receiver, content, kind)
            .map_err(|e| ChatError::Storage(e.to_string()))?;
        tracing::debug!(message_id = %row.id, "persisted");

        let event = ServerEvent::NewMessage {
            content: row.content.clone(),
            kind: row.kind,
            sender_id: row.sender_id.clone(),
            time: row.clock_label(),
        };
        let frame = match serde_json::to_string(&event) {
            Ok(f) => f,
            Err(e) => {
                // The row is durable; the live push is skipped, history
                // remains the source of truth.
                tracing::error!(message_id = %row.id, error = %e, "failed to encode push frame");
                return Ok(DeliveryReceipt {
                    message_id: row.id,
                    delivered: 0,
                });
            }
        };

        // Receiver's connections plus the sender's own, one push per
        // distinct connection even when sender == receiver.
        let mut targets = self.registry.live_connections(&receiver);
        for conn in self.registry.live_connections(&sender) {
            if !targets.contains(&conn) {
                targets.push(conn);
            }
        }
        tracing::debug!(message_id = %row.id, targets = targets.len(), "routed");

        let mut delivered = 0;
        for conn_id in &targets {
            if self.registry.send_to(conn_id, frame.clone()) {
                delivered += 1;
            } else {
                let err = ChatError::Delivery {
                    connection: conn_id.to_string(),
                };
                tracing::warn!(
                    connection = %conn_id,
                    kind = err.error_kind(),
                    "push failed, unregistering connection"
                );
                self.registry.unregister(conn_id);
            }
        }

        tracing::debug!(message_id = %row.id, delivered, "delivered");
        Ok(DeliveryReceipt {
            message_id: row.id,
            delivered,
        })
    }

    /// The store half of this router, for read paths that share it.
    pub fn repo(&self) -> &MessageRepo {
        &self.repo
    }
}
