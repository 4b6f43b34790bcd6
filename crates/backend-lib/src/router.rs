// ============================
// crates/backend-lib/src/router.rs
// ============================
//! Event router.
//!
//! Every inbound canvas event takes the same path: membership check, sender
//! stamping, fan-out lookup, then independent delivery to each peer. Delivery
//! is a non-blocking enqueue onto the peer's outbound queue, so a slow or
//! vanished peer costs the others nothing.
use crate::error::RelayError;
use crate::metrics::{DELIVERY_DROPPED, DELIVERY_SENT, EVENT_RELAYED};
use crate::registry::ConnectionRegistry;
use crate::session_table::SessionTable;
use metrics::counter;
use sketch_common::{ClientEvent, ConnectionId, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, trace, warn};

/// Per-event delivery tally
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl DeliveryReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.dropped
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EventRouter;

impl EventRouter {
    pub fn new() -> Self {
        Self
    }

    /// Relay `event` from `sender` to the other members of its session
    pub fn route(
        &self,
        registry: &ConnectionRegistry,
        sessions: &SessionTable,
        sender: ConnectionId,
        event: ClientEvent,
    ) -> Result<DeliveryReport, RelayError> {
        let kind = event.kind();
        if !kind.is_relayed() {
            return Err(RelayError::NotRoutable(kind));
        }

        let project_id = event.project_id().to_string();
        let in_registry = registry.is_member(sender, &project_id);
        let in_table = sessions.contains(&project_id, sender);
        if !(in_registry && in_table) {
            if in_registry != in_table {
                error!(
                    connection = %sender,
                    project = %project_id,
                    in_registry,
                    in_table,
                    "registry and session table disagree on membership"
                );
            }
            return Err(RelayError::NotAMember {
                connection: sender,
                project_id,
            });
        }

        let outbound = Self::stamp(sender, event)?;
        let recipients = sessions.members_except(&project_id, sender);
        let report = self.deliver(registry, &recipients, outbound);

        counter!(EVENT_RELAYED, "kind" => kind.as_str()).increment(1);
        trace!(
            connection = %sender,
            project = %project_id,
            %kind,
            delivered = report.delivered,
            dropped = report.dropped,
            "relayed event"
        );
        Ok(report)
    }

    /// Build the outbound form of a client event, attributed to `sender`.
    /// Any identity inside the payload is left untouched as opaque content.
    pub fn stamp(sender: ConnectionId, event: ClientEvent) -> Result<ServerEvent, RelayError> {
        let user_id = sender;
        let stamped = match event {
            ClientEvent::Draw { project_id, payload } => ServerEvent::Draw {
                project_id,
                user_id,
                payload,
            },
            ClientEvent::LayerUpdate { project_id, payload } => ServerEvent::LayerUpdate {
                project_id,
                user_id,
                payload,
            },
            ClientEvent::ToolChange { project_id, payload } => ServerEvent::ToolChange {
                project_id,
                user_id,
                payload,
            },
            ClientEvent::ClearCanvas { project_id, payload } => ServerEvent::ClearCanvas {
                project_id,
                user_id,
                payload,
            },
            ClientEvent::ApplyEffect { project_id, payload } => ServerEvent::ApplyEffect {
                project_id,
                user_id,
                payload,
            },
            ClientEvent::CursorMove { project_id, x, y } => ServerEvent::CursorMove {
                project_id,
                user_id,
                x,
                y,
            },
            other @ (ClientEvent::Join { .. } | ClientEvent::Leave { .. }) => {
                return Err(RelayError::NotRoutable(other.kind()));
            },
        };
        Ok(stamped)
    }

    /// Enqueue `event` for each recipient. Failures are counted per recipient
    /// and never stop delivery to the rest.
    pub fn deliver(
        &self,
        registry: &ConnectionRegistry,
        recipients: &[ConnectionId],
        event: ServerEvent,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if recipients.is_empty() {
            return report;
        }

        let kind = event.kind();
        let event = Arc::new(event);
        for recipient in recipients {
            let Some(outbound) = registry.outbound(*recipient) else {
                report.dropped += 1;
                counter!(DELIVERY_DROPPED, "reason" => "unknown").increment(1);
                debug!(connection = %recipient, %kind, "recipient no longer registered");
                continue;
            };

            match outbound.try_send(Arc::clone(&event)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    counter!(DELIVERY_DROPPED, "reason" => "full").increment(1);
                    warn!(connection = %recipient, %kind, "outbound queue full, dropping event");
                },
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    counter!(DELIVERY_DROPPED, "reason" => "closed").increment(1);
                    debug!(connection = %recipient, %kind, "recipient closed, dropping event");
                },
            }
        }

        counter!(DELIVERY_SENT).increment(report.delivered as u64);
        report
    }
}
