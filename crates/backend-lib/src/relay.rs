// ============================
// crates/backend-lib/src/relay.rs
// ============================
//! Collaboration relay coordinator.
//!
//! [`Relay`] owns the connection registry and the session table. It is driven
//! by a single actor task, so every join, leave, route and disconnect is
//! applied one at a time and presence counts can never tear. Connection
//! handlers talk to it only through a cloneable [`RelayHandle`].
use crate::error::RelayError;
use crate::metrics::{SESSION_ACTIVE, SESSION_JOINED, SESSION_LEFT};
use crate::presence;
use crate::reaper;
use crate::registry::{ConnectionRegistry, Outbound};
use crate::router::{DeliveryReport, EventRouter};
use crate::session_table::{Departure, SessionTable};
use metrics::{counter, gauge};
use serde::Serialize;
use sketch_common::{ClientEvent, ConnectionId, ProjectId};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// What the relay did with a client event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Joined { member_count: usize },
    Left(Departure),
    Relayed(DeliveryReport),
}

/// Point-in-time relay sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub connections: usize,
    pub sessions: usize,
}

#[derive(Default)]
pub struct Relay {
    registry: ConnectionRegistry,
    sessions: SessionTable,
    router: EventRouter,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, connection: ConnectionId, outbound: Outbound) -> Result<(), RelayError> {
        self.registry.register(connection, outbound)
    }

    /// Add `connection` to a session and announce it. Returns the new size.
    pub fn join(&mut self, connection: ConnectionId, project_id: &str) -> Result<usize, RelayError> {
        if !self.registry.is_registered(connection) {
            return Err(RelayError::UnknownConnection(connection));
        }

        let fresh = !self.sessions.contains(project_id, connection);
        let member_count = self.sessions.join(project_id, connection);
        self.registry.record_join(connection, project_id)?;

        if fresh {
            counter!(SESSION_JOINED).increment(1);
            gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
            info!(%connection, project = %project_id, member_count, "joined session");
        }

        presence::announce_join(
            &self.router,
            &self.registry,
            &self.sessions,
            project_id,
            connection,
            member_count,
            fresh,
        );
        Ok(member_count)
    }

    /// Remove `connection` from one session and announce it to the rest
    pub fn leave(&mut self, connection: ConnectionId, project_id: &str) -> Departure {
        let departure = self.sessions.leave(project_id, connection);
        self.registry.record_leave(connection, project_id);

        if !matches!(departure, Departure::NotMember { .. }) {
            counter!(SESSION_LEFT).increment(1);
            gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
            info!(%connection, project = %project_id, ?departure, "left session");
        }

        presence::announce_leave(
            &self.router,
            &self.registry,
            &self.sessions,
            project_id,
            connection,
            departure,
        );
        departure
    }

    pub fn route(&self, connection: ConnectionId, event: ClientEvent) -> Result<DeliveryReport, RelayError> {
        self.router.route(&self.registry, &self.sessions, connection, event)
    }

    /// Apply one client event
    pub fn dispatch(&mut self, connection: ConnectionId, event: ClientEvent) -> Result<Dispatched, RelayError> {
        match event {
            ClientEvent::Join { project_id } => self
                .join(connection, &project_id)
                .map(|member_count| Dispatched::Joined { member_count }),
            ClientEvent::Leave { project_id } => Ok(Dispatched::Left(self.leave(connection, &project_id))),
            other => self.route(connection, other).map(Dispatched::Relayed),
        }
    }

    /// Tear down a lost connection; returns how many sessions it was still in
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<(ProjectId, Departure)> {
        let departures = reaper::reap(&self.router, &mut self.registry, &mut self.sessions, connection);
        if !departures.is_empty() {
            counter!(SESSION_LEFT).increment(departures.len() as u64);
            gauge!(SESSION_ACTIVE).set(self.sessions.len() as f64);
        }
        departures
    }

    pub fn member_count(&self, project_id: &str) -> usize {
        self.sessions.size(project_id)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.len(),
            sessions: self.sessions.len(),
        }
    }
}

/// Message sent *into* the actor
#[derive(Debug)]
pub enum RelayCommand {
    Connect {
        connection: ConnectionId,
        outbound: Outbound,
        resp_tx: oneshot::Sender<Result<(), RelayError>>,
    },
    Dispatch {
        connection: ConnectionId,
        event: ClientEvent,
        resp_tx: oneshot::Sender<Result<Dispatched, RelayError>>,
    },
    Disconnect {
        connection: ConnectionId,
        resp_tx: oneshot::Sender<usize>,
    },
    MemberCount {
        project_id: ProjectId,
        resp_tx: oneshot::Sender<usize>,
    },
    Stats {
        resp_tx: oneshot::Sender<RelayStats>,
    },
}

/// Handle that connection handlers keep
#[derive(Clone, Debug)]
pub struct RelayHandle {
    cmd_tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Register a connection and its outbound queue
    pub async fn connect(&self, connection: ConnectionId, outbound: Outbound) -> Result<(), RelayError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(RelayCommand::Connect {
                connection,
                outbound,
                resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    pub async fn dispatch(&self, connection: ConnectionId, event: ClientEvent) -> Result<Dispatched, RelayError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(RelayCommand::Dispatch {
                connection,
                event,
                resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    /// Reap a closed connection. Returns the number of sessions it left.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<usize, RelayError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(RelayCommand::Disconnect { connection, resp_tx })
            .await?;
        Ok(resp_rx.await?)
    }

    pub async fn member_count(&self, project_id: &str) -> Result<usize, RelayError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx
            .send(RelayCommand::MemberCount {
                project_id: project_id.to_string(),
                resp_tx,
            })
            .await?;
        Ok(resp_rx.await?)
    }

    pub async fn stats(&self) -> Result<RelayStats, RelayError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(RelayCommand::Stats { resp_tx }).await?;
        Ok(resp_rx.await?)
    }
}

pub struct RelayActor {
    relay: Relay,
}

impl RelayActor {
    pub fn new(relay: Relay) -> Self {
        Self { relay }
    }

    fn handle(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Connect {
                connection,
                outbound,
                resp_tx,
            } => {
                let _ = resp_tx.send(self.relay.connect(connection, outbound));
            },
            RelayCommand::Dispatch {
                connection,
                event,
                resp_tx,
            } => {
                let _ = resp_tx.send(self.relay.dispatch(connection, event));
            },
            RelayCommand::Disconnect { connection, resp_tx } => {
                let departures = self.relay.disconnect(connection);
                let _ = resp_tx.send(departures.len());
            },
            RelayCommand::MemberCount { project_id, resp_tx } => {
                let _ = resp_tx.send(self.relay.member_count(&project_id));
            },
            RelayCommand::Stats { resp_tx } => {
                let _ = resp_tx.send(self.relay.stats());
            },
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<RelayCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }

        let stats = self.relay.stats();
        if stats.connections > 0 {
            warn!(connections = stats.connections, "relay stopped with live connections");
        }
        info!("relay coordinator stopped");
    }
}

/// Spawn the relay actor and return its handle
pub fn spawn_relay(command_buffer: usize) -> RelayHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(command_buffer);
    let actor = RelayActor::new(Relay::new());

    tokio::spawn(async move {
        actor.run(cmd_rx).await;
    });

    RelayHandle { cmd_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sketch_common::ServerEvent;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn connect(relay: &mut Relay) -> (ConnectionId, mpsc::Receiver<Arc<ServerEvent>>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(16);
        relay.connect(id, tx).unwrap();
        (id, rx)
    }

    fn join(project_id: &str) -> ClientEvent {
        ClientEvent::Join {
            project_id: project_id.to_string(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<ServerEvent>>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((*event).clone());
        }
        events
    }

    #[test]
    fn test_collaboration_scenario() {
        let mut relay = Relay::new();
        let (a, mut a_rx) = connect(&mut relay);
        let (b, mut b_rx) = connect(&mut relay);

        relay.dispatch(a, join("proj1")).unwrap();
        relay.dispatch(b, join("proj1")).unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        let payload = json!({"x": 10, "y": 20, "color": "#000"});
        relay
            .dispatch(
                a,
                ClientEvent::Draw {
                    project_id: "proj1".to_string(),
                    payload: payload.clone(),
                },
            )
            .unwrap();

        assert_eq!(
            drain(&mut b_rx),
            vec![ServerEvent::Draw {
                project_id: "proj1".to_string(),
                user_id: a,
                payload,
            }]
        );
        assert!(drain(&mut a_rx).is_empty());

        relay.disconnect(b);
        assert_eq!(
            drain(&mut a_rx),
            vec![ServerEvent::UserLeft {
                project_id: "proj1".to_string(),
                user_id: b,
                member_count: 1,
            }]
        );

        let left = relay
            .dispatch(
                a,
                ClientEvent::Leave {
                    project_id: "proj1".to_string(),
                },
            )
            .unwrap();
        assert_eq!(left, Dispatched::Left(Departure::SessionGone));
        assert_eq!(relay.member_count("proj1"), 0);
        assert_eq!(relay.stats(), RelayStats { connections: 1, sessions: 0 });
    }

    #[test]
    fn test_join_then_leave_restores_size() {
        let mut relay = Relay::new();
        let (a, _a_rx) = connect(&mut relay);
        let (b, _b_rx) = connect(&mut relay);
        relay.join(a, "p").unwrap();

        assert_eq!(relay.join(b, "p").unwrap(), 2);
        assert_eq!(relay.leave(b, "p"), Departure::Left { remaining: 1 });
        assert_eq!(relay.member_count("p"), 1);
    }

    #[test]
    fn test_join_requires_connection() {
        let mut relay = Relay::new();
        let err = relay.join(ConnectionId::new(), "p").unwrap_err();
        assert!(matches!(err, RelayError::UnknownConnection(_)));
        assert_eq!(relay.member_count("p"), 0);
    }

    #[test]
    fn test_double_connect_is_rejected() {
        let mut relay = Relay::new();
        let (a, _a_rx) = connect(&mut relay);
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            relay.connect(a, tx),
            Err(RelayError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_events_never_cross_sessions() {
        let mut relay = Relay::new();
        let (a, _a_rx) = connect(&mut relay);
        let (b, mut b_rx) = connect(&mut relay);
        let (q, mut q_rx) = connect(&mut relay);
        relay.join(a, "p").unwrap();
        relay.join(b, "p").unwrap();
        relay.join(q, "q").unwrap();
        drain(&mut b_rx);
        drain(&mut q_rx);

        relay
            .dispatch(
                a,
                ClientEvent::LayerUpdate {
                    project_id: "p".to_string(),
                    payload: json!({"layerIndex": 1, "visible": false}),
                },
            )
            .unwrap();

        assert_eq!(drain(&mut b_rx).len(), 1);
        assert!(drain(&mut q_rx).is_empty());
    }

    #[test]
    fn test_event_for_unjoined_session_is_dropped() {
        let mut relay = Relay::new();
        let (a, mut a_rx) = connect(&mut relay);
        let (b, mut b_rx) = connect(&mut relay);
        relay.join(a, "p").unwrap();
        drain(&mut a_rx);

        let err = relay
            .dispatch(
                b,
                ClientEvent::Draw {
                    project_id: "p".to_string(),
                    payload: json!({}),
                },
            )
            .unwrap_err();

        assert!(err.is_protocol_violation());
        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut b_rx).is_empty());
    }

    #[test]
    fn test_explicit_leave_then_disconnect() {
        let mut relay = Relay::new();
        let (a, mut a_rx) = connect(&mut relay);
        let (b, _b_rx) = connect(&mut relay);
        relay.join(a, "p").unwrap();
        relay.join(b, "p").unwrap();
        drain(&mut a_rx);

        relay.leave(b, "p");
        assert_eq!(drain(&mut a_rx).len(), 1);

        // Transport close after an explicit leave has nothing left to do
        assert!(relay.disconnect(b).is_empty());
        assert!(relay.disconnect(b).is_empty());
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(relay.member_count("p"), 1);
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let relay = spawn_relay(8);
        let a = ConnectionId::new();
        let (tx, mut rx) = mpsc::channel(8);

        relay.connect(a, tx).await.unwrap();
        let joined = relay.dispatch(a, join("proj1")).await.unwrap();
        assert_eq!(joined, Dispatched::Joined { member_count: 1 });
        assert_eq!(rx.recv().await.unwrap().member_count(), Some(1));

        assert_eq!(relay.member_count("proj1").await.unwrap(), 1);
        assert_eq!(relay.disconnect(a).await.unwrap(), 1);
        assert_eq!(relay.member_count("proj1").await.unwrap(), 0);
        assert_eq!(relay.stats().await.unwrap(), RelayStats::default());
    }

    #[tokio::test]
    async fn test_concurrent_joins_are_serialized() {
        const JOINERS: usize = 32;
        let relay = spawn_relay(64);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..JOINERS {
            let relay = relay.clone();
            tasks.spawn(async move {
                let id = ConnectionId::new();
                let (tx, mut rx) = mpsc::channel(JOINERS * 2);
                relay.connect(id, tx).await.unwrap();
                relay.dispatch(id, join("shared")).await.unwrap();
                // The first event a joiner sees is its own member count
                let first = rx.recv().await.unwrap();
                match &*first {
                    ServerEvent::MemberCount { member_count, .. } => *member_count,
                    other => panic!("unexpected first event {other:?}"),
                }
            });
        }

        let mut counts = HashSet::new();
        while let Some(result) = tasks.join_next().await {
            counts.insert(result.unwrap());
        }

        assert_eq!(relay.member_count("shared").await.unwrap(), JOINERS);
        // One member-count per joiner, each a distinct point in the serial order
        assert_eq!(counts, (1..=JOINERS).collect::<HashSet<_>>());
    }
}
